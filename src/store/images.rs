use std::collections::HashMap;
use std::path::Path;

use super::StoreError;

/// Scans the replacement-image folder and maps file stems to filenames:
/// `4711.jpg` keys `4711`, `4711_promo.png` keys `4711_promo`. The editor
/// looks offers up by id (discount images) or `<id>_promo` (promo images).
///
/// Files are indexed in sorted name order so a duplicate stem (say
/// `4711.jpg` and `4711.png`) resolves deterministically — last name wins.
/// The index is built fresh on every image-replacement pass; the folder is
/// small and rescanning beats a stale cache between runs.
pub fn build_image_index(dir: &Path) -> Result<HashMap<String, String>, StoreError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();

    let mut index = HashMap::new();
    for name in names {
        if let Some(stem) = Path::new(&name).file_stem().and_then(|s| s.to_str()) {
            index.insert(stem.to_string(), name.clone());
        }
    }

    tracing::debug!(dir = %dir.display(), entries = index.len(), "image index built");
    Ok(index)
}

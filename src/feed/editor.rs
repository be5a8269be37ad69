use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{Config, LabelRule};
use crate::store::{self, StoreError};

use super::document::{Document, Element};

/// Tag-name prefix of generated label elements; the numeric suffix is
/// allocated per offer to avoid collisions.
pub const LABEL_PREFIX: &str = "custom_label_";

/// Errors surfaced by the feed editor. All of them are fatal to the current
/// feed file: there is no retry and no partial-state recovery, and a failed
/// pass may leave the in-memory document partially mutated.
#[derive(Debug, Error)]
pub enum EditorError {
    /// An operation that requires offers found none in the document.
    #[error("No offers found in {0}")]
    NoOffers(String),

    /// The feed file could not be located or parsed.
    #[error("Failed to load feed {filename}: {source}")]
    Load {
        filename: String,
        #[source]
        source: StoreError,
    },

    /// The edited document could not be written out.
    #[error("Failed to write feed {filename}: {source}")]
    Write {
        filename: String,
        #[source]
        source: StoreError,
    },

    /// The replacement-image folder could not be scanned.
    #[error("Image folder scan failed: {0}")]
    ImageScan(#[source] StoreError),
}

/// Folder layout and image base address for an editor, usually derived from
/// [`Config`]. Explicit options instead of process-wide defaults: two
/// editors with different folders can coexist in one process.
#[derive(Debug, Clone)]
pub struct EditorOptions {
    pub feeds_dir: PathBuf,
    pub output_dir: PathBuf,
    pub image_dir: PathBuf,
    pub image_base_url: String,
}

impl EditorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            feeds_dir: config.feeds_dir.clone(),
            output_dir: config.output_dir.clone(),
            image_dir: config.image_dir.clone(),
            image_base_url: config.image_base_url.clone(),
        }
    }
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Counters from one image-replacement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageStats {
    /// Pictures removed from discount offers.
    pub deleted: usize,
    /// Replacement pictures inserted into discount offers.
    pub inserted: usize,
    /// Promo pictures appended to non-discount offers.
    pub promo_inserted: usize,
}

/// One offer as it stands in the edited document, for the catalog snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub offer_id: String,
    pub name: String,
    pub available: Option<String>,
}

/// Single-pass editor for one product-catalog feed file.
///
/// Owns the document exclusively for its lifetime. The document is loaded
/// lazily on the first operation that touches it; a load failure is fatal
/// for the editor instance. Operations mutate the tree in place and track a
/// modified flag which [`FeedEditor::save`] consults for its log message
/// (the write itself is unconditional, matching the long-observed behavior
/// of this pipeline).
pub struct FeedEditor {
    filename: String,
    options: EditorOptions,
    document: Option<Document>,
    modified: bool,
}

impl FeedEditor {
    pub fn new(filename: impl Into<String>, options: EditorOptions) -> Self {
        Self {
            filename: filename.into(),
            options,
            document: None,
            modified: false,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// The loaded document, for inspection. Triggers the lazy load.
    pub fn document(&mut self) -> Result<&Document, EditorError> {
        self.document_mut().map(|doc| &*doc)
    }

    fn document_mut(&mut self) -> Result<&mut Document, EditorError> {
        if self.document.is_none() {
            let doc = store::load_document(&self.filename, &self.options.feeds_dir).map_err(
                |source| EditorError::Load {
                    filename: self.filename.clone(),
                    source,
                },
            )?;
            self.document = Some(doc);
        }
        Ok(self.document.as_mut().expect("document loaded above"))
    }

    /// Sets the `available` attribute to `flag` on every offer whose id is
    /// in `ids`; other offers are untouched. A document without any offers
    /// is an error. Any id match marks the document modified, even when the
    /// attribute already held `flag`. Returns the number of offers updated.
    pub fn set_availability(&mut self, ids: &[String], flag: &str) -> Result<usize, EditorError> {
        let filename = self.filename.clone();
        let doc = self.document_mut()?;
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let mut updated = 0;
        let visited = doc.root.for_each_descendant_mut("offer", &mut |offer| {
            let matched = offer.attr("id").is_some_and(|id| wanted.contains(id));
            if matched {
                offer.set_attr("available", flag);
                updated += 1;
            }
        });

        if visited == 0 {
            tracing::error!(file = %filename, "no offers found");
            return Err(EditorError::NoOffers(filename));
        }
        if updated > 0 {
            self.modified = true;
        }
        tracing::debug!(file = %filename, updated, flag, "availability updated");
        Ok(updated)
    }

    /// Appends `custom_label_<n>` children to every offer matched by the
    /// label rules. Index allocation is per offer: the smallest non-negative
    /// integer not already used, where "used" is seeded by scanning existing
    /// label children (malformed numeric suffixes are ignored) and grows as
    /// rules match, so several matching rules yield distinct ascending
    /// indices in rule-map order. Offers missing name, url, or id are
    /// skipped. Returns the number of labels appended.
    pub fn apply_labels(
        &mut self,
        rules: &BTreeMap<String, LabelRule>,
    ) -> Result<usize, EditorError> {
        let filename = self.filename.clone();
        let doc = self.document_mut()?;

        let mut added = 0;
        let visited = doc.root.for_each_descendant_mut("offer", &mut |offer| {
            added += label_offer(offer, rules);
        });

        if visited == 0 {
            tracing::error!(file = %filename, "no offers found");
            return Err(EditorError::NoOffers(filename));
        }
        if added > 0 {
            self.modified = true;
        }
        tracing::debug!(file = %filename, added, "labels applied");
        Ok(added)
    }

    /// Swaps replacement images into the document from the configured image
    /// folder. Discount offers (those with an `oldprice` child) whose id is
    /// in the index lose all their `picture` children and gain exactly one
    /// pointing at the replacement; other offers gain an extra promo
    /// picture when the index has an `<id>_promo` entry. Offers without an
    /// id are skipped. A folder scan failure is logged and propagated, not
    /// swallowed.
    pub fn replace_images(&mut self) -> Result<ImageStats, EditorError> {
        let filename = self.filename.clone();
        let base = self.options.image_base_url.clone();
        let image_dir = self.options.image_dir.clone();

        let index = store::build_image_index(&image_dir).map_err(|source| {
            tracing::error!(file = %filename, error = %source, "image replacement failed");
            EditorError::ImageScan(source)
        })?;

        let doc = self.document_mut()?;
        let mut stats = ImageStats::default();
        doc.root.for_each_descendant_mut("offer", &mut |offer| {
            let Some(id) = offer.attr("id").filter(|id| !id.is_empty()).map(str::to_string)
            else {
                return;
            };

            if offer.child("oldprice").is_some() {
                // Discount offer: replace the pictures wholesale
                if let Some(image) = index.get(&id) {
                    let before = offer.children.len();
                    offer.retain_children(|child| child.name != "picture");
                    stats.deleted += before - offer.children.len();
                    offer.push_child(Element::with_text("picture", format!("{base}/{image}")));
                    stats.inserted += 1;
                }
            } else if let Some(image) = index.get(&format!("{id}_promo")) {
                // Promo offer: existing pictures stay
                offer.push_child(Element::with_text("picture", format!("{base}/{image}")));
                stats.promo_inserted += 1;
            }
        });

        if stats.inserted > 0 || stats.promo_inserted > 0 {
            self.modified = true;
        }
        tracing::info!(
            file = %filename,
            deleted = stats.deleted,
            inserted = stats.inserted,
            promo_inserted = stats.promo_inserted,
            "image replacement finished"
        );
        Ok(stats)
    }

    /// Detaches every offer whose id is in `ids` from the offers container,
    /// falling back to the document root as the parent when no `offers`
    /// element exists. With the fallback parent, offers nested deeper in
    /// the tree are out of reach and are silently left in place. Returns
    /// the number removed.
    pub fn delete_offers(&mut self, ids: &[String]) -> Result<usize, EditorError> {
        let filename = self.filename.clone();
        let doc = self.document_mut()?;
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let parent = match doc.root.descendant_mut("offers") {
            Some(container) => container,
            None => &mut doc.root,
        };

        let before = parent.children.len();
        parent.retain_children(|child| {
            !(child.name == "offer" && child.attr("id").is_some_and(|id| wanted.contains(id)))
        });
        let removed = before - parent.children.len();

        if removed > 0 {
            self.modified = true;
        }
        tracing::info!(file = %filename, removed, "offers deleted");
        Ok(removed)
    }

    /// Writes the document to the output folder under the original
    /// filename. The write happens whether or not the document was
    /// modified; the flag only selects the log message and is cleared
    /// after a modified save.
    pub fn save(&mut self) -> Result<(), EditorError> {
        let filename = self.filename.clone();
        let output_dir = self.options.output_dir.clone();

        let doc = self.document_mut()?;
        if let Err(source) = store::write_document(doc, &output_dir, &filename) {
            tracing::error!(file = %filename, error = %source, "failed to save feed");
            return Err(EditorError::Write { filename, source });
        }

        if self.modified {
            tracing::info!(file = %filename, "feed saved");
            self.modified = false;
        } else {
            tracing::info!(file = %filename, "feed saved without changes");
        }
        Ok(())
    }

    /// Snapshot of the offers currently in the document, for report
    /// persistence. Offers without an id are skipped; a missing name
    /// becomes the empty string.
    pub fn catalog(&mut self) -> Result<Vec<CatalogEntry>, EditorError> {
        let doc = self.document_mut()?;
        let mut entries = Vec::new();
        for offer in doc.root.descendants("offer") {
            let Some(id) = offer.attr("id") else {
                continue;
            };
            entries.push(CatalogEntry {
                offer_id: id.to_string(),
                name: offer.child_text("name").unwrap_or_default().to_string(),
                available: offer.attr("available").map(str::to_string),
            });
        }
        Ok(entries)
    }
}

fn label_offer(offer: &mut Element, rules: &BTreeMap<String, LabelRule>) -> usize {
    // An offer we cannot evaluate (no name/url) or cannot safely tag (no id)
    // is skipped without marking anything.
    let (Some(name), Some(url), Some(id)) = (
        offer.child_text("name"),
        offer.child_text("url"),
        offer.attr("id"),
    ) else {
        return 0;
    };
    let name_lower = name.to_lowercase();
    let url_lower = url.to_lowercase();
    let id = id.to_string();

    let mut used = used_label_indices(offer);
    let mut added = 0;
    for (label_name, rule) in rules {
        if rule.matches(&name_lower, &url_lower, &id) {
            let index = next_free_index(&used);
            used.insert(index);
            offer.push_child(Element::with_text(
                format!("{LABEL_PREFIX}{index}"),
                label_name.clone(),
            ));
            added += 1;
        }
    }
    added
}

/// Indices already taken by `custom_label_<n>` children. Suffixes that do
/// not parse as a non-negative integer are ignored.
fn used_label_indices(offer: &Element) -> HashSet<usize> {
    offer
        .children
        .iter()
        .filter_map(|child| child.name.strip_prefix(LABEL_PREFIX))
        .filter_map(|suffix| suffix.parse::<usize>().ok())
        .collect()
}

fn next_free_index(used: &HashSet<usize>) -> usize {
    let mut index = 0;
    while used.contains(&index) {
        index += 1;
    }
    index
}

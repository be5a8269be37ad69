//! Utility functions shared across the crate.
//!
//! Currently just base-address validation: the configured image URL prefix
//! ends up verbatim inside the `picture` elements of every edited feed, so a
//! typo'd scheme should fail at config load rather than poison a whole batch
//! of output files.

use thiserror::Error;
use url::Url;

/// Errors that can occur during base-address validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Validates the configured image base address and normalizes it for
/// concatenation: the address must be an absolute http(s) URL, and any
/// trailing `/` is trimmed (image paths are joined with an explicit
/// separator later).
///
/// # Examples
///
/// ```
/// use feedpatch::util::validate_base_url;
///
/// let base = validate_base_url("https://cdn.example.com/promo/").unwrap();
/// assert_eq!(base, "https://cdn.example.com/promo");
///
/// assert!(validate_base_url("ftp://cdn.example.com").is_err());
/// assert!(validate_base_url("not a url").is_err());
/// ```
pub fn validate_base_url(raw: &str) -> Result<String, UrlValidationError> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    Ok(raw.trim_end_matches('/').to_string())
}

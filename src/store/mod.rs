//! On-disk collaborators of the feed editor.
//!
//! - [`files`]: loading and atomically writing feed documents, plus feed
//!   discovery in the source folder
//! - [`images`]: the replacement-image index (file stem -> filename),
//!   rebuilt on every image pass
//!
//! Everything here is synchronous std::fs; feed editing is a sequential
//! batch job and the files are small.

mod files;
mod images;

pub use files::{list_feed_files, load_document, write_document, StoreError};
pub use images::build_image_index;

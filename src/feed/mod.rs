//! Feed editing module: the document model and the mutation pipeline.
//!
//! This module provides the core functionality for editing product-catalog
//! XML feeds:
//!
//! - **Document model**: an owned, in-memory element tree parsed from and
//!   serialized back to XML
//! - **Editing**: availability flips, promotional label injection, image
//!   replacement, offer deletion, atomic save
//!
//! # Architecture
//!
//! The module is organized into two submodules:
//!
//! - [`document`] - Low-level XML tree handling built on `quick-xml`
//! - [`editor`] - [`FeedEditor`], the single-pass mutation pipeline over
//!   one feed file
//!
//! # Example
//!
//! ```ignore
//! use feedpatch::feed::{EditorOptions, FeedEditor};
//!
//! let mut editor = FeedEditor::new("summer.xml", EditorOptions::from_config(&config));
//! editor.set_availability(&config.availability.ids, &config.availability.flag)?;
//! editor.apply_labels(&config.labels)?;
//! editor.replace_images()?;
//! editor.delete_offers(&config.delete_ids)?;
//! editor.save()?;
//! ```

mod document;
mod editor;

pub use document::{Document, DocumentError, Element};
pub use editor::{
    CatalogEntry, EditorError, EditorOptions, FeedEditor, ImageStats, LABEL_PREFIX,
};

//! setup.cfg documents
//!
//! This crate owns the declarative side of a conversion: the ordered
//! group/key/value model, reading an existing `setup.cfg` with
//! `configparser`-compatible rules, merging a fresh transcription into it, and
//! rendering the result back to text.

pub mod document;
pub mod errors;
pub mod merge;
pub mod parser;
pub mod source;
pub mod writer;

pub use document::{ConfigDocument, Group};
pub use errors::DocumentError;
pub use merge::merge;
pub use parser::{parse_str, read_from_path};
pub use source::{documents_equal, DocumentSource};
pub use writer::render;

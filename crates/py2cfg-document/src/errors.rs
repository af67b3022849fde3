use std::io;
use thiserror::Error;

/// Errors that can occur while reading a setup.cfg document
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File contains no section headers (line {line}): {text:?}")]
    MissingSectionHeader { line: usize, text: String },

    #[error("Section '{section}' already exists (line {line})")]
    DuplicateSection { section: String, line: usize },

    #[error("Option '{key}' in section '{section}' already exists (line {line})")]
    DuplicateOption {
        section: String,
        key: String,
        line: usize,
    },

    #[error("Source contains parsing errors (line {line}): {text:?}")]
    Parse { line: usize, text: String },
}

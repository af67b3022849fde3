//! Error types for the conversion pipeline

use py2cfg_ast::errors::SandboxError;
use py2cfg_config::ConfigError;
use py2cfg_document::DocumentError;
use thiserror::Error;

/// Errors that abort a conversion
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("Failed to read existing setup.cfg: {0}")]
    Document(#[from] DocumentError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// A `setup()` argument whose value has the wrong shape for its destination
///
/// These never abort a conversion; the field is left out of the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: expected {expected}, found {found}")]
pub struct FieldError {
    pub field: String,
    pub expected: &'static str,
    pub found: String,
}

impl FieldError {
    pub fn new(field: &str, expected: &'static str, found: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            expected,
            found: found.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::*;
    use std::path::PathBuf;

    #[test]
    fn test_field_error_display() {
        let err = FieldError::new("install_requires", "a list of strings", "dict");
        assert_eq!(
            err.to_string(),
            "install_requires: expected a list of strings, found dict"
        );
    }

    #[test]
    fn test_sandbox_errors_pass_through() {
        let err = ConvertError::from(SandboxError::SetupNotCalled(PathBuf::from("pkg/setup.py")));
        assert_eq!(err.to_string(), "setup() was never called by pkg/setup.py");
    }
}

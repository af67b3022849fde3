use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while executing a declaration script
///
/// These mirror the Python exceptions the script would have raised under a
/// real interpreter; they are reported as-is and never retried.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("SyntaxError: invalid syntax (line {line}): {text}")]
    Syntax { line: usize, text: String },

    #[error("NameError: name '{name}' is not defined (line {line})")]
    UndefinedName { name: String, line: usize },

    #[error("TypeError: {message} (line {line})")]
    Type { message: String, line: usize },

    /// A built-in exception such as `KeyError` or `ModuleNotFoundError`
    #[error("{kind}: {message} (line {line})")]
    Builtin {
        kind: &'static str,
        message: String,
        line: usize,
    },

    #[error("OSError: {path}: {source} (line {line})")]
    Io {
        path: PathBuf,
        line: usize,
        #[source]
        source: io::Error,
    },

    /// An exception raised by the script itself
    #[error("{statement} (line {line})")]
    Raised {
        kind: String,
        statement: String,
        line: usize,
    },

    #[error("RecursionError: maximum call depth of {limit} exceeded (line {line})")]
    Recursion { limit: usize, line: usize },
}

impl ScriptError {
    /// Name of the Python exception class this error stands for
    pub fn exception_name(&self) -> &str {
        match self {
            ScriptError::Syntax { .. } => "SyntaxError",
            ScriptError::UndefinedName { .. } => "NameError",
            ScriptError::Type { .. } => "TypeError",
            ScriptError::Builtin { kind, .. } => *kind,
            ScriptError::Io { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => "FileNotFoundError",
                io::ErrorKind::PermissionDenied => "PermissionError",
                _ => "OSError",
            },
            ScriptError::Raised { kind, .. } => kind.as_str(),
            ScriptError::Recursion { .. } => "RecursionError",
        }
    }

    /// Whether an `except NAME` clause would catch this error
    pub fn is_instance_of(&self, class: &str) -> bool {
        let name = self.exception_name();
        let parents: &[&str] = match name {
            "FileNotFoundError" | "PermissionError" | "OSError" => {
                &["OSError", "IOError", "EnvironmentError"]
            }
            "KeyError" | "IndexError" => &["LookupError"],
            "ModuleNotFoundError" => &["ImportError"],
            "NotImplementedError" | "RecursionError" => &["RuntimeError"],
            "UnicodeDecodeError" => &["UnicodeError", "ValueError"],
            "ZeroDivisionError" => &["ArithmeticError"],
            _ => &[],
        };
        name == class || parents.contains(&class) || matches!(class, "Exception" | "BaseException")
    }
}

/// Errors returned by the sandbox entry points
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("setup() was never called by {0}")]
    SetupNotCalled(PathBuf),
}

#[cfg(test)]
mod tests {
    use crate::errors::*;

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::UndefinedName {
            name: "get_version".to_string(),
            line: 12,
        };
        assert_eq!(
            err.to_string(),
            "NameError: name 'get_version' is not defined (line 12)"
        );
    }

    #[test]
    fn test_exception_hierarchy() {
        let err = ScriptError::Io {
            path: PathBuf::from("README.rst"),
            line: 3,
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(err.exception_name(), "FileNotFoundError");
        assert!(err.is_instance_of("IOError"));
        assert!(err.is_instance_of("Exception"));
        assert!(!err.is_instance_of("KeyError"));

        let err = ScriptError::Builtin {
            kind: "ModuleNotFoundError",
            message: "No module named 'pypandoc'".to_string(),
            line: 1,
        };
        assert!(err.is_instance_of("ImportError"));
    }

    #[test]
    fn test_setup_not_called_display() {
        let err = SandboxError::SetupNotCalled(PathBuf::from("pkg/setup.py"));
        assert_eq!(err.to_string(), "setup() was never called by pkg/setup.py");
    }
}

//! Executing a declaration script against a capability provider
//!
//! Each execution owns its interpreter state, including the script's working
//! directory, so independent scripts can be executed from different threads.

use crate::errors::{SandboxError, ScriptError};
use crate::interpreter::{check_syntax, Interpreter};
use crate::shim::{CapabilityProvider, SetuptoolsShim};
use crate::value::CapturedArguments;
use ast_grep_core::AstGrep;
use ast_grep_language::Python;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Execute `path` as the main program and return the keyword arguments of its
/// `setup()` call
pub fn execute_setup_script(path: &Path) -> Result<CapturedArguments, SandboxError> {
    let script = fs::canonicalize(path).map_err(|source| SandboxError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Executing {}", script.display());

    let mut shim = SetuptoolsShim::new();
    run_script(&script, &mut shim)?;
    if !shim.other_calls().is_empty() {
        debug!("Unmodelled build calls: {}", shim.other_calls().join(", "));
    }

    shim.into_setup_call()
        .ok_or(SandboxError::SetupNotCalled(script))
}

/// Read and execute the script at `path` with `provider` standing in for the
/// build backend
pub fn run_script(path: &Path, provider: &mut dyn CapabilityProvider) -> Result<(), SandboxError> {
    let source = fs::read_to_string(path).map_err(|source| SandboxError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    run_source(&source, path, provider)?;
    Ok(())
}

/// Execute `source` as if it had been read from `script_path`
///
/// Relative paths in the script resolve against the parent of `script_path`.
pub fn run_source(
    source: &str,
    script_path: &Path,
    provider: &mut dyn CapabilityProvider,
) -> Result<(), ScriptError> {
    let grep = AstGrep::new(source, Python);
    let root = grep.root();
    check_syntax(source, &root)?;

    let mut interpreter = Interpreter::new(source, script_path, provider);
    interpreter.run_module(&root)
}

#[cfg(test)]
mod tests {
    use crate::sandbox::*;
    use crate::value::Value;
    use std::thread;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn write_script(dir: &TempDir, source: &str) -> std::io::Result<std::path::PathBuf> {
        let path = dir.path().join("setup.py");
        fs::write(&path, source)?;
        Ok(path)
    }

    #[test]
    fn test_execute_captures_setup_arguments() -> TestResult {
        let dir = TempDir::new()?;
        let script = write_script(
            &dir,
            "from setuptools import setup\n\nsetup(name='foo', version='1.0.0')\n",
        )?;

        let args = execute_setup_script(&script)?;
        assert_eq!(args.keys().collect::<Vec<_>>(), vec!["name", "version"]);
        assert_eq!(args.get("version"), Some(&Value::str("1.0.0")));
        Ok(())
    }

    #[test]
    fn test_relative_reads_use_script_directory() -> TestResult {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("README.md"), "Long text\r\nsecond line\n")?;
        let script = write_script(
            &dir,
            r#"
import setuptools

with open("README.md") as fh:
    long_description = fh.read()

setuptools.setup(name="foo", long_description=long_description)
"#,
        )?;

        let args = execute_setup_script(&script)?;
        assert_eq!(
            args.get("long_description"),
            Some(&Value::str("Long text\nsecond line\n"))
        );
        Ok(())
    }

    #[test]
    fn test_setup_not_called() -> TestResult {
        let dir = TempDir::new()?;
        let script = write_script(&dir, "import setuptools\nNAME = 'foo'\n")?;

        let err = execute_setup_script(&script).err();
        assert!(matches!(err, Some(SandboxError::SetupNotCalled(_))));
        Ok(())
    }

    #[test]
    fn test_missing_script() {
        let err = execute_setup_script(Path::new("/definitely/not/here/setup.py")).err();
        assert!(matches!(err, Some(SandboxError::Read { .. })));
    }

    #[test]
    fn test_script_errors_propagate() -> TestResult {
        let dir = TempDir::new()?;
        let script = write_script(
            &dir,
            "from setuptools import setup\nsetup(long_description=open('MISSING.rst').read())\n",
        )?;

        match execute_setup_script(&script) {
            Err(SandboxError::Script(err)) => {
                assert_eq!(err.exception_name(), "FileNotFoundError");
            }
            other => panic!("expected a script error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_concurrent_executions_are_independent() -> TestResult {
        let dirs: Vec<TempDir> = (0..4).map(|_| TempDir::new()).collect::<Result<_, _>>()?;
        for (idx, dir) in dirs.iter().enumerate() {
            fs::write(dir.path().join("VERSION"), format!("0.{}.0", idx))?;
            write_script(
                dir,
                "from setuptools import setup\nsetup(version=open('VERSION').read().strip())\n",
            )?;
        }

        let handles: Vec<_> = dirs
            .iter()
            .map(|dir| {
                let script = dir.path().join("setup.py");
                thread::spawn(move || execute_setup_script(&script).map(|args| args.get("version").cloned()))
            })
            .collect();

        for (idx, handle) in handles.into_iter().enumerate() {
            let version = handle.join().map_err(|_| "thread panicked")??;
            assert_eq!(version, Some(Value::Str(format!("0.{}.0", idx))));
        }
        Ok(())
    }
}

//! The conversion pipeline: execute, transcribe, merge, render

use crate::errors::{ConvertError, FieldError};
use crate::file_lookup::SiblingFiles;
use crate::transcribe::transcribe;
use py2cfg_ast::sandbox::execute_setup_script;
use py2cfg_ast::value::CapturedArguments;
use py2cfg_config::FormatOptions;
use py2cfg_document::{merge, read_from_path, render};
use std::path::Path;
use tracing::{debug, info};

/// Options for one conversion
#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    pub format: FormatOptions,
    /// Merge into the `setup.cfg` next to the script when there is one
    pub merge_existing: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            format: FormatOptions::default(),
            merge_existing: true,
        }
    }
}

/// Result of a conversion
#[derive(Debug)]
pub struct Converted {
    /// The rendered setup.cfg, without a trailing newline
    pub text: String,
    /// Fields left out because their values had the wrong shape
    pub field_errors: Vec<FieldError>,
}

/// Execute the script at `setup_py` and return its `setup()` arguments
pub fn capture_arguments(setup_py: &Path) -> Result<CapturedArguments, ConvertError> {
    Ok(execute_setup_script(setup_py)?)
}

/// Convert the script at `setup_py` into setup.cfg text
///
/// Nothing is written; the caller decides where the text goes.
pub fn convert(setup_py: &Path, options: &ConvertOptions) -> Result<Converted, ConvertError> {
    let args = capture_arguments(setup_py)?;
    debug!("Captured {} setup() arguments", args.len());

    let script_dir = setup_py
        .canonicalize()
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let files = SiblingFiles::scan(&script_dir);

    let transcription = transcribe(&args, &options.format, &files);
    let mut document = transcription.document;

    let existing = script_dir.join("setup.cfg");
    if options.merge_existing && existing.is_file() {
        info!("Merging into {}", existing.display());
        let persisted = read_from_path(&existing)?;
        document = merge(&persisted, &document);
    }

    Ok(Converted {
        text: render(&document, options.format.dangling_list_indent),
        field_errors: transcription.errors,
    })
}

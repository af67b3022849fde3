//! Lookup of files that sit next to the setup script
//!
//! `license` and `long_description` are usually read from a file at
//! build time; when the captured text matches a sibling file exactly the
//! document refers to the file instead of inlining it.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Something that can tell which file holds a given text
pub trait FileLookup {
    /// Name of the first file whose contents equal `content`
    fn file_with_contents(&self, content: &str) -> Option<String>;
}

/// Regular files directly inside one directory, in file-name order
#[derive(Debug, Clone, Default)]
pub struct SiblingFiles {
    files: Vec<PathBuf>,
}

impl SiblingFiles {
    /// List the files of `dir` without descending into subdirectories
    pub fn scan(dir: &Path) -> Self {
        let files = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        SiblingFiles { files }
    }
}

impl FileLookup for SiblingFiles {
    fn file_with_contents(&self, content: &str) -> Option<String> {
        for path in &self.files {
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            // Scripts read text with universal newlines
            if text.replace("\r\n", "\n") == content {
                return path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
            }
        }
        None
    }
}

/// Lookup that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFiles;

impl FileLookup for NoFiles {
    fn file_with_contents(&self, _content: &str) -> Option<String> {
        None
    }
}

//! The different things that can stand for "a setup.cfg document"
//!
//! Tests and callers compare documents that arrive as text, files, readers,
//! plain group lists or already-parsed documents. [`DocumentSource`] turns
//! each of them into a [`ConfigDocument`] so they can be compared.

use crate::document::{ConfigDocument, Group};
use crate::errors::DocumentError;
use crate::parser::{parse_str, read_from_path};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

pub enum DocumentSource {
    Text(String),
    Path(PathBuf),
    Reader(Box<dyn Read>),
    Groups(Vec<(String, Vec<(String, String)>)>),
    Document(ConfigDocument),
}

impl DocumentSource {
    pub fn into_document(self) -> Result<ConfigDocument, DocumentError> {
        match self {
            DocumentSource::Text(text) => parse_str(&text),
            DocumentSource::Path(path) => read_from_path(&path),
            DocumentSource::Reader(mut reader) => {
                let mut text = String::new();
                reader.read_to_string(&mut text)?;
                parse_str(&text)
            }
            DocumentSource::Groups(groups) => {
                let mut doc = ConfigDocument::new();
                for (name, entries) in groups {
                    let mut group = Group::new(name);
                    group.extend(entries);
                    doc.push_group(group);
                }
                Ok(doc)
            }
            DocumentSource::Document(doc) => Ok(doc),
        }
    }
}

impl From<&str> for DocumentSource {
    fn from(text: &str) -> Self {
        DocumentSource::Text(text.to_string())
    }
}

impl From<String> for DocumentSource {
    fn from(text: String) -> Self {
        DocumentSource::Text(text)
    }
}

impl From<&Path> for DocumentSource {
    fn from(path: &Path) -> Self {
        DocumentSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        DocumentSource::Path(path)
    }
}

impl From<ConfigDocument> for DocumentSource {
    fn from(doc: ConfigDocument) -> Self {
        DocumentSource::Document(doc)
    }
}

type Canonical = BTreeMap<String, BTreeMap<String, String>>;

fn canonical(doc: &ConfigDocument) -> Canonical {
    doc.groups()
        .map(|group| {
            let entries = group
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            (group.name().to_string(), entries)
        })
        .collect()
}

/// Whether two documents hold the same groups, keys and values
///
/// Ordering is ignored; use `==` on [`ConfigDocument`] to compare order too.
pub fn documents_equal(
    left: impl Into<DocumentSource>,
    right: impl Into<DocumentSource>,
) -> Result<bool, DocumentError> {
    let left = left.into().into_document()?;
    let right = right.into().into_document()?;
    Ok(canonical(&left) == canonical(&right))
}

#[cfg(test)]
mod tests {
    use crate::source::*;
    use std::io::Cursor;

    #[test]
    fn test_text_and_groups_compare_equal() -> Result<(), DocumentError> {
        let groups = DocumentSource::Groups(vec![(
            "options".to_string(),
            vec![("zip_safe".to_string(), "True".to_string())],
        )]);
        assert!(documents_equal("[options]\nzip_safe = True\n", groups)?);
        Ok(())
    }

    #[test]
    fn test_order_is_ignored() -> Result<(), DocumentError> {
        let left = "[a]\nx = 1\ny = 2\n[b]\nz = 3\n";
        let right = "[b]\nz = 3\n[a]\ny = 2\nx = 1\n";
        assert!(documents_equal(left, right)?);
        assert!(!documents_equal(left, "[a]\nx = 1\n")?);
        Ok(())
    }

    #[test]
    fn test_reader_and_path_sources() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::TempDir::new()?;
        let path = temp_dir.path().join("setup.cfg");
        std::fs::write(&path, "[metadata]\nname = foo\n")?;

        let reader = DocumentSource::Reader(Box::new(Cursor::new("[metadata]\nname=foo")));
        assert!(documents_equal(path.as_path(), reader)?);
        Ok(())
    }

    #[test]
    fn test_document_source_passthrough() -> Result<(), DocumentError> {
        let doc = parse_str("[metadata]\nname = foo\n")?;
        let again = DocumentSource::from(doc.clone()).into_document()?;
        assert_eq!(doc, again);
        Ok(())
    }

    #[test]
    fn test_malformed_text_is_an_error() {
        assert!(documents_equal("no header", "[a]\n").is_err());
    }
}

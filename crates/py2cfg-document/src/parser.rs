//! Reader for existing setup.cfg files
//!
//! Follows the rules of Python's `configparser` with interpolation disabled,
//! since that is what setuptools uses to read the file:
//! - `#` and `;` start full-line comments
//! - `=` or `:` separate a key from its value, whichever comes first
//! - lines indented deeper than their key continue the previous value
//! - duplicate sections or keys are errors

use crate::document::{normalize_key, ConfigDocument, Group};
use crate::errors::DocumentError;
use std::fs;
use std::path::Path;
use tracing::debug;

struct PendingOption {
    key: String,
    indent: usize,
    lines: Vec<String>,
}

impl PendingOption {
    fn finish(self, group: &mut Group) {
        let value = self.lines.join("\n");
        group.insert(&self.key, value.trim_end());
    }
}

fn is_comment(stripped: &str) -> bool {
    stripped.starts_with('#') || stripped.starts_with(';')
}

fn section_header(stripped: &str) -> Option<&str> {
    if stripped.len() > 2 && stripped.starts_with('[') && stripped.ends_with(']') {
        Some(&stripped[1..stripped.len() - 1])
    } else {
        None
    }
}

fn split_option(stripped: &str) -> Option<(&str, &str)> {
    let idx = stripped.find(['=', ':'])?;
    Some((stripped[..idx].trim(), stripped[idx + 1..].trim()))
}

/// Parse setup.cfg text into a document
pub fn parse_str(content: &str) -> Result<ConfigDocument, DocumentError> {
    let mut doc = ConfigDocument::new();
    let mut current: Option<Group> = None;
    let mut pending: Option<PendingOption> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let stripped = raw.trim();

        if is_comment(stripped) {
            continue;
        }

        if stripped.is_empty() {
            // Blank lines belong to the value until a non-continuation line
            // shows up; trailing ones are trimmed in `finish`.
            if let Some(option) = pending.as_mut() {
                option.lines.push(String::new());
            }
            continue;
        }

        let indent = raw.len() - raw.trim_start().len();
        if let Some(option) = pending.as_mut() {
            if indent > option.indent {
                option.lines.push(stripped.to_string());
                continue;
            }
        }

        if let (Some(option), Some(group)) = (pending.take(), current.as_mut()) {
            option.finish(group);
        }

        if let Some(name) = section_header(stripped) {
            if let Some(group) = current.take() {
                doc.push_group(group);
            }
            if doc.group(name).is_some() {
                return Err(DocumentError::DuplicateSection {
                    section: name.to_string(),
                    line: line_no,
                });
            }
            current = Some(Group::new(name));
            continue;
        }

        let Some(group) = current.as_ref() else {
            return Err(DocumentError::MissingSectionHeader {
                line: line_no,
                text: raw.to_string(),
            });
        };

        let Some((key, value)) = split_option(stripped) else {
            return Err(DocumentError::Parse {
                line: line_no,
                text: raw.to_string(),
            });
        };

        if key.is_empty() {
            return Err(DocumentError::Parse {
                line: line_no,
                text: raw.to_string(),
            });
        }

        if group.contains_key(key) {
            return Err(DocumentError::DuplicateOption {
                section: group.name().to_string(),
                key: normalize_key(key),
                line: line_no,
            });
        }

        pending = Some(PendingOption {
            key: key.to_string(),
            indent,
            lines: vec![value.to_string()],
        });
    }

    if let Some(mut group) = current.take() {
        if let Some(option) = pending.take() {
            option.finish(&mut group);
        }
        doc.push_group(group);
    }

    debug!("Parsed setup.cfg with {} groups", doc.len());
    Ok(doc)
}

/// Read and parse a setup.cfg file
pub fn read_from_path(path: &Path) -> Result<ConfigDocument, DocumentError> {
    debug!("Reading existing document: {:?}", path);
    let content = fs::read_to_string(path)?;
    parse_str(&content)
}

//! `entry_points`, given either as a mapping or as INI text

use crate::errors::FieldError;
use crate::transcribe::transforms::{describe, join_lines};
use py2cfg_ast::value::Value;

const EXPECTED: &str = "a mapping of groups to entry point lists, or INI text";

/// One `(group, block)` pair per entry point group
pub fn entry_point_groups(field: &str, value: &Value) -> Result<Vec<(String, String)>, FieldError> {
    match value {
        Value::Dict(pairs) => pairs
            .iter()
            .map(|(group, entries)| {
                let group = group
                    .as_str()
                    .ok_or_else(|| FieldError::new(field, EXPECTED, describe(group)))?;
                Ok((group.to_string(), join_lines(&entry_lines(field, entries)?)))
            })
            .collect(),
        Value::Str(text) => parse_ini(field, text),
        other => Err(FieldError::new(field, EXPECTED, describe(other))),
    }
}

fn entry_lines(field: &str, entries: &Value) -> Result<Vec<String>, FieldError> {
    match entries {
        Value::Str(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| FieldError::new(field, EXPECTED, format!("list of {}", describe(item))))
            })
            .collect(),
        other => Err(FieldError::new(field, EXPECTED, describe(other))),
    }
}

/// Parse `[group]` headers followed by `name = target` lines
fn parse_ini(field: &str, text: &str) -> Result<Vec<(String, String)>, FieldError> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            groups.push((name.trim().to_string(), Vec::new()));
            continue;
        }

        match groups.last_mut() {
            Some((_, entries)) => entries.push(normalize_entry(line)),
            None => {
                return Err(FieldError::new(
                    field,
                    EXPECTED,
                    format!("entry outside of a group: {:?}", line),
                ))
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|(group, entries)| (group, join_lines(&entries)))
        .collect())
}

/// `name=target` and `name = target` render the same
fn normalize_entry(line: &str) -> String {
    match line.split_once('=') {
        Some((name, target)) => format!("{} = {}", name.trim(), target.trim()),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::transcribe::entry_points::*;

    #[test]
    fn test_mapping_becomes_block_per_group() -> Result<(), FieldError> {
        let value = Value::Dict(vec![(
            Value::str("console_scripts"),
            Value::List(vec![
                Value::str("py2cfg = py2cfg:main"),
                Value::str("other = py2cfg.other:run"),
            ]),
        )]);

        assert_eq!(
            entry_point_groups("entry_points", &value)?,
            vec![(
                "console_scripts".to_string(),
                "\npy2cfg = py2cfg:main\nother = py2cfg.other:run".to_string()
            )]
        );
        Ok(())
    }

    #[test]
    fn test_ini_text() -> Result<(), FieldError> {
        let text = "\n    [console_scripts]\n    foo=foo.cli:main\n    # comment\n\n    [gui_scripts]\n    bar = bar:run\n";
        assert_eq!(
            entry_point_groups("entry_points", &Value::str(text))?,
            vec![
                ("console_scripts".to_string(), "\nfoo = foo.cli:main".to_string()),
                ("gui_scripts".to_string(), "\nbar = bar:run".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_ini_entry_without_group_is_an_error() {
        let err = entry_point_groups("entry_points", &Value::str("foo = foo:main")).err();
        assert!(err.is_some_and(|e| e.found.contains("outside of a group")));
    }

    #[test]
    fn test_other_shapes_are_errors() {
        assert!(entry_point_groups("entry_points", &Value::Int(3)).is_err());
        let bad_items = Value::Dict(vec![(Value::str("console_scripts"), Value::Int(1))]);
        assert!(entry_point_groups("entry_points", &bad_items).is_err());
    }
}

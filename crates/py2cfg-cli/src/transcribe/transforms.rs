//! Value transforms from captured `setup()` arguments to setup.cfg strings
//!
//! Every transform validates the shape of its input and reports a
//! [`FieldError`] naming the field instead of guessing.

use crate::errors::FieldError;
use crate::file_lookup::FileLookup;
use py2cfg_ast::value::Value;
use py2cfg_config::FormatOptions;

const STRINGS: &str = "a string or a list of strings";

/// Short description of a value for error messages
pub fn describe(value: &Value) -> String {
    match value {
        Value::Opaque(text) => text.clone(),
        Value::Reference(name) => name.clone(),
        other => other.type_name().to_string(),
    }
}

/// A single value written as-is
pub fn scalar(field: &str, value: &Value) -> Result<String, FieldError> {
    match value {
        Value::Str(_) | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Path(_) => {
            Ok(value.python_str())
        }
        other => Err(FieldError::new(field, "a string, number or boolean", describe(other))),
    }
}

/// `"\n"` followed by one item per line
pub fn join_lines(items: &[String]) -> String {
    format!("\n{}", items.join("\n"))
}

/// Items of a list field; a plain string is split on whitespace
fn words(field: &str, value: &Value) -> Result<Vec<String>, FieldError> {
    match value {
        Value::Str(text) => Ok(text.split_whitespace().map(str::to_string).collect()),
        other => sequence_items(field, other),
    }
}

/// Items of a requirement list; a plain string holds one requirement per line
fn requirement_lines(field: &str, value: &Value) -> Result<Vec<String>, FieldError> {
    match value {
        Value::Str(text) => Ok(non_empty_lines(text)),
        other => sequence_items(field, other),
    }
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn sequence_items(field: &str, value: &Value) -> Result<Vec<String>, FieldError> {
    let items = value
        .as_sequence()
        .ok_or_else(|| FieldError::new(field, STRINGS, describe(value)))?;

    items
        .iter()
        .map(|item| match item {
            Value::Str(s) => Ok(s.clone()),
            Value::Path(_) => Ok(item.python_str()),
            other => Err(FieldError::new(field, STRINGS, format!("list of {}", describe(other)))),
        })
        .collect()
}

fn joined_or_block(items: &[String], separator: &str, options: &FormatOptions) -> String {
    let inline = items.join(separator);
    if options.dangles(inline.chars().count()) {
        join_lines(items)
    } else {
        inline
    }
}

/// Comma-separated list that dangles once it exceeds the threshold
pub fn list_comma(field: &str, value: &Value, options: &FormatOptions) -> Result<String, FieldError> {
    let items = words(field, value)?;
    Ok(joined_or_block(&items, ", ", options))
}

/// Semicolon-separated list that dangles once it exceeds the threshold
///
/// A plain string is read as one requirement per line, with blank lines
/// dropped. Unlike [`list_comma`] it is not split on whitespace, so a
/// specifier such as `foo >= 1.0` stays whole.
pub fn list_semicolon(
    field: &str,
    value: &Value,
    options: &FormatOptions,
) -> Result<String, FieldError> {
    let items = requirement_lines(field, value)?;
    Ok(joined_or_block(&items, "; ", options))
}

/// One item per line, always dangling
pub fn block(field: &str, value: &Value) -> Result<String, FieldError> {
    let items = match value {
        Value::Str(text) => non_empty_lines(text),
        other => sequence_items(field, other)?,
    };
    Ok(join_lines(&items))
}

/// Key of a mapping field
fn key_text(field: &str, key: &Value) -> Result<String, FieldError> {
    match key {
        Value::Str(s) => Ok(s.clone()),
        Value::Int(_) | Value::Bool(_) | Value::Float(_) => Ok(key.python_str()),
        other => Err(FieldError::new(field, "string keys", describe(other))),
    }
}

/// `key = value` lines, one indentation level deeper than the field
pub fn mapping_block(field: &str, value: &Value) -> Result<String, FieldError> {
    let pairs = value
        .as_dict()
        .ok_or_else(|| FieldError::new(field, "a mapping", describe(value)))?;

    let mut lines = Vec::with_capacity(pairs.len());
    for (key, item) in pairs {
        let key = key_text(field, key)?;
        let item = scalar(field, item)?;
        let line = format!("{} = {}", key, item);
        lines.push(format!("\t{}", line.trim_start()));
    }
    Ok(join_lines(&lines))
}

/// `file: NAME` when a sibling file holds exactly this text, else the text
pub fn file_or_literal(
    field: &str,
    value: &Value,
    files: &dyn FileLookup,
) -> Result<String, FieldError> {
    match value {
        Value::Str(text) => Ok(files
            .file_with_contents(text)
            .map_or_else(|| text.clone(), |name| format!("file: {}", name))),
        other => scalar(field, other),
    }
}

/// Normalize one section value to its `"; "`-joined form
pub fn semicolon_joined(field: &str, value: &Value) -> Result<String, FieldError> {
    let items = match value {
        Value::Str(s) => vec![s.clone()],
        other => sequence_items(field, other)?,
    };
    Ok(items.join("; "))
}

/// A mapping of names to strings or string lists, one key per name
pub fn section_from_mapping(field: &str, value: &Value) -> Result<Vec<(String, String)>, FieldError> {
    let pairs = value
        .as_dict()
        .ok_or_else(|| FieldError::new(field, "a mapping", describe(value)))?;

    pairs
        .iter()
        .map(|(key, item)| Ok((key_text(field, key)?, semicolon_joined(field, item)?)))
        .collect()
}

/// `data_files` given as a list of `(directory, files)` pairs
pub fn data_files(field: &str, value: &Value) -> Result<Vec<(String, String)>, FieldError> {
    if value.as_dict().is_some() {
        return section_from_mapping(field, value);
    }

    let entries = value
        .as_sequence()
        .ok_or_else(|| FieldError::new(field, "a list of (directory, files) pairs", describe(value)))?;

    entries
        .iter()
        .map(|entry| match entry.as_sequence() {
            Some([dir, files]) => Ok((key_text(field, dir)?, semicolon_joined(field, files)?)),
            _ => Err(FieldError::new(
                field,
                "a list of (directory, files) pairs",
                format!("list of {}", describe(entry)),
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::file_lookup::NoFiles;
    use crate::transcribe::transforms::*;
    use py2cfg_config::DanglingLists;

    fn strs(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::str(*s)).collect())
    }

    struct OneFile;

    impl FileLookup for OneFile {
        fn file_with_contents(&self, content: &str) -> Option<String> {
            (content == "BSD 3-Clause License\n").then(|| "LICENSE".to_string())
        }
    }

    #[test]
    fn test_scalar() -> Result<(), FieldError> {
        assert_eq!(scalar("zip_safe", &Value::Bool(true))?, "True");
        assert_eq!(scalar("version", &Value::Float(1.5))?, "1.5");
        assert_eq!(scalar("name", &Value::str("foo"))?, "foo");

        let err = scalar("version", &Value::None).err();
        assert_eq!(
            err.map(|e| e.to_string()),
            Some("version: expected a string, number or boolean, found NoneType".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_list_comma_threshold() -> Result<(), FieldError> {
        let options = FormatOptions::default();
        assert_eq!(
            list_comma("keywords", &Value::str("ansi terminal markup"), &options)?,
            "ansi, terminal, markup"
        );

        let long = strs(&["alpha-package", "beta-package", "gamma-package"]);
        assert_eq!(
            list_comma("py_modules", &long, &options)?,
            "\nalpha-package\nbeta-package\ngamma-package"
        );
        Ok(())
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() -> Result<(), FieldError> {
        let options = FormatOptions::new(DanglingLists::Threshold(6), 4);
        // "ab, cd" is exactly six characters
        assert_eq!(list_comma("scripts", &strs(&["ab", "cd"]), &options)?, "ab, cd");
        assert_eq!(
            list_comma("scripts", &strs(&["ab", "cde"]), &options)?,
            "\nab\ncde"
        );
        Ok(())
    }

    #[test]
    fn test_always_and_never_policies() -> Result<(), FieldError> {
        let always = FormatOptions::new(DanglingLists::Always, 4);
        let never = FormatOptions::new(DanglingLists::Never, 4);
        let value = strs(&["colorama"]);

        assert_eq!(list_semicolon("install_requires", &value, &always)?, "\ncolorama");
        assert_eq!(list_semicolon("install_requires", &value, &never)?, "colorama");
        Ok(())
    }

    #[test]
    fn test_list_semicolon_keeps_requirement_text() -> Result<(), FieldError> {
        let options = FormatOptions::default();
        let value = Value::str("requests >= 2.0\n\nclick\n");
        assert_eq!(
            list_semicolon("install_requires", &value, &options)?,
            "requests >= 2.0; click"
        );
        assert_eq!(
            list_comma("install_requires", &value, &options)?,
            "requests, >=, 2.0, click"
        );
        Ok(())
    }

    #[test]
    fn test_list_rejects_wrong_shapes() {
        let options = FormatOptions::default();
        let dict = Value::Dict(vec![(Value::str("a"), Value::str("b"))]);
        assert!(list_comma("scripts", &dict, &options).is_err());

        let mixed = Value::List(vec![Value::str("a"), Value::Int(1)]);
        let err = list_semicolon("install_requires", &mixed, &options).err();
        assert_eq!(err.map(|e| e.found), Some("list of int".to_string()));

        let opaque = Value::Opaque("<get_requirements()>".to_string());
        let err = list_semicolon("install_requires", &opaque, &options).err();
        assert_eq!(err.map(|e| e.found), Some("<get_requirements()>".to_string()));
    }

    #[test]
    fn test_block() -> Result<(), FieldError> {
        let value = strs(&["Topic :: Utilities", "Intended Audience :: Developers"]);
        assert_eq!(
            block("classifiers", &value)?,
            "\nTopic :: Utilities\nIntended Audience :: Developers"
        );
        Ok(())
    }

    #[test]
    fn test_mapping_block() -> Result<(), FieldError> {
        let value = Value::Dict(vec![
            (Value::str(""), Value::str("src1")),
            (Value::str("a"), Value::str("src2")),
        ]);
        assert_eq!(mapping_block("package_dir", &value)?, "\n\t= src1\n\ta = src2");
        assert!(mapping_block("package_dir", &strs(&["src"])).is_err());
        Ok(())
    }

    #[test]
    fn test_file_or_literal() -> Result<(), FieldError> {
        assert_eq!(
            file_or_literal("license", &Value::str("BSD 3-Clause License\n"), &OneFile)?,
            "file: LICENSE"
        );
        assert_eq!(
            file_or_literal("license", &Value::str("Revised BSD License"), &OneFile)?,
            "Revised BSD License"
        );
        assert_eq!(
            file_or_literal("license", &Value::str("MIT"), &NoFiles)?,
            "MIT"
        );
        Ok(())
    }

    #[test]
    fn test_section_from_mapping() -> Result<(), FieldError> {
        let value = Value::Dict(vec![
            (Value::str("tests"), strs(&["tox >= 2.6.0", "pytest >= 3.0.3"])),
            (Value::str("docs"), Value::str("sphinx")),
        ]);
        assert_eq!(
            section_from_mapping("extras_require", &value)?,
            vec![
                ("tests".to_string(), "tox >= 2.6.0; pytest >= 3.0.3".to_string()),
                ("docs".to_string(), "sphinx".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_section_from_mapping_has_no_threshold() -> Result<(), FieldError> {
        let many: Vec<String> = (0..20).map(|i| format!("requirement-{}", i)).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let value = Value::Dict(vec![(Value::str("all"), strs(&refs))]);

        let section = section_from_mapping("extras_require", &value)?;
        assert_eq!(section[0].1, many.join("; "));
        Ok(())
    }

    #[test]
    fn test_data_files_pairs() -> Result<(), FieldError> {
        let value = Value::List(vec![
            Value::Tuple(vec![Value::str("share/man"), strs(&["man/foo.1"])]),
            Value::Tuple(vec![Value::str("etc"), strs(&["foo.conf", "bar.conf"])]),
        ]);
        assert_eq!(
            data_files("data_files", &value)?,
            vec![
                ("share/man".to_string(), "man/foo.1".to_string()),
                ("etc".to_string(), "foo.conf; bar.conf".to_string()),
            ]
        );

        assert!(data_files("data_files", &strs(&["etc"])).is_err());
        Ok(())
    }
}

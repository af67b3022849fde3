//! Field transcription from captured `setup()` arguments into a document
//!
//! Fields are copied only when present and never defaulted. Output order
//! follows the [`FIELDS`] table, not the order of the `setup()` call.

pub mod entry_points;
pub mod transforms;

use crate::errors::FieldError;
use crate::file_lookup::FileLookup;
use py2cfg_ast::value::{CapturedArguments, DiscoveryMarker, Value};
use py2cfg_config::FormatOptions;
use py2cfg_document::ConfigDocument;
use tracing::debug;

/// How a captured value is turned into a setup.cfg string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Scalar,
    FileOrLiteral,
    ListComma,
    ListSemicolon,
    Block,
    MappingBlock,
    /// A discovery token, or else a comma list
    Packages,
}

/// Source field, destination group, transform
pub const FIELDS: &[(&str, &str, Transform)] = &[
    ("name", "metadata", Transform::Scalar),
    ("version", "metadata", Transform::Scalar),
    ("author", "metadata", Transform::Scalar),
    ("author_email", "metadata", Transform::Scalar),
    ("maintainer", "metadata", Transform::Scalar),
    ("maintainer_email", "metadata", Transform::Scalar),
    ("license", "metadata", Transform::FileOrLiteral),
    ("license_files", "metadata", Transform::ListComma),
    ("description", "metadata", Transform::Scalar),
    ("keywords", "metadata", Transform::ListComma),
    ("url", "metadata", Transform::Scalar),
    ("download_url", "metadata", Transform::Scalar),
    ("project_urls", "metadata", Transform::MappingBlock),
    ("long_description", "metadata", Transform::FileOrLiteral),
    ("long_description_content_type", "metadata", Transform::Scalar),
    ("classifiers", "metadata", Transform::Block),
    ("platforms", "metadata", Transform::ListComma),
    ("provides", "metadata", Transform::ListComma),
    ("requires", "metadata", Transform::ListComma),
    ("obsoletes", "metadata", Transform::ListComma),
    ("py_modules", "options", Transform::ListComma),
    ("packages", "options", Transform::Packages),
    ("package_dir", "options", Transform::MappingBlock),
    ("zip_safe", "options", Transform::Scalar),
    ("setup_requires", "options", Transform::ListSemicolon),
    ("install_requires", "options", Transform::ListSemicolon),
    ("include_package_data", "options", Transform::Scalar),
    ("python_requires", "options", Transform::Scalar),
    ("use_2to3", "options", Transform::Scalar),
    ("use_2to3_fixers", "options", Transform::ListComma),
    ("use_2to3_exclude_fixers", "options", Transform::ListComma),
    ("convert_2to3_doctest", "options", Transform::ListComma),
    ("scripts", "options", Transform::ListComma),
    ("eager_resources", "options", Transform::ListComma),
    ("dependency_links", "options", Transform::ListComma),
    ("tests_require", "options", Transform::ListSemicolon),
    ("namespace_packages", "options", Transform::ListComma),
];

/// Fields that become a section of their own, one key per mapping entry
const SECTIONS: &[(&str, &str)] = &[
    ("entry_points", "options.entry_points"),
    ("extras_require", "options.extras_require"),
    ("package_data", "options.package_data"),
    ("exclude_package_data", "options.exclude_package_data"),
    ("data_files", "options.data_files"),
];

const FIND_SECTION: &str = "options.packages.find";

/// The transcribed document and the fields that could not be transcribed
#[derive(Debug, Default)]
pub struct Transcription {
    pub document: ConfigDocument,
    pub errors: Vec<FieldError>,
}

impl Transcription {
    fn record(&mut self, group: &str, key: &str, value: Result<String, FieldError>) {
        match value {
            Ok(text) => {
                self.document.set(group, key, text);
            }
            Err(err) => self.errors.push(err),
        }
    }
}

/// Build a fresh document from the captured arguments
pub fn transcribe(
    args: &CapturedArguments,
    options: &FormatOptions,
    files: &dyn FileLookup,
) -> Transcription {
    let mut out = Transcription::default();

    for &(field, group, transform) in FIELDS {
        let Some(value) = args.get(field) else {
            continue;
        };
        let text = apply(transform, field, value, options, files);
        out.record(group, field, text);
    }

    for &(field, section) in SECTIONS {
        let Some(value) = args.get(field) else {
            continue;
        };
        let pairs = match field {
            "entry_points" => entry_points::entry_point_groups(field, value),
            "data_files" => transforms::data_files(field, value),
            _ => transforms::section_from_mapping(field, value),
        };
        match pairs {
            // An empty mapping still yields an empty section
            Ok(pairs) => out.document.group_entry(section).extend(pairs),
            Err(err) => out.errors.push(err),
        }
    }

    if let Some(Value::Discovery(marker)) = args.get("packages") {
        discovery_section(marker, &mut out);
    }

    let ignored: Vec<&str> = args
        .keys()
        .filter(|key| !is_transcribed(key))
        .collect();
    if !ignored.is_empty() {
        debug!("Arguments without a setup.cfg field: {}", ignored.join(", "));
    }

    out
}

fn apply(
    transform: Transform,
    field: &str,
    value: &Value,
    options: &FormatOptions,
    files: &dyn FileLookup,
) -> Result<String, FieldError> {
    match transform {
        Transform::Scalar => transforms::scalar(field, value),
        Transform::FileOrLiteral => transforms::file_or_literal(field, value, files),
        Transform::ListComma => transforms::list_comma(field, value, options),
        Transform::ListSemicolon => transforms::list_semicolon(field, value, options),
        Transform::Block => transforms::block(field, value),
        Transform::MappingBlock => transforms::mapping_block(field, value),
        Transform::Packages => match value {
            Value::Discovery(marker) => Ok(marker.kind.token().to_string()),
            other => transforms::list_comma(field, other, options),
        },
    }
}

/// `[options.packages.find]` from the arguments of the discovery call
fn discovery_section(marker: &DiscoveryMarker, out: &mut Transcription) {
    let args = &marker.arguments;
    if args.is_empty() {
        return;
    }

    if let Some(value) = args.get("where") {
        let text = transforms::scalar("packages.where", value);
        out.record(FIND_SECTION, "where", text);
    }
    for key in ["exclude", "include"] {
        if let Some(value) = args.get(key) {
            let text = transforms::semicolon_joined(&format!("packages.{}", key), value);
            out.record(FIND_SECTION, key, text);
        }
    }
}

fn is_transcribed(field: &str) -> bool {
    FIELDS.iter().any(|(name, _, _)| *name == field)
        || SECTIONS.iter().any(|(name, _)| *name == field)
}

#[cfg(test)]
mod tests {
    use crate::file_lookup::NoFiles;
    use crate::transcribe::*;
    use py2cfg_ast::value::DiscoveryKind;
    use py2cfg_config::DanglingLists;

    fn args(entries: Vec<(&str, Value)>) -> CapturedArguments {
        entries.into_iter().collect()
    }

    fn strs(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::str(*s)).collect())
    }

    fn run(captured: &CapturedArguments) -> Transcription {
        transcribe(captured, &FormatOptions::default(), &NoFiles)
    }

    #[test]
    fn test_name_and_version_only() {
        let out = run(&args(vec![
            ("version", Value::str("1.0.0")),
            ("name", Value::str("foo")),
        ]));

        assert!(out.errors.is_empty());
        assert_eq!(out.document.group_names(), vec!["metadata"]);
        let metadata = out.document.group("metadata");
        assert_eq!(
            metadata.map(|g| g.keys().collect::<Vec<_>>()),
            Some(vec!["name", "version"])
        );
        assert_eq!(out.document.get("metadata", "version"), Some("1.0.0"));
    }

    #[test]
    fn test_absent_fields_produce_no_keys() {
        let out = run(&CapturedArguments::new());
        assert!(out.document.is_empty());
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_packages_discovery() {
        let marker = DiscoveryMarker {
            kind: DiscoveryKind::Packages,
            arguments: args(vec![
                ("where", Value::str("src1")),
                ("exclude", Value::Tuple(vec![Value::str("tests"), Value::str("unneeded")])),
            ]),
        };
        let out = run(&args(vec![("packages", Value::Discovery(marker))]));

        assert_eq!(out.document.get("options", "packages"), Some("find:"));
        assert_eq!(out.document.get(FIND_SECTION, "where"), Some("src1"));
        assert_eq!(out.document.get(FIND_SECTION, "exclude"), Some("tests; unneeded"));
    }

    #[test]
    fn test_bare_discovery_has_no_find_section() {
        let marker = DiscoveryMarker {
            kind: DiscoveryKind::NamespacePackages,
            arguments: CapturedArguments::new(),
        };
        let out = run(&args(vec![("packages", Value::Discovery(marker))]));

        assert_eq!(out.document.get("options", "packages"), Some("find_namespace:"));
        assert!(out.document.group(FIND_SECTION).is_none());
    }

    #[test]
    fn test_explicit_package_list() {
        let out = run(&args(vec![("packages", strs(&["foo", "foo.sub"]))]));
        assert_eq!(out.document.get("options", "packages"), Some("foo, foo.sub"));
    }

    #[test]
    fn test_sections_from_mappings() {
        let out = run(&args(vec![
            (
                "extras_require",
                Value::Dict(vec![(Value::str("tests"), strs(&["tox >= 2.6.0", "pytest"]))]),
            ),
            (
                "package_data",
                Value::Dict(vec![(Value::str(""), strs(&["*.txt", "*.rst"]))]),
            ),
            (
                "entry_points",
                Value::Dict(vec![(
                    Value::str("console_scripts"),
                    strs(&["foo = foo:main"]),
                )]),
            ),
        ]));

        assert!(out.errors.is_empty());
        assert_eq!(
            out.document.group_names(),
            vec!["options.entry_points", "options.extras_require", "options.package_data"]
        );
        assert_eq!(
            out.document.get("options.extras_require", "tests"),
            Some("tox >= 2.6.0; pytest")
        );
        assert_eq!(out.document.get("options.package_data", ""), Some("*.txt; *.rst"));
        assert_eq!(
            out.document.get("options.entry_points", "console_scripts"),
            Some("\nfoo = foo:main")
        );
    }

    #[test]
    fn test_wrong_shapes_are_reported_and_skipped() {
        let out = run(&args(vec![
            ("name", Value::str("foo")),
            ("install_requires", Value::Opaque("<get_requirements()>".to_string())),
            ("extras_require", strs(&["tests"])),
        ]));

        assert_eq!(out.document.get("metadata", "name"), Some("foo"));
        assert!(out.document.group("options").is_none());
        let fields: Vec<&str> = out.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["install_requires", "extras_require"]);
    }

    #[test]
    fn test_threshold_applies_to_lists() {
        let options = FormatOptions::new(DanglingLists::Always, 4);
        let out = transcribe(
            &args(vec![("install_requires", strs(&["colorama"]))]),
            &options,
            &NoFiles,
        );
        assert_eq!(out.document.get("options", "install_requires"), Some("\ncolorama"));
    }

    #[test]
    fn test_table_has_no_duplicates() {
        let mut names: Vec<&str> = FIELDS.iter().map(|(name, _, _)| *name).collect();
        names.extend(SECTIONS.iter().map(|(name, _)| *name));
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}

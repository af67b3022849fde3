//! Render a document to setup.cfg text

use crate::document::ConfigDocument;

/// Write the document the way `configparser` does: continuation lines of
/// multi-line values start with a tab and every group ends with a blank line.
pub fn write_raw(doc: &ConfigDocument) -> String {
    let mut out = String::new();
    for group in doc.groups() {
        out.push_str(&format!("[{}]\n", group.name()));
        for (key, value) in group.iter() {
            let value = value.replace('\n', "\n\t");
            out.push_str(&format!("{} = {}\n", key, value));
        }
        out.push('\n');
    }
    out
}

/// Replace each run of leading tabs with `indent` spaces, strip trailing
/// whitespace from every line and drop trailing blank lines.
pub fn normalize(raw: &str, indent: usize) -> String {
    let spaces = " ".repeat(indent);
    let lines: Vec<String> = raw
        .lines()
        .map(|line| {
            let body = line.trim_start_matches('\t');
            if body.len() == line.len() {
                line.trim_end().to_string()
            } else {
                format!("{}{}", spaces, body).trim_end().to_string()
            }
        })
        .collect();

    lines.join("\n").trim_end().to_string()
}

/// Render the document as final setup.cfg text (no trailing newline)
pub fn render(doc: &ConfigDocument, indent: usize) -> String {
    normalize(&write_raw(doc), indent)
}

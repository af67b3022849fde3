//! Merge a fresh transcription into an existing setup.cfg

use crate::document::{ConfigDocument, Group};
use tracing::debug;

/// Deep-merge `fresh` into `persisted`
///
/// Groups and keys keep the persisted order; anything only `fresh` has is
/// appended in `fresh` order. On a shared key the fresh value wins. Keys that
/// only the persisted document has are never removed.
pub fn merge(persisted: &ConfigDocument, fresh: &ConfigDocument) -> ConfigDocument {
    let mut merged = ConfigDocument::new();

    for group in persisted.groups() {
        let mut out = group.clone();
        if let Some(update) = fresh.group(group.name()) {
            for (key, value) in update.iter() {
                if let Some(previous) = out.insert(key, value) {
                    if previous != value {
                        debug!("[{}] {}: replacing existing value", group.name(), key);
                    }
                }
            }
        }
        merged.push_group(out);
    }

    for group in fresh.groups() {
        if persisted.group(group.name()).is_none() {
            let mut out = Group::new(group.name());
            out.extend(group.iter());
            merged.push_group(out);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use crate::errors::DocumentError;
    use crate::merge::*;
    use crate::parser::parse_str;

    #[test]
    fn test_merge_adds_new_key_to_existing_group() -> Result<(), DocumentError> {
        let persisted = parse_str("[options]\ninstall_requires=python-dateutil\n")?;
        let fresh = parse_str("[options]\npackages=find:\n")?;

        let merged = merge(&persisted, &fresh);
        let keys: Vec<_> = merged
            .group("options")
            .map(|g| g.keys().collect())
            .unwrap_or_default();
        assert_eq!(keys, vec!["install_requires", "packages"]);
        assert_eq!(merged.get("options", "install_requires"), Some("python-dateutil"));
        assert_eq!(merged.get("options", "packages"), Some("find:"));
        Ok(())
    }

    #[test]
    fn test_merge_fresh_value_wins() -> Result<(), DocumentError> {
        let persisted = parse_str("[metadata]\nname = old\nurl = https://a\n")?;
        let fresh = parse_str("[metadata]\nname = new\n")?;

        let merged = merge(&persisted, &fresh);
        assert_eq!(merged.get("metadata", "name"), Some("new"));
        assert_eq!(merged.get("metadata", "url"), Some("https://a"));
        Ok(())
    }

    #[test]
    fn test_merge_group_order() -> Result<(), DocumentError> {
        let persisted = parse_str("[tool:pytest]\naddopts = -q\n\n[options]\n")?;
        let fresh = parse_str(
            "[metadata]\nname = foo\n[options]\nzip_safe = False\n[options.extras_require]\ntests = pytest\n",
        )?;

        let merged = merge(&persisted, &fresh);
        assert_eq!(
            merged.group_names(),
            vec!["tool:pytest", "options", "metadata", "options.extras_require"]
        );
        assert_eq!(merged.get("options", "zip_safe"), Some("False"));
        Ok(())
    }

    #[test]
    fn test_merge_empty_fresh_is_identity() -> Result<(), DocumentError> {
        let persisted =
            parse_str("[metadata]\nname = foo\nversion = 1.0\n\n[flake8]\nmax-line-length = 100\n")?;
        let merged = merge(&persisted, &ConfigDocument::new());
        assert_eq!(merged, persisted);
        Ok(())
    }

    #[test]
    fn test_merge_into_empty_is_fresh() -> Result<(), DocumentError> {
        let fresh = parse_str("[metadata]\nname = foo\n")?;
        assert_eq!(merge(&ConfigDocument::new(), &fresh), fresh);
        Ok(())
    }
}

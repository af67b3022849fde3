//! User configuration file (`~/.config/py2cfg/py2cfg.toml`)
//!
//! Every field is optional. Command-line flags are folded in with
//! [`Config::overlay`] so that a flag always beats the file, and the file
//! always beats the built-in defaults.

use crate::format::{DanglingLists, FormatOptions, DEFAULT_DANGLING_LIST_INDENT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for loading and resolving configuration
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file exists but could not be read
    Io(PathBuf, std::io::Error),
    /// The configuration file is not valid TOML for this schema
    Parse(PathBuf, toml::de::Error),
    /// More than one dangling-list policy was requested
    ConflictingPolicy(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, err) => {
                write!(f, "Failed to read config file {}: {}", path.display(), err)
            }
            ConfigError::Parse(path, err) => {
                write!(f, "Failed to parse config file {}: {}", path.display(), err)
            }
            ConfigError::ConflictingPolicy(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dangling_list_threshold: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dangling_list_indent: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_use_dangling_lists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub never_use_dangling_lists: Option<bool>,
}

impl Config {
    /// Location of the user configuration file
    ///
    /// `PY2CFG_CONFIG` overrides the default location, which keeps tests and
    /// isolated runs away from the real home directory.
    pub fn path() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("PY2CFG_CONFIG") {
            let trimmed = env_path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }

        #[cfg(not(target_os = "windows"))]
        let default = dirs::home_dir().map(|home| home.join(".config").join("py2cfg"));

        #[cfg(target_os = "windows")]
        let default = dirs::config_dir().map(|dir| dir.join("py2cfg"));

        default.map(|dir| dir.join("py2cfg.toml"))
    }

    /// Load the user configuration, or the empty configuration if there is none
    pub fn load() -> Result<Self, ConfigError> {
        match Self::path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    fn sets_policy(&self) -> bool {
        self.dangling_list_threshold.is_some()
            || self.always_use_dangling_lists.is_some()
            || self.never_use_dangling_lists.is_some()
    }

    /// Layer `other` on top of `self`
    ///
    /// The threshold and the two shortcuts form one policy: if `other` names
    /// any of them, all three are taken from `other`.
    pub fn overlay(mut self, other: Config) -> Config {
        if other.sets_policy() {
            self.dangling_list_threshold = other.dangling_list_threshold;
            self.always_use_dangling_lists = other.always_use_dangling_lists;
            self.never_use_dangling_lists = other.never_use_dangling_lists;
        }
        if other.dangling_list_indent.is_some() {
            self.dangling_list_indent = other.dangling_list_indent;
        }
        self
    }

    /// Resolve the dangling-list policy, rejecting contradictory settings
    pub fn dangling_lists(&self) -> Result<DanglingLists, ConfigError> {
        let always = self.always_use_dangling_lists.unwrap_or(false);
        let never = self.never_use_dangling_lists.unwrap_or(false);

        match (self.dangling_list_threshold, always, never) {
            (_, true, true) => Err(ConfigError::ConflictingPolicy(
                "always_use_dangling_lists and never_use_dangling_lists are mutually exclusive"
                    .to_string(),
            )),
            (Some(_), true, false) | (Some(_), false, true) => {
                Err(ConfigError::ConflictingPolicy(
                    "dangling_list_threshold cannot be combined with always/never_use_dangling_lists"
                        .to_string(),
                ))
            }
            (_, true, false) => Ok(DanglingLists::Always),
            (_, false, true) => Ok(DanglingLists::Never),
            (Some(limit), false, false) => Ok(DanglingLists::Threshold(limit)),
            (None, false, false) => Ok(DanglingLists::default()),
        }
    }

    pub fn format_options(&self) -> Result<FormatOptions, ConfigError> {
        let policy = self.dangling_lists()?;
        let indent = self
            .dangling_list_indent
            .unwrap_or(DEFAULT_DANGLING_LIST_INDENT);
        Ok(FormatOptions::new(policy, indent))
    }
}

#[cfg(test)]
mod tests {
    use crate::config_file::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_gives_defaults() -> Result<(), ConfigError> {
        let options = Config::default().format_options()?;
        assert_eq!(options, FormatOptions::default());
        Ok(())
    }

    #[test]
    fn test_load_from_path() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("py2cfg.toml");
        fs::write(&path, "dangling_list_threshold = 10\ndangling_list_indent = 2\n")?;

        let config = Config::load_from_path(&path)?;
        assert_eq!(config.dangling_list_threshold, Some(10));
        assert_eq!(config.dangling_list_indent, Some(2));

        let options = config.format_options()?;
        assert_eq!(options.dangling_list_threshold, 10);
        assert_eq!(options.dangling_list_indent, 2);
        Ok(())
    }

    #[test]
    fn test_load_rejects_unknown_types() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("py2cfg.toml");
        fs::write(&path, "dangling_list_threshold = \"wide\"\n")?;

        let result = Config::load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_, _))));
        Ok(())
    }

    #[test]
    fn test_overlay_replaces_whole_policy() -> Result<(), ConfigError> {
        let file = Config {
            dangling_list_threshold: Some(80),
            dangling_list_indent: Some(2),
            ..Config::default()
        };
        let flags = Config {
            always_use_dangling_lists: Some(true),
            ..Config::default()
        };

        let merged = file.overlay(flags);
        assert_eq!(merged.dangling_list_threshold, None);
        assert_eq!(merged.dangling_list_indent, Some(2));
        assert_eq!(merged.dangling_lists()?, DanglingLists::Always);
        Ok(())
    }

    #[test]
    fn test_overlay_keeps_file_policy_without_flags() -> Result<(), ConfigError> {
        let file = Config {
            never_use_dangling_lists: Some(true),
            ..Config::default()
        };
        let merged = file.overlay(Config::default());
        assert_eq!(merged.dangling_lists()?, DanglingLists::Never);
        Ok(())
    }

    #[test]
    fn test_conflicting_policies() {
        let both = Config {
            always_use_dangling_lists: Some(true),
            never_use_dangling_lists: Some(true),
            ..Config::default()
        };
        assert!(matches!(
            both.dangling_lists(),
            Err(ConfigError::ConflictingPolicy(_))
        ));

        let threshold_and_never = Config {
            dangling_list_threshold: Some(5),
            never_use_dangling_lists: Some(true),
            ..Config::default()
        };
        assert!(threshold_and_never.format_options().is_err());
    }

    #[test]
    fn test_false_shortcuts_are_ignored() -> Result<(), ConfigError> {
        let config = Config {
            dangling_list_threshold: Some(7),
            always_use_dangling_lists: Some(false),
            ..Config::default()
        };
        assert_eq!(config.dangling_lists()?, DanglingLists::Threshold(7));
        Ok(())
    }
}

//! Command-line options shared by the binary and the library API

use crate::errors::ConvertError;
use clap::{ArgGroup, Args, Parser};
use py2cfg_config::{Config, FormatOptions};

/// Global CLI options
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    #[arg(short, long, global = true, help = "Only report errors")]
    pub quiet: bool,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase verbosity (-v for debug, -vv for trace)")]
    pub verbose: u8,
}

impl GlobalOpts {
    /// Get the effective verbosity level
    /// - 0: quiet/warn only
    /// - 1: debug (-v)
    /// - 2: trace (-vv)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

/// Options controlling how lists are laid out
#[derive(Args, Debug, Clone, Default)]
#[command(group(
    ArgGroup::new("dangling_policy")
        .args(["dangling_list_threshold", "always_use_dangling_lists", "never_use_dangling_lists"])
        .multiple(false)
))]
pub struct FormatArgs {
    /// Lists longer than this many characters are converted to a dangling list [default: 40]
    #[arg(short = 't', long, value_name = "int")]
    pub dangling_list_threshold: Option<usize>,

    /// Number of spaces to use when indenting dangling lists [default: 4]
    #[arg(short = 'i', long, value_name = "int")]
    pub dangling_list_indent: Option<usize>,

    /// Use dangling lists everywhere
    #[arg(short = 'a', long)]
    pub always_use_dangling_lists: bool,

    /// Never use dangling lists
    #[arg(short = 'n', long)]
    pub never_use_dangling_lists: bool,
}

impl FormatArgs {
    /// The flags as a configuration layer; unset flags leave the file's values alone
    pub fn to_config(&self) -> Config {
        Config {
            dangling_list_threshold: self.dangling_list_threshold,
            dangling_list_indent: self.dangling_list_indent,
            always_use_dangling_lists: self.always_use_dangling_lists.then_some(true),
            never_use_dangling_lists: self.never_use_dangling_lists.then_some(true),
        }
    }

    /// Formatting options from the user config file with these flags on top
    pub fn load_format_options(&self) -> Result<FormatOptions, ConvertError> {
        self.format_options_over(Config::load()?)
    }

    /// Formatting options from `file` with these flags on top
    pub fn format_options_over(&self, file: Config) -> Result<FormatOptions, ConvertError> {
        Ok(file.overlay(self.to_config()).format_options()?)
    }
}

#[cfg(test)]
mod tests {
    use crate::common::*;
    use py2cfg_config::{ConfigError, DanglingLists};

    #[test]
    fn test_verbosity_level() {
        let opts = GlobalOpts {
            quiet: true,
            verbose: 2,
        };
        assert_eq!(opts.verbosity_level(), 0);
        let opts = GlobalOpts {
            quiet: false,
            verbose: 1,
        };
        assert_eq!(opts.verbosity_level(), 1);
    }

    #[test]
    fn test_flags_override_file_policy() -> Result<(), ConfigError> {
        let file = Config {
            dangling_list_threshold: Some(80),
            ..Config::default()
        };
        let flags = FormatArgs {
            never_use_dangling_lists: true,
            ..FormatArgs::default()
        };

        let resolved = file.overlay(flags.to_config());
        assert_eq!(resolved.dangling_lists()?, DanglingLists::Never);
        Ok(())
    }

    #[test]
    fn test_unset_flags_keep_file_values() -> Result<(), ConvertError> {
        let file = Config {
            dangling_list_indent: Some(2),
            dangling_list_threshold: Some(10),
            ..Config::default()
        };

        let options = FormatArgs::default().format_options_over(file)?;
        assert_eq!(options.dangling_list_threshold, 10);
        assert_eq!(options.dangling_list_indent, 2);
        Ok(())
    }

    #[test]
    fn test_conflicting_file_policy_is_a_config_error() {
        let file = Config {
            always_use_dangling_lists: Some(true),
            never_use_dangling_lists: Some(true),
            ..Config::default()
        };

        let err = FormatArgs::default().format_options_over(file).err();
        assert!(matches!(
            err,
            Some(ConvertError::Config(ConfigError::ConflictingPolicy(_)))
        ));

        let flags = FormatArgs {
            dangling_list_threshold: Some(20),
            ..FormatArgs::default()
        };
        let file = Config {
            never_use_dangling_lists: Some(true),
            ..Config::default()
        };
        let options = flags.format_options_over(file);
        assert!(options.is_ok_and(|options| options.dangling_list_threshold == 20));
    }
}

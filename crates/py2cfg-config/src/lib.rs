//! Configuration for py2cfg
//!
//! This crate holds the knobs that control how a converted `setup.cfg` is
//! rendered:
//! - the dangling-list threshold and indent (`FormatOptions`)
//! - the optional user configuration file (`Config`)
//!
//! Both the CLI and library callers resolve their final `FormatOptions`
//! through `Config::format_options`, so flag/file/default precedence lives in
//! one place.

pub mod config_file;
pub mod format;

pub use config_file::{Config, ConfigError};
pub use format::{DanglingLists, FormatOptions};

//! py2cfg library - conversion of setup.py scripts into setup.cfg documents
//!
//! The binary is a thin wrapper around [`convert::convert`]; the modules are
//! public so tests and other tools can drive individual stages.

pub mod common;
pub mod convert;
pub mod errors;
pub mod file_lookup;
pub mod transcribe;

//! Static execution of `setup.py` declaration scripts
//!
//! The script is parsed with ast-grep's Python grammar and evaluated by a
//! small tree-walking interpreter. Calls into `setuptools` (or `distutils`)
//! are answered by a [`shim::CapabilityProvider`] instead of the real module,
//! so running a script never builds, installs or writes anything. What comes
//! out is the list of keyword arguments passed to `setup()`.
//!
//! ```no_run
//! use py2cfg_ast::sandbox::execute_setup_script;
//! use std::path::Path;
//!
//! let args = execute_setup_script(Path::new("setup.py"))?;
//! for (name, value) in args.iter() {
//!     println!("{} = {}", name, value.python_repr());
//! }
//! # Ok::<(), py2cfg_ast::errors::SandboxError>(())
//! ```
pub mod errors;
mod interpreter;
pub mod sandbox;
pub mod shim;
pub mod value;

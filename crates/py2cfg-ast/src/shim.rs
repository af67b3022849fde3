//! Build-capability providers
//!
//! A declaration script talks to its build backend through a module such as
//! `setuptools`. The interpreter never imports the real thing: every call into
//! a module claimed by a [`CapabilityProvider`] is handed to that provider,
//! which decides what the call evaluates to.

use crate::value::{CapturedArguments, DiscoveryKind, DiscoveryMarker, Value};
use tracing::debug;

/// Arguments of one call, as evaluated by the interpreter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArguments {
    pub positional: Vec<Value>,
    pub keywords: CapturedArguments,
}

impl CallArguments {
    /// Argument by position, falling back to its keyword name
    pub fn get(&self, position: usize, name: &str) -> Option<&Value> {
        self.positional
            .get(position)
            .or_else(|| self.keywords.get(name))
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }
}

/// Something that stands in for a build-capability module during execution
pub trait CapabilityProvider {
    /// Whether `module` (a dotted module path) is served by this provider
    fn provides(&self, module: &str) -> bool;

    /// Evaluate `module.function(args)`
    fn call(&mut self, module: &str, function: &str, args: CallArguments) -> Value;
}

/// Parameter names of `find_packages(where, exclude, include)`
const DISCOVERY_PARAMETERS: [&str; 3] = ["where", "exclude", "include"];

/// Records calls into `setuptools`, `distutils` and `pkg_resources` without
/// building anything
#[derive(Debug, Default)]
pub struct SetuptoolsShim {
    setup_calls: Vec<CapturedArguments>,
    discovery_calls: Vec<CapturedArguments>,
    other_calls: Vec<String>,
}

impl SetuptoolsShim {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyword arguments of the most recent `setup()` call
    pub fn setup_call(&self) -> Option<&CapturedArguments> {
        self.setup_calls.last()
    }

    /// Arguments of the most recent `find_packages()` style call
    pub fn discovery_call(&self) -> Option<&CapturedArguments> {
        self.discovery_calls.last()
    }

    /// Qualified names of every other intercepted call, in call order
    pub fn other_calls(&self) -> &[String] {
        &self.other_calls
    }

    pub fn into_setup_call(mut self) -> Option<CapturedArguments> {
        self.setup_calls.pop()
    }

    fn discover(&mut self, kind: DiscoveryKind, args: CallArguments) -> Value {
        let mut arguments = CapturedArguments::new();
        for (name, value) in DISCOVERY_PARAMETERS.iter().zip(args.positional) {
            arguments.insert(*name, value);
        }
        for (name, value) in args.keywords.iter() {
            arguments.insert(name, value.clone());
        }

        self.discovery_calls.push(arguments.clone());
        Value::Discovery(DiscoveryMarker { kind, arguments })
    }
}

impl CapabilityProvider for SetuptoolsShim {
    fn provides(&self, module: &str) -> bool {
        ["setuptools", "distutils", "pkg_resources"].iter().any(|root| {
            module == *root
                || module
                    .strip_prefix(root)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    fn call(&mut self, module: &str, function: &str, args: CallArguments) -> Value {
        debug!("Intercepted call to {}.{}", module, function);
        match function {
            "setup" => {
                self.setup_calls.push(args.keywords);
                Value::None
            }
            "find_packages" => self.discover(DiscoveryKind::Packages, args),
            "find_namespace_packages" => self.discover(DiscoveryKind::NamespacePackages, args),
            _ => {
                let name = format!("{}.{}", module, function);
                self.other_calls.push(name.clone());
                Value::Opaque(format!("<{}()>", name))
            }
        }
    }
}

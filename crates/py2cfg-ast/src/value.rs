//! Values produced by executing a declaration script

use serde_json::{json, Map, Value as JsonValue};
use std::path::PathBuf;

/// Which discovery entry point produced a [`DiscoveryMarker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    /// `find_packages()`
    Packages,
    /// `find_namespace_packages()`
    NamespacePackages,
}

impl DiscoveryKind {
    /// The setup.cfg token that asks setuptools to run the discovery itself
    pub fn token(self) -> &'static str {
        match self {
            DiscoveryKind::Packages => "find:",
            DiscoveryKind::NamespacePackages => "find_namespace:",
        }
    }
}

/// Stand-in for the result of a package discovery call
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryMarker {
    pub kind: DiscoveryKind,
    /// Arguments of the discovery call, positional ones mapped to their names
    pub arguments: CapturedArguments,
}

/// A Python value as far as the interpreter understands it
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    /// A `pathlib.Path`
    Path(PathBuf),
    /// An open file handle; reading happens lazily through its methods
    File(PathBuf),
    /// A module, class or function known only by its qualified name
    Reference(String),
    /// A function defined by the script itself
    Function(String),
    /// A method looked up on a value but not called yet
    Method(Box<Value>, String),
    Discovery(DiscoveryMarker),
    /// Recording stand-in for anything the interpreter does not model
    Opaque(String),
}

impl Value {
    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Path(_) => "Path",
            Value::File(_) => "TextIOWrapper",
            Value::Reference(_) => "module",
            Value::Function(_) => "function",
            Value::Method(_, _) => "method",
            Value::Discovery(_) => "discovery",
            Value::Opaque(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Items of a list, tuple or set literal
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn dict_get(&self, key: &Value) -> Option<&Value> {
        self.as_dict()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Python's `str()`
    pub fn python_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Path(p) => p.to_string_lossy().into_owned(),
            _ => self.python_repr(),
        }
    }

    /// Python's `repr()`
    pub fn python_repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => format!(
                "'{}'",
                s.replace('\\', "\\\\")
                    .replace('\'', "\\'")
                    .replace('\n', "\\n")
            ),
            Value::List(items) => format!("[{}]", join_repr(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", join_repr(items)),
            Value::Tuple(items) => format!("({})", join_repr(items)),
            Value::Dict(pairs) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.python_repr(), v.python_repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Path(p) => format!("PosixPath('{}')", p.to_string_lossy()),
            Value::File(p) => format!("<_io.TextIOWrapper name='{}'>", p.to_string_lossy()),
            Value::Reference(name) => format!("<{}>", name),
            Value::Function(id) => {
                let name = id.split(':').next().unwrap_or(id);
                format!("<function {}>", name)
            }
            Value::Method(receiver, name) => {
                format!("<method {}.{}>", receiver.type_name(), name)
            }
            Value::Discovery(marker) => format!("<{}>", marker.kind.token()),
            Value::Opaque(text) => text.clone(),
        }
    }

    /// JSON view of the value, used to show captured arguments
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::None => JsonValue::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => json!(s),
            Value::List(items) | Value::Tuple(items) => {
                JsonValue::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Dict(pairs) => {
                let mut map = Map::new();
                for (k, v) in pairs {
                    map.insert(k.python_str(), v.to_json());
                }
                JsonValue::Object(map)
            }
            Value::Path(p) => json!(p.to_string_lossy()),
            Value::Discovery(marker) => json!({
                "discover": marker.kind.token(),
                "arguments": marker.arguments.to_json(),
            }),
            other => json!(other.python_repr()),
        }
    }
}

fn join_repr(items: &[Value]) -> String {
    items
        .iter()
        .map(Value::python_repr)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

/// Keyword arguments in call order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedArguments {
    entries: Vec<(String, Value)>,
}

impl CapturedArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, keeping its original position when it is already present
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        for (k, v) in &self.entries {
            map.insert(k.clone(), v.to_json());
        }
        JsonValue::Object(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for CapturedArguments {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut args = CapturedArguments::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use crate::value::*;

    #[test]
    fn test_python_str_and_repr() {
        assert_eq!(Value::Bool(true).python_str(), "True");
        assert_eq!(Value::Float(2.0).python_str(), "2.0");
        assert_eq!(Value::Float(0.5).python_str(), "0.5");
        assert_eq!(Value::str("a").python_str(), "a");
        assert_eq!(Value::str("a").python_repr(), "'a'");
        assert_eq!(
            Value::List(vec![Value::str("a"), Value::Int(1)]).python_str(),
            "['a', 1]"
        );
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).python_repr(), "(1,)");
        assert_eq!(
            Value::Dict(vec![(Value::str("k"), Value::None)]).python_repr(),
            "{'k': None}"
        );
        assert_eq!(Value::Path(PathBuf::from("/tmp/x")).python_str(), "/tmp/x");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Int(3).is_truthy());
        assert!(Value::Opaque("<mock>".to_string()).is_truthy());
    }

    #[test]
    fn test_captured_arguments_keep_order() {
        let mut args: CapturedArguments = vec![("name", Value::str("foo")), ("version", Value::str("1"))]
            .into_iter()
            .collect();
        args.insert("name", Value::str("bar"));
        assert_eq!(args.keys().collect::<Vec<_>>(), vec!["name", "version"]);
        assert_eq!(args.get("name"), Some(&Value::str("bar")));
        assert_eq!(args.remove("version"), Some(Value::str("1")));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_to_json() {
        let marker = DiscoveryMarker {
            kind: DiscoveryKind::Packages,
            arguments: vec![("where", Value::str("src"))].into_iter().collect(),
        };
        let args: CapturedArguments = vec![
            ("name", Value::str("foo")),
            ("zip_safe", Value::Bool(false)),
            ("packages", Value::Discovery(marker)),
        ]
        .into_iter()
        .collect();

        let json = args.to_json();
        assert_eq!(json["name"], "foo");
        assert_eq!(json["zip_safe"], false);
        assert_eq!(json["packages"]["discover"], "find:");
        assert_eq!(json["packages"]["arguments"]["where"], "src");
    }
}

//! Builtin functions, module constants and methods of built-in types

use crate::errors::ScriptError;
use crate::interpreter::expressions::{as_number, order, split_lines_keepends};
use crate::interpreter::{check_syntax, Interpreter};
use crate::shim::CallArguments;
use crate::value::Value;
use ast_grep_core::AstGrep;
use ast_grep_language::Python;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use tracing::debug;

/// `sys.version_info` as seen by scripts
const PYTHON_VERSION: (i64, i64, i64) = (3, 12, 0);

/// Upper bound on the length of a `range()` the interpreter materializes
const MAX_RANGE_LEN: i64 = 1_000_000;

/// Largest string or sequence a repetition may produce
const MAX_SEQUENCE_LEN: usize = 10_000_000;

/// Builtins the interpreter evaluates itself
const MODELLED_BUILTINS: &[&str] = &[
    "bool", "dict", "enumerate", "exec", "float", "int", "len", "list", "open", "print", "range",
    "repr", "set", "sorted", "str", "tuple", "zip",
];

/// Other names bound in Python's builtins module; calling them yields an opaque value
const OTHER_BUILTINS: &[&str] = &[
    "abs",
    "all",
    "any",
    "bytes",
    "callable",
    "chr",
    "classmethod",
    "compile",
    "eval",
    "filter",
    "format",
    "frozenset",
    "getattr",
    "globals",
    "hasattr",
    "hash",
    "input",
    "isinstance",
    "issubclass",
    "iter",
    "locals",
    "map",
    "max",
    "min",
    "next",
    "object",
    "ord",
    "property",
    "reversed",
    "round",
    "setattr",
    "staticmethod",
    "sum",
    "super",
    "type",
    "vars",
    "__import__",
    "AssertionError",
    "AttributeError",
    "BaseException",
    "EnvironmentError",
    "Exception",
    "FileNotFoundError",
    "IOError",
    "ImportError",
    "IndexError",
    "KeyError",
    "LookupError",
    "ModuleNotFoundError",
    "NameError",
    "NotImplementedError",
    "OSError",
    "RuntimeError",
    "StopIteration",
    "SystemExit",
    "TypeError",
    "UnicodeDecodeError",
    "ValueError",
];

pub(crate) fn builtin_name(name: &str) -> Option<Value> {
    if MODELLED_BUILTINS.contains(&name) || OTHER_BUILTINS.contains(&name) {
        Some(Value::Reference(format!("builtins.{}", name)))
    } else {
        None
    }
}

/// Names bound by `from MODULE import *`
pub(crate) fn wildcard_names(module: &str) -> &'static [&'static str] {
    match module {
        "setuptools" | "distutils.core" => &[
            "setup",
            "find_packages",
            "find_namespace_packages",
            "Extension",
            "Command",
        ],
        "os.path" => &[
            "join", "dirname", "basename", "abspath", "realpath", "exists", "isfile", "isdir",
        ],
        _ => &[],
    }
}

fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Dict(a), Value::Dict(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| {
                    b.iter()
                        .any(|(k2, v2)| values_equal(k, k2) && values_equal(v, v2))
                })
        }
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        },
    }
}

pub(crate) fn dict_insert(pairs: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match pairs.iter_mut().find(|(k, _)| values_equal(k, &key)) {
        Some((_, slot)) => *slot = value,
        None => pairs.push((key, value)),
    }
}

pub(crate) fn dedupe(items: Vec<Value>) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.iter().any(|seen| values_equal(seen, &item)) {
            unique.push(item);
        }
    }
    unique
}

pub(crate) fn key_error(key: &Value, line: usize) -> ScriptError {
    ScriptError::Builtin {
        kind: "KeyError",
        message: key.python_repr(),
        line,
    }
}

fn type_error(message: impl Into<String>, line: usize) -> ScriptError {
    ScriptError::Type {
        message: message.into(),
        line,
    }
}

fn value_error(message: impl Into<String>, line: usize) -> ScriptError {
    ScriptError::Builtin {
        kind: "ValueError",
        message: message.into(),
        line,
    }
}

fn attribute_error(receiver: &Value, name: &str, line: usize) -> ScriptError {
    ScriptError::Builtin {
        kind: "AttributeError",
        message: format!(
            "'{}' object has no attribute '{}'",
            receiver.type_name(),
            name
        ),
        line,
    }
}

/// Position addressed by an integer index, negative indices counting from the end
pub(crate) fn sequence_index(key: &Value, len: usize, line: usize) -> Result<usize, ScriptError> {
    let index = match key {
        Value::Int(i) => *i,
        Value::Bool(b) => i64::from(*b),
        other => {
            return Err(type_error(
                format!("indices must be integers, not {}", other.type_name()),
                line,
            ))
        }
    };
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let position = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&position) {
        Ok(position as usize)
    } else {
        Err(ScriptError::Builtin {
            kind: "IndexError",
            message: "index out of range".to_string(),
            line,
        })
    }
}

pub(crate) fn index(container: &Value, key: &Value, line: usize) -> Result<Value, ScriptError> {
    match container {
        Value::List(items) | Value::Tuple(items) => {
            let position = sequence_index(key, items.len(), line)?;
            Ok(items[position].clone())
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let position = sequence_index(key, chars.len(), line)?;
            Ok(Value::Str(chars[position].to_string()))
        }
        Value::Dict(pairs) => pairs
            .iter()
            .find(|(k, _)| values_equal(k, key))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| key_error(key, line)),
        Value::Opaque(_) | Value::Reference(_) => Ok(Value::Opaque(format!(
            "<{}[{}]>",
            container.python_repr(),
            key.python_repr()
        ))),
        other => Err(type_error(
            format!("'{}' object is not subscriptable", other.type_name()),
            line,
        )),
    }
}

fn slice_bound(value: Option<Value>, line: usize) -> Result<Option<i64>, ScriptError> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(Value::Int(i)) => Ok(Some(i)),
        Some(other) => Err(type_error(
            format!(
                "slice indices must be integers or None, not {}",
                other.type_name()
            ),
            line,
        )),
    }
}

fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |value: i64, low: i64, high: i64| {
        let value = if value < 0 { value + len } else { value };
        value.clamp(low, high)
    };

    let mut out = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| clamp(s, 0, len));
        let end = stop.map_or(len, |s| clamp(s, 0, len));
        while i < end {
            out.push(i as usize);
            i += step;
        }
    } else {
        let mut i = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let end = stop.map_or(-1, |s| clamp(s, -1, len - 1));
        while i > end {
            out.push(i as usize);
            i += step;
        }
    }
    out
}

pub(crate) fn slice(
    container: &Value,
    start: Option<Value>,
    stop: Option<Value>,
    step: Option<Value>,
    line: usize,
) -> Result<Value, ScriptError> {
    let start = slice_bound(start, line)?;
    let stop = slice_bound(stop, line)?;
    let step = slice_bound(step, line)?.unwrap_or(1);
    if step == 0 {
        return Err(value_error("slice step cannot be zero", line));
    }

    match container {
        Value::List(items) => Ok(Value::List(
            slice_indices(items.len(), start, stop, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect(),
        )),
        Value::Tuple(items) => Ok(Value::Tuple(
            slice_indices(items.len(), start, stop, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect(),
        )),
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            Ok(Value::Str(
                slice_indices(chars.len(), start, stop, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect(),
            ))
        }
        Value::Opaque(_) => Ok(container.clone()),
        other => Err(type_error(
            format!("'{}' object is not subscriptable", other.type_name()),
            line,
        )),
    }
}

/// Lexically normalize `.` and `..` components
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn path_argument(value: Option<&Value>, function: &str, line: usize) -> Result<Option<PathBuf>, ScriptError> {
    match value {
        Some(Value::Str(text)) => Ok(Some(PathBuf::from(text))),
        Some(Value::Path(path)) => Ok(Some(path.clone())),
        Some(Value::Opaque(_)) => Ok(None),
        Some(other) => Err(type_error(
            format!(
                "{}: expected str, bytes or os.PathLike object, not {}",
                function,
                other.type_name()
            ),
            line,
        )),
        None => Err(type_error(
            format!("{}() missing required argument", function),
            line,
        )),
    }
}

fn path_string(path: &Path) -> Value {
    Value::str(path.to_string_lossy())
}

/// `str.format` with positional, numbered and named fields
///
/// Returns `None` for templates it cannot render faithfully.
fn format_template(template: &str, args: &CallArguments) -> Option<String> {
    let mut out = String::new();
    let mut next_auto = 0;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return None,
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next()? {
                        '}' => break,
                        ch => field.push(ch),
                    }
                }
                let field = field.split(':').next().unwrap_or_default();
                let (name, conversion) = match field.split_once('!') {
                    Some((name, conversion)) => (name, Some(conversion)),
                    None => (field, None),
                };
                if name.contains(['.', '[']) {
                    return None;
                }
                let value = if name.is_empty() {
                    next_auto += 1;
                    args.positional.get(next_auto - 1)?
                } else if let Ok(position) = name.parse::<usize>() {
                    args.positional.get(position)?
                } else {
                    args.keywords.get(name)?
                };
                if matches!(value, Value::Opaque(_)) {
                    return None;
                }
                if conversion == Some("r") {
                    out.push_str(&value.python_repr());
                } else {
                    out.push_str(&value.python_str());
                }
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// Number of copies `sequence * n` makes of a sequence of `len` items
pub(crate) fn repeat_count(len: usize, n: i64, line: usize) -> Result<usize, ScriptError> {
    let Ok(n) = usize::try_from(n) else {
        return Ok(0);
    };
    if len == 0 {
        return Ok(0);
    }
    match len.checked_mul(n) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(n),
        _ => Err(ScriptError::Builtin {
            kind: "MemoryError",
            message: format!("repeating {} items {} times", len, n),
            line,
        }),
    }
}

pub(crate) fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    std::iter::repeat(items).take(count).flatten().cloned().collect()
}

/// printf-style `template % args`
///
/// Supports `%s`, `%r`, `%a`, `%d`, `%i`, `%f` with an optional precision,
/// `%%` and `%(name)s` keys. Returns `None` for anything else, or when a
/// substituted value is opaque.
pub(crate) fn percent_format(
    template: &str,
    args: &Value,
    line: usize,
) -> Result<Option<String>, ScriptError> {
    let positional: Vec<&Value> = match args {
        Value::Tuple(items) => items.iter().collect(),
        other => vec![other],
    };
    let mapping = args.as_dict();
    let mut next = 0;
    let mut keyed = false;
    let mut out = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let key = if chars.peek() == Some(&'(') {
            chars.next();
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some(')') => break,
                    Some(ch) => name.push(ch),
                    None => return Err(value_error("incomplete format key", line)),
                }
            }
            Some(name)
        } else {
            None
        };

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(digit) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(digit);
                chars.next();
            }
            precision = digits.parse::<usize>().ok();
        }

        let Some(conversion) = chars.next() else {
            return Err(value_error("incomplete format", line));
        };
        if conversion == '%' && key.is_none() {
            out.push('%');
            continue;
        }

        let value: &Value = match &key {
            Some(name) => {
                keyed = true;
                let Some(pairs) = mapping else {
                    return Err(type_error("format requires a mapping", line));
                };
                match pairs.iter().find(|(k, _)| k.as_str() == Some(name.as_str())) {
                    Some((_, value)) => value,
                    None => return Err(key_error(&Value::str(name.as_str()), line)),
                }
            }
            None => {
                let Some(value) = positional.get(next).copied() else {
                    return Err(type_error("not enough arguments for format string", line));
                };
                next += 1;
                value
            }
        };
        if matches!(value, Value::Opaque(_)) {
            return Ok(None);
        }

        match conversion {
            's' => out.push_str(&value.python_str()),
            'r' | 'a' => out.push_str(&value.python_repr()),
            'd' | 'i' | 'u' => match value {
                Value::Int(i) => out.push_str(&i.to_string()),
                Value::Bool(b) => out.push_str(&i64::from(*b).to_string()),
                Value::Float(f) => out.push_str(&(f.trunc() as i64).to_string()),
                other => {
                    return Err(type_error(
                        format!(
                            "%{} format: a real number is required, not {}",
                            conversion,
                            other.type_name()
                        ),
                        line,
                    ))
                }
            },
            'f' | 'F' => match as_number(value) {
                Some(f) => out.push_str(&format!("{:.*}", precision.unwrap_or(6), f)),
                None => {
                    return Err(type_error(
                        format!("must be real number, not {}", value.type_name()),
                        line,
                    ))
                }
            },
            _ => return Ok(None),
        }
    }

    if !keyed && mapping.is_none() && next < positional.len() {
        return Err(type_error(
            "not all arguments converted during string formatting",
            line,
        ));
    }
    Ok(Some(out))
}

fn split_whitespace_max(text: &str, maxsplit: Option<usize>) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if maxsplit.is_some_and(|max| parts.len() >= max) {
            parts.push(Value::str(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(Value::str(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(Value::str(rest));
                break;
            }
        }
    }
    parts
}

fn strip_chars<'a>(text: &'a str, chars: Option<&Value>, method: &str) -> &'a str {
    let set = chars.and_then(Value::as_str);
    let matcher = |c: char| match set {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
    };
    match method {
        "lstrip" => text.trim_start_matches(matcher),
        "rstrip" => text.trim_end_matches(matcher),
        _ => text.trim_matches(matcher),
    }
}

fn affix_matches(text: &str, affix: Option<&Value>, at_start: bool) -> Option<bool> {
    let test = |candidate: &str| {
        if at_start {
            text.starts_with(candidate)
        } else {
            text.ends_with(candidate)
        }
    };
    match affix? {
        Value::Str(candidate) => Some(test(candidate.as_str())),
        Value::Tuple(candidates) => Some(candidates.iter().any(|c| c.as_str().is_some_and(test))),
        _ => None,
    }
}

impl<'r, 'p> Interpreter<'r, 'p> {
    /// Values such as `sys.version_info` that scripts read from modules
    pub(crate) fn constant(&self, name: &str) -> Option<Value> {
        let (major, minor, micro) = PYTHON_VERSION;
        let value = match name {
            "sys.version_info" => Value::Tuple(vec![
                Value::Int(major),
                Value::Int(minor),
                Value::Int(micro),
                Value::str("final"),
                Value::Int(0),
            ]),
            "sys.version" => Value::str(format!("{}.{}.{}", major, minor, micro)),
            "sys.platform" => Value::str(platform()),
            "sys.argv" => {
                let script = self
                    .script_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Value::List(vec![Value::Str(script)])
            }
            "sys.maxsize" => Value::Int(i64::MAX),
            "os.sep" | "os.path.sep" => Value::str(MAIN_SEPARATOR.to_string()),
            "os.curdir" | "os.path.curdir" => Value::str("."),
            "os.pardir" | "os.path.pardir" => Value::str(".."),
            "os.linesep" => Value::str("\n"),
            "os.name" => Value::str("posix"),
            "os.environ" => Value::Dict(Vec::new()),
            _ => return None,
        };
        Some(value)
    }

    pub(crate) fn get_attribute(&self, receiver: Value, name: &str) -> Value {
        match receiver {
            Value::Reference(module) => {
                let qualified = format!("{}.{}", module, name);
                self.constant(&qualified)
                    .unwrap_or(Value::Reference(qualified))
            }
            Value::Path(path) => match name {
                "parent" => {
                    let parent = path
                        .parent()
                        .filter(|p| !p.as_os_str().is_empty())
                        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
                    Value::Path(parent)
                }
                "name" => Value::str(
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                ),
                "stem" => Value::str(
                    path.file_stem()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                ),
                "suffix" => Value::str(
                    path.extension()
                        .map(|ext| format!(".{}", ext.to_string_lossy()))
                        .unwrap_or_default(),
                ),
                _ => Value::Method(Box::new(Value::Path(path)), name.to_string()),
            },
            // sys.version_info is a named tuple
            Value::Tuple(items) if items.len() == 5 && matches!(name, "major" | "minor" | "micro") => {
                let position = match name {
                    "major" => 0,
                    "minor" => 1,
                    _ => 2,
                };
                items.get(position).cloned().unwrap_or(Value::None)
            }
            Value::Opaque(text) => Value::Opaque(format!("{}.{}", text, name)),
            other => Value::Method(Box::new(other), name.to_string()),
        }
    }

    pub(crate) fn read_text(&self, path: &Path, line: usize) -> Result<String, ScriptError> {
        let bytes = fs::read(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            line,
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|err| ScriptError::Builtin {
            kind: "UnicodeDecodeError",
            message: format!("'utf-8' codec can't decode {}: {}", path.display(), err),
            line,
        })?;
        Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
    }

    fn open_file(&self, path: &Path, mode: &str, line: usize) -> Result<Value, ScriptError> {
        if mode.contains(['w', 'a', 'x', '+']) {
            debug!("Not opening {} for writing (line {})", path.display(), line);
            return Ok(Value::Opaque(format!("<file {}>", path.display())));
        }
        let resolved = self.resolve(path);
        match fs::metadata(&resolved) {
            Ok(meta) if meta.is_dir() => Err(ScriptError::Io {
                path: resolved,
                line,
                source: io::Error::new(io::ErrorKind::Other, "Is a directory"),
            }),
            Ok(_) => Ok(Value::File(resolved)),
            Err(source) => Err(ScriptError::Io {
                path: resolved,
                line,
                source,
            }),
        }
    }

    /// Evaluate a call to a builtin, or `None` if `name` is not one
    pub(crate) fn call_builtin(
        &self,
        name: &str,
        args: &CallArguments,
        line: usize,
    ) -> Result<Option<Value>, ScriptError> {
        let first = args.positional.first();
        let value = match name {
            "builtins.open" | "io.open" | "codecs.open" => {
                let Some(path) = path_argument(args.get(0, "file"), "open", line)? else {
                    return Ok(Some(Value::Opaque("<file>".to_string())));
                };
                let mode = args.get(1, "mode").and_then(Value::as_str).unwrap_or("r");
                self.open_file(&path, mode, line)?
            }
            "pathlib.Path" | "pathlib.PurePath" | "pathlib.PosixPath" => {
                let mut joined = PathBuf::new();
                for part in &args.positional {
                    match path_argument(Some(part), "Path", line)? {
                        Some(part) => joined.push(part),
                        None => return Ok(Some(Value::Opaque("<Path>".to_string()))),
                    }
                }
                if joined.as_os_str().is_empty() {
                    joined.push(".");
                }
                Value::Path(joined)
            }
            "os.path.join" => {
                let mut joined = PathBuf::new();
                for part in &args.positional {
                    match path_argument(Some(part), "join", line)? {
                        Some(part) => joined.push(part),
                        None => return Ok(Some(Value::Opaque("<os.path.join()>".to_string()))),
                    }
                }
                path_string(&joined)
            }
            "os.path.dirname" | "os.path.basename" | "os.path.abspath" | "os.path.realpath"
            | "os.path.exists" | "os.path.isfile" | "os.path.isdir" => {
                let function = name.trim_start_matches("os.path.");
                let Some(path) = path_argument(first, function, line)? else {
                    return Ok(Some(Value::Opaque(format!("<{}()>", name))));
                };
                match function {
                    "dirname" => Value::str(
                        path.parent()
                            .map(|p| p.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    ),
                    "basename" => Value::str(
                        path.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    ),
                    "abspath" => path_string(&normalize_path(&self.resolve(&path))),
                    "realpath" => {
                        let resolved = self.resolve(&path);
                        path_string(&fs::canonicalize(&resolved).unwrap_or_else(|_| normalize_path(&resolved)))
                    }
                    "exists" => Value::Bool(self.resolve(&path).exists()),
                    "isfile" => Value::Bool(self.resolve(&path).is_file()),
                    _ => Value::Bool(self.resolve(&path).is_dir()),
                }
            }
            "os.getcwd" => path_string(&self.cwd),
            "builtins.str" => match first {
                None => Value::str(""),
                Some(value @ Value::Opaque(_)) => value.clone(),
                Some(value) => Value::Str(value.python_str()),
            },
            "builtins.repr" => match first {
                Some(value @ Value::Opaque(_)) => value.clone(),
                Some(value) => Value::Str(value.python_repr()),
                None => return Err(type_error("repr() takes exactly one argument", line)),
            },
            "builtins.list" | "builtins.tuple" | "builtins.set" | "builtins.sorted" => {
                let items = match first {
                    None => Vec::new(),
                    Some(value) => match self.iterate(value, line)? {
                        Some(items) => items,
                        None => return Ok(Some(Value::Opaque(format!("<{}()>", name)))),
                    },
                };
                match name {
                    "builtins.list" => Value::List(items),
                    "builtins.tuple" => Value::Tuple(items),
                    "builtins.set" => Value::List(dedupe(items)),
                    _ => self.sorted(items, args, line)?,
                }
            }
            "builtins.dict" => {
                let mut pairs = Vec::new();
                match first {
                    None => {}
                    Some(Value::Dict(existing)) => pairs.clone_from(existing),
                    Some(Value::Opaque(_)) => return Ok(Some(Value::Opaque("<dict()>".to_string()))),
                    Some(other) => {
                        for item in self.iterate(other, line)?.unwrap_or_default() {
                            match item.as_sequence() {
                                Some([key, value]) => dict_insert(&mut pairs, key.clone(), value.clone()),
                                _ => {
                                    return Err(value_error(
                                        "dictionary update sequence element has wrong length",
                                        line,
                                    ))
                                }
                            }
                        }
                    }
                }
                for (key, value) in args.keywords.iter() {
                    dict_insert(&mut pairs, Value::str(key), value.clone());
                }
                Value::Dict(pairs)
            }
            "builtins.len" => {
                let len = match first {
                    Some(Value::Str(text)) => text.chars().count(),
                    Some(Value::List(items) | Value::Tuple(items)) => items.len(),
                    Some(Value::Dict(pairs)) => pairs.len(),
                    Some(value @ Value::Opaque(_)) => return Ok(Some(value.clone())),
                    Some(other) => {
                        return Err(type_error(
                            format!("object of type '{}' has no len()", other.type_name()),
                            line,
                        ))
                    }
                    None => return Err(type_error("len() takes exactly one argument", line)),
                };
                Value::Int(i64::try_from(len).unwrap_or(i64::MAX))
            }
            "builtins.bool" => Value::Bool(first.is_some_and(Value::is_truthy)),
            "builtins.int" => match first {
                None => Value::Int(0),
                Some(Value::Int(i)) => Value::Int(*i),
                Some(Value::Bool(b)) => Value::Int(i64::from(*b)),
                Some(Value::Float(f)) => Value::Int(f.trunc() as i64),
                Some(Value::Str(text)) => match text.trim().replace('_', "").parse::<i64>() {
                    Ok(i) => Value::Int(i),
                    Err(_) => {
                        return Err(value_error(
                            format!("invalid literal for int() with base 10: '{}'", text),
                            line,
                        ))
                    }
                },
                Some(value @ Value::Opaque(_)) => value.clone(),
                Some(other) => {
                    return Err(type_error(
                        format!("int() argument must be a string or a number, not '{}'", other.type_name()),
                        line,
                    ))
                }
            },
            "builtins.float" => match first.map(|v| (v, as_number(v))) {
                None => Value::Float(0.0),
                Some((_, Some(number))) => Value::Float(number),
                Some((Value::Str(text), None)) => match text.trim().parse::<f64>() {
                    Ok(f) => Value::Float(f),
                    Err(_) => {
                        return Err(value_error(
                            format!("could not convert string to float: '{}'", text),
                            line,
                        ))
                    }
                },
                Some((value @ Value::Opaque(_), None)) => value.clone(),
                Some((other, None)) => {
                    return Err(type_error(
                        format!("float() argument must be a string or a number, not '{}'", other.type_name()),
                        line,
                    ))
                }
            },
            "builtins.print" => {
                let words: Vec<String> = args.positional.iter().map(Value::python_str).collect();
                debug!("setup.py printed: {}", words.join(" "));
                Value::None
            }
            "builtins.enumerate" => {
                let start = args.get(1, "start").and_then(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                });
                let Some(items) = first.map(|v| self.iterate(v, line)).transpose()?.flatten() else {
                    return Ok(Some(Value::Opaque("<enumerate()>".to_string())));
                };
                let offset = start.unwrap_or(0);
                Value::List(
                    (offset..)
                        .zip(items)
                        .map(|(i, item)| Value::Tuple(vec![Value::Int(i), item]))
                        .collect(),
                )
            }
            "builtins.zip" => {
                let mut columns = Vec::new();
                for value in &args.positional {
                    match self.iterate(value, line)? {
                        Some(items) => columns.push(items),
                        None => return Ok(Some(Value::Opaque("<zip()>".to_string()))),
                    }
                }
                let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
                Value::List(
                    (0..rows)
                        .map(|row| Value::Tuple(columns.iter().map(|c| c[row].clone()).collect()))
                        .collect(),
                )
            }
            "builtins.range" => {
                let bounds: Vec<i64> = args
                    .positional
                    .iter()
                    .filter_map(|v| match v {
                        Value::Int(i) => Some(*i),
                        _ => None,
                    })
                    .collect();
                if bounds.len() != args.positional.len() {
                    return Ok(Some(Value::Opaque("<range()>".to_string())));
                }
                let (start, stop, step) = match bounds.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(type_error("range expected 1 to 3 arguments", line)),
                };
                if step == 0 {
                    return Err(value_error("range() arg 3 must not be zero", line));
                }
                let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
                if (stop - start) / step > i128::from(MAX_RANGE_LEN) {
                    return Ok(Some(Value::Opaque("<range()>".to_string())));
                }
                let mut items = Vec::new();
                let mut i = start;
                while (step > 0 && i < stop) || (step < 0 && i > stop) {
                    let Ok(item) = i64::try_from(i) else {
                        break;
                    };
                    items.push(Value::Int(item));
                    i += step;
                }
                Value::List(items)
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn sorted(&self, mut items: Vec<Value>, args: &CallArguments, line: usize) -> Result<Value, ScriptError> {
        if args.keywords.contains("key") {
            return Ok(Value::Opaque("<sorted(key=...)>".to_string()));
        }
        for pair in items.windows(2) {
            if order(&pair[0], &pair[1]).is_none() {
                return Err(type_error(
                    format!(
                        "'<' not supported between instances of '{}' and '{}'",
                        pair[0].type_name(),
                        pair[1].type_name()
                    ),
                    line,
                ));
            }
        }
        items.sort_by(|a, b| order(a, b).unwrap_or(Ordering::Equal));
        if args.keywords.get("reverse").is_some_and(Value::is_truthy) {
            items.reverse();
        }
        Ok(Value::List(items))
    }

    pub(crate) fn call_method(
        &mut self,
        receiver: Value,
        method: &str,
        args: CallArguments,
        line: usize,
    ) -> Result<Value, ScriptError> {
        match receiver {
            Value::Str(text) => self.str_method(&text, method, &args, line),
            Value::File(ref path) => match method {
                "read" => Ok(Value::Str(self.read_text(path, line)?)),
                "readlines" => Ok(Value::List(split_lines_keepends(&self.read_text(path, line)?))),
                "close" => Ok(Value::None),
                _ => Err(attribute_error(&receiver, method, line)),
            },
            Value::Path(ref path) => self.path_method(path, method, &args, line),
            Value::Dict(ref pairs) => match method {
                "get" => {
                    let Some(key) = args.get(0, "key") else {
                        return Err(type_error("get expected at least 1 argument", line));
                    };
                    let default = args.get(1, "default").cloned().unwrap_or(Value::None);
                    Ok(pairs
                        .iter()
                        .find(|(k, _)| values_equal(k, key))
                        .map_or(default, |(_, v)| v.clone()))
                }
                "keys" => Ok(Value::List(pairs.iter().map(|(k, _)| k.clone()).collect())),
                "values" => Ok(Value::List(pairs.iter().map(|(_, v)| v.clone()).collect())),
                "items" => Ok(Value::List(
                    pairs
                        .iter()
                        .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                        .collect(),
                )),
                "copy" => Ok(receiver.clone()),
                "update" | "setdefault" | "pop" => {
                    debug!("Discarding {}() on a temporary dict (line {})", method, line);
                    Ok(Value::None)
                }
                _ => Err(attribute_error(&receiver, method, line)),
            },
            Value::List(_) => match method {
                "copy" => Ok(receiver),
                "append" | "extend" | "insert" => {
                    debug!("Discarding {}() on a temporary list (line {})", method, line);
                    Ok(Value::None)
                }
                _ => Err(attribute_error(&receiver, method, line)),
            },
            Value::Opaque(text) => Ok(Value::Opaque(format!("{}.{}()", text, method))),
            other => Err(attribute_error(&other, method, line)),
        }
    }

    fn str_method(
        &self,
        text: &str,
        method: &str,
        args: &CallArguments,
        line: usize,
    ) -> Result<Value, ScriptError> {
        let first = args.positional.first();
        let value = match method {
            "join" => {
                let Some(iterable) = first else {
                    return Err(type_error("join() takes exactly one argument", line));
                };
                let Some(items) = self.iterate(iterable, line)? else {
                    return Ok(Value::Opaque(format!("<{}.join()>", text)));
                };
                let mut parts = Vec::with_capacity(items.len());
                for (position, item) in items.iter().enumerate() {
                    match item {
                        Value::Str(part) => parts.push(part.as_str()),
                        Value::Opaque(_) => return Ok(item.clone()),
                        other => {
                            return Err(type_error(
                                format!(
                                    "sequence item {}: expected str instance, {} found",
                                    position,
                                    other.type_name()
                                ),
                                line,
                            ))
                        }
                    }
                }
                Value::Str(parts.join(text))
            }
            "strip" | "lstrip" | "rstrip" => Value::str(strip_chars(text, args.get(0, "chars"), method)),
            "split" => {
                let maxsplit = match args.get(1, "maxsplit") {
                    Some(Value::Int(n)) if *n >= 0 => usize::try_from(*n).ok(),
                    _ => None,
                };
                match args.get(0, "sep") {
                    None | Some(Value::None) => Value::List(split_whitespace_max(text, maxsplit)),
                    Some(Value::Str(sep)) if sep.is_empty() => {
                        return Err(value_error("empty separator", line))
                    }
                    Some(Value::Str(sep)) => {
                        let parts: Vec<Value> = match maxsplit {
                            Some(max) => text.splitn(max + 1, sep.as_str()).map(Value::str).collect(),
                            None => text.split(sep.as_str()).map(Value::str).collect(),
                        };
                        Value::List(parts)
                    }
                    Some(other) => {
                        return Err(type_error(
                            format!("must be str or None, not {}", other.type_name()),
                            line,
                        ))
                    }
                }
            }
            "splitlines" => Value::List(text.lines().map(Value::str).collect()),
            "replace" => {
                let (Some(Value::Str(old)), Some(Value::Str(new))) = (args.get(0, "old"), args.get(1, "new")) else {
                    return Ok(Value::Opaque(format!("<{}.replace()>", text)));
                };
                match args.get(2, "count") {
                    Some(Value::Int(count)) if *count >= 0 => {
                        Value::Str(text.replacen(old.as_str(), new, usize::try_from(*count).unwrap_or(0)))
                    }
                    _ => Value::Str(text.replace(old.as_str(), new)),
                }
            }
            "lower" => Value::Str(text.to_lowercase()),
            "upper" => Value::Str(text.to_uppercase()),
            "format" => match format_template(text, args) {
                Some(formatted) => Value::Str(formatted),
                None => Value::Opaque(format!("<{}.format()>", text)),
            },
            "startswith" | "endswith" => match affix_matches(text, first, method == "startswith") {
                Some(result) => Value::Bool(result),
                None => return Err(type_error(format!("{} first arg must be str or a tuple of str", method), line)),
            },
            "encode" | "decode" => Value::str(text),
            _ => return Err(attribute_error(&Value::str(text), method, line)),
        };
        Ok(value)
    }

    fn path_method(
        &self,
        path: &Path,
        method: &str,
        args: &CallArguments,
        line: usize,
    ) -> Result<Value, ScriptError> {
        let value = match method {
            "read_text" | "read_bytes" => Value::Str(self.read_text(&self.resolve(path), line)?),
            "resolve" => {
                let resolved = self.resolve(path);
                Value::Path(fs::canonicalize(&resolved).unwrap_or_else(|_| normalize_path(&resolved)))
            }
            "absolute" => Value::Path(self.resolve(path)),
            "joinpath" => {
                let mut joined = path.to_path_buf();
                for part in &args.positional {
                    match path_argument(Some(part), "joinpath", line)? {
                        Some(part) => joined.push(part),
                        None => return Ok(Value::Opaque("<Path>".to_string())),
                    }
                }
                Value::Path(joined)
            }
            "exists" => Value::Bool(self.resolve(path).exists()),
            "is_file" => Value::Bool(self.resolve(path).is_file()),
            "is_dir" => Value::Bool(self.resolve(path).is_dir()),
            "open" => {
                let mode = args.get(0, "mode").and_then(Value::as_str).unwrap_or("r");
                self.open_file(path, mode, line)?
            }
            _ => return Err(attribute_error(&Value::Path(path.to_path_buf()), method, line)),
        };
        Ok(value)
    }

    /// Apply a mutating method to a list or dict and return the updated container
    pub(crate) fn mutate(
        &self,
        container: Value,
        method: &str,
        args: CallArguments,
        line: usize,
    ) -> Result<Value, ScriptError> {
        let first = args.positional.first();
        match (container, method) {
            (Value::List(mut items), "append") => {
                let Some(item) = first else {
                    return Err(type_error("append() takes exactly one argument", line));
                };
                items.push(item.clone());
                Ok(Value::List(items))
            }
            (Value::List(mut items), "extend") => {
                let Some(iterable) = first else {
                    return Err(type_error("extend() takes exactly one argument", line));
                };
                match self.iterate(iterable, line)? {
                    Some(more) => items.extend(more),
                    None => debug!("Ignoring extend() with an opaque value (line {})", line),
                }
                Ok(Value::List(items))
            }
            (Value::List(mut items), "insert") => {
                let (Some(Value::Int(position)), Some(item)) = (first, args.positional.get(1)) else {
                    return Err(type_error("insert() expects an index and a value", line));
                };
                let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
                let position = if *position < 0 { position + len } else { *position };
                let position = usize::try_from(position.clamp(0, len)).unwrap_or(0);
                items.insert(position, item.clone());
                Ok(Value::List(items))
            }
            (Value::Dict(mut pairs), "update") => {
                match first {
                    Some(Value::Dict(update)) => {
                        for (key, value) in update {
                            dict_insert(&mut pairs, key.clone(), value.clone());
                        }
                    }
                    Some(Value::Opaque(_)) => {
                        debug!("Ignoring update() with an opaque value (line {})", line);
                    }
                    Some(other) => {
                        for item in self.iterate(other, line)?.unwrap_or_default() {
                            if let Some([key, value]) = item.as_sequence() {
                                dict_insert(&mut pairs, key.clone(), value.clone());
                            }
                        }
                    }
                    None => {}
                }
                for (key, value) in args.keywords.iter() {
                    dict_insert(&mut pairs, Value::str(key), value.clone());
                }
                Ok(Value::Dict(pairs))
            }
            (other, method) => Err(attribute_error(&other, method, line)),
        }
    }

    /// `exec(code)` and `exec(code, namespace)`
    ///
    /// The code runs in the module globals, or in the namespace dict when one
    /// is passed; `namespace_name` is the variable that dict is bound to.
    pub(crate) fn exec_code(
        &mut self,
        args: &CallArguments,
        namespace_name: Option<&str>,
        line: usize,
    ) -> Result<Value, ScriptError> {
        let code = match args.positional.first() {
            Some(Value::Str(code)) => code.clone(),
            Some(Value::Opaque(_)) => {
                debug!("Skipping exec() of opaque code (line {})", line);
                return Ok(Value::None);
            }
            Some(other) => {
                return Err(type_error(
                    format!("exec() arg 1 must be a string, not {}", other.type_name()),
                    line,
                ))
            }
            None => return Err(type_error("exec expected at least 1 argument", line)),
        };

        let scoped = match args.positional.get(1) {
            Some(Value::Dict(pairs)) => Some(pairs),
            _ => None,
        };
        let globals: HashMap<String, Value> = match scoped {
            Some(pairs) => pairs
                .iter()
                .map(|(k, v)| (k.python_str(), v.clone()))
                .collect(),
            None => std::mem::take(&mut self.globals),
        };

        let grep = AstGrep::new(code.as_str(), Python);
        let root = grep.root();
        let mut nested = Interpreter::new(&code, &self.script_path, &mut *self.provider);
        nested.cwd = self.cwd.clone();
        nested.depth = self.depth;
        nested.globals = globals;
        let outcome = check_syntax(&code, &root).and_then(|()| nested.run_module(&root));
        let globals = std::mem::take(&mut nested.globals);

        match (scoped, namespace_name) {
            (None, _) => self.globals = globals,
            (Some(_), Some(name)) => {
                let mut pairs: Vec<(Value, Value)> = globals
                    .into_iter()
                    .map(|(k, v)| (Value::Str(k), v))
                    .collect();
                pairs.sort_by(|(a, _), (b, _)| a.python_str().cmp(&b.python_str()));
                self.store_existing(name, Value::Dict(pairs));
            }
            (Some(_), None) => {}
        }
        outcome?;
        Ok(Value::None)
    }
}

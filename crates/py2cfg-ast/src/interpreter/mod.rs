//! Restricted evaluation of Python declaration scripts
//!
//! The interpreter walks the tree-sitter syntax tree directly. It models the
//! part of Python that setup scripts use to compute their metadata: literals,
//! names, simple control flow, user functions and a handful of builtins.
//! Everything else evaluates to [`Value::Opaque`] and is carried along
//! without being interpreted.
//!
//! The working directory of the script is a field of the interpreter. Relative
//! paths are resolved against it; the process-wide current directory is never
//! consulted or changed.

mod builtins;
mod expressions;
mod literals;

use crate::errors::ScriptError;
use crate::shim::{CallArguments, CapabilityProvider};
use crate::value::Value;
use ast_grep_core::source::StrDoc;
use ast_grep_core::Node;
use ast_grep_language::Python;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) type PyNode<'r> = Node<'r, StrDoc<Python>>;

/// Nesting limit for calls to script-defined functions
pub(crate) const MAX_CALL_DEPTH: usize = 64;

/// Iterations after which a `while` loop is treated as non-terminating
const MAX_LOOP_ITERATIONS: usize = 1_000_000;

/// Standard library modules a script may import
const STDLIB_MODULES: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64",
    "binascii", "bisect", "builtins", "bz2", "calendar", "cgi", "cmath",
    "codecs", "collections", "colorsys", "compileall", "concurrent",
    "configparser", "contextlib", "contextvars", "copy", "copyreg", "csv",
    "ctypes", "dataclasses", "datetime", "decimal", "difflib", "dis",
    "distutils", "doctest", "email", "encodings", "ensurepip", "enum", "errno",
    "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch", "fractions",
    "ftplib", "functools", "gc", "getopt", "getpass", "gettext", "glob", "gzip",
    "hashlib", "heapq", "hmac", "html", "http", "imp", "importlib", "inspect",
    "io", "ipaddress", "itertools", "json", "keyword", "linecache", "locale",
    "logging", "lzma", "marshal", "math", "mimetypes", "multiprocessing",
    "netrc", "numbers", "operator", "optparse", "os", "pathlib", "pickle",
    "pkgutil", "platform", "plistlib", "posixpath", "pprint", "py_compile",
    "queue", "random", "re", "reprlib", "runpy", "sched", "secrets", "select",
    "shlex", "shutil", "signal", "site", "socket", "sqlite3", "ssl", "stat",
    "statistics", "string", "struct", "subprocess", "symtable", "sys",
    "sysconfig", "tarfile", "tempfile", "textwrap", "threading", "time",
    "timeit", "tokenize", "tomllib", "traceback", "types", "typing",
    "unicodedata", "unittest", "urllib", "uuid", "venv", "warnings", "weakref",
    "xml", "zipfile", "zipimport", "zlib",
];

/// How a statement finished
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParameterKind {
    Regular,
    KeywordOnly,
    VarArgs,
    VarKeywords,
}

#[derive(Debug, Clone)]
struct Parameter {
    name: String,
    kind: ParameterKind,
    default: Option<Value>,
}

/// A `def` statement, with defaults evaluated at definition time
#[derive(Clone)]
struct FunctionDef<'r> {
    name: String,
    parameters: Vec<Parameter>,
    body: PyNode<'r>,
    /// Frame the `def` ran in; `None` at module level
    scope: Option<u64>,
    /// Names of the enclosing function scopes, refreshed when `scope` returns
    closure: HashMap<String, Value>,
}

#[derive(Debug, Default)]
struct Frame {
    id: u64,
    /// Frame of the enclosing `def`, for writes to closed-over containers
    enclosing: Option<u64>,
    locals: HashMap<String, Value>,
    closure: HashMap<String, Value>,
    globals: HashSet<String>,
}

impl Frame {
    /// Names a function defined in this frame can see besides globals
    fn visible(&self) -> HashMap<String, Value> {
        let mut names = self.closure.clone();
        names.extend(self.locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        names
    }
}

pub(crate) struct Interpreter<'r, 'p> {
    source: &'r str,
    script_path: PathBuf,
    cwd: PathBuf,
    provider: &'p mut dyn CapabilityProvider,
    globals: HashMap<String, Value>,
    frames: Vec<Frame>,
    next_frame: u64,
    functions: HashMap<String, FunctionDef<'r>>,
    depth: usize,
    handling: Vec<String>,
}

/// Named children of a node, without comments
pub(crate) fn named_children<'r>(node: &PyNode<'r>) -> Vec<PyNode<'r>> {
    node.children()
        .filter(|child| child.is_named() && child.kind() != "comment")
        .collect()
}

pub(crate) fn line_at(source: &str, offset: usize) -> usize {
    source
        .get(..offset)
        .map_or(1, |before| before.matches('\n').count() + 1)
}

/// Reject sources the grammar could not parse cleanly
pub(crate) fn check_syntax(source: &str, root: &PyNode<'_>) -> Result<(), ScriptError> {
    let mut pending = vec![root.clone()];
    while let Some(node) = pending.pop() {
        if node.kind() == "ERROR" {
            let text = node.text();
            return Err(ScriptError::Syntax {
                line: line_at(source, node.range().start),
                text: text.lines().next().unwrap_or_default().trim().to_string(),
            });
        }
        pending.extend(node.children());
    }
    Ok(())
}

impl<'r, 'p> Interpreter<'r, 'p> {
    pub(crate) fn new(
        source: &'r str,
        script_path: &Path,
        provider: &'p mut dyn CapabilityProvider,
    ) -> Self {
        let cwd = script_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut globals = HashMap::new();
        globals.insert("__name__".to_string(), Value::str("__main__"));
        globals.insert(
            "__file__".to_string(),
            Value::str(script_path.to_string_lossy()),
        );

        Self {
            source,
            script_path: script_path.to_path_buf(),
            cwd,
            provider,
            globals,
            frames: Vec::new(),
            next_frame: 0,
            functions: HashMap::new(),
            depth: 0,
            handling: Vec::new(),
        }
    }

    pub(crate) fn run_module(&mut self, root: &PyNode<'r>) -> Result<(), ScriptError> {
        self.exec_block(root)?;
        Ok(())
    }

    pub(crate) fn line(&self, node: &PyNode<'r>) -> usize {
        line_at(self.source, node.range().start)
    }

    /// Resolve a script-relative path against the script's directory
    pub(crate) fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    // Scopes

    pub(crate) fn lookup(&self, name: &str, line: usize) -> Result<Value, ScriptError> {
        if let Some(frame) = self.frames.last() {
            if let Some(value) = frame.locals.get(name).or_else(|| frame.closure.get(name)) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        builtins::builtin_name(name).ok_or_else(|| ScriptError::UndefinedName {
            name: name.to_string(),
            line,
        })
    }

    pub(crate) fn bind(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.globals.contains(name) => {
                frame.locals.insert(name.to_string(), value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Write back a mutated container to whichever scope holds it
    pub(crate) fn store_existing(&mut self, name: &str, value: Value) {
        let Some(frame) = self.frames.last_mut() else {
            self.globals.insert(name.to_string(), value);
            return;
        };
        if let Some(slot) = frame.locals.get_mut(name) {
            *slot = value;
            return;
        }
        let Some(slot) = frame.closure.get_mut(name) else {
            self.globals.insert(name.to_string(), value);
            return;
        };
        *slot = value.clone();

        // Propagate to the live enclosing frames that own the name
        let mut enclosing = frame.enclosing;
        while let Some(id) = enclosing {
            let Some(outer) = self.frames.iter_mut().find(|frame| frame.id == id) else {
                break;
            };
            if let Some(slot) = outer.locals.get_mut(name) {
                *slot = value;
                return;
            }
            if let Some(slot) = outer.closure.get_mut(name) {
                *slot = value.clone();
            }
            enclosing = outer.enclosing;
        }
    }

    fn unbind(&mut self, name: &str, line: usize) -> Result<(), ScriptError> {
        let removed = match self.frames.last_mut() {
            Some(frame) if !frame.globals.contains(name) => frame.locals.remove(name),
            _ => self.globals.remove(name),
        };
        match removed {
            Some(_) => Ok(()),
            None => Err(ScriptError::UndefinedName {
                name: name.to_string(),
                line,
            }),
        }
    }

    // Statements

    pub(crate) fn exec_block(&mut self, block: &PyNode<'r>) -> Result<Flow, ScriptError> {
        for statement in named_children(block) {
            match self.exec_statement(&statement)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_statement(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        match &*node.kind() {
            "expression_statement" => {
                for child in named_children(node) {
                    match &*child.kind() {
                        "assignment" => {
                            self.exec_assignment(&child)?;
                        }
                        "augmented_assignment" => self.exec_augmented_assignment(&child)?,
                        _ => {
                            self.eval(&child)?;
                        }
                    }
                }
                Ok(Flow::Normal)
            }
            "import_statement" => self.exec_import(node),
            "import_from_statement" => self.exec_import_from(node),
            "if_statement" => self.exec_if(node),
            "for_statement" => self.exec_for(node),
            "while_statement" => self.exec_while(node),
            "with_statement" => self.exec_with(node),
            "try_statement" => self.exec_try(node),
            "function_definition" => self.define_function(node),
            "class_definition" => {
                if let Some(name) = node.field("name") {
                    let name = name.text();
                    self.bind(&name, Value::Opaque(format!("<class '{}'>", name)));
                }
                Ok(Flow::Normal)
            }
            "decorated_definition" => match node.field("definition") {
                Some(definition) => self.exec_statement(&definition),
                None => Ok(Flow::Normal),
            },
            "return_statement" => {
                let value = match named_children(node).first() {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            "break_statement" => Ok(Flow::Break),
            "continue_statement" => Ok(Flow::Continue),
            "raise_statement" => Err(self.raise(node)),
            "assert_statement" => self.exec_assert(node),
            "delete_statement" => self.exec_delete(node),
            "global_statement" => {
                let names: Vec<String> = named_children(node)
                    .iter()
                    .map(|name| name.text().to_string())
                    .collect();
                if let Some(frame) = self.frames.last_mut() {
                    frame.globals.extend(names);
                }
                Ok(Flow::Normal)
            }
            "pass_statement" | "future_import_statement" | "nonlocal_statement" => Ok(Flow::Normal),
            kind => {
                debug!("Ignoring '{}' statement at line {}", kind, self.line(node));
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_assignment(&mut self, node: &PyNode<'r>) -> Result<Value, ScriptError> {
        let (Some(left), Some(right)) = (node.field("left"), node.field("right")) else {
            // Bare annotation such as `x: int`
            return Ok(Value::None);
        };
        let value = if right.kind() == "assignment" {
            self.exec_assignment(&right)?
        } else {
            self.eval(&right)?
        };
        self.assign(&left, value.clone())?;
        Ok(value)
    }

    fn exec_augmented_assignment(&mut self, node: &PyNode<'r>) -> Result<(), ScriptError> {
        let (Some(left), Some(operator), Some(right)) =
            (node.field("left"), node.field("operator"), node.field("right"))
        else {
            return Ok(());
        };
        let line = self.line(node);
        let current = self.eval(&left)?;
        let operand = self.eval(&right)?;
        let operator = operator.text();
        let updated = self.binary_op(operator.trim_end_matches('='), current, operand, line)?;
        self.assign(&left, updated)
    }

    pub(crate) fn assign(&mut self, target: &PyNode<'r>, value: Value) -> Result<(), ScriptError> {
        let line = self.line(target);
        match &*target.kind() {
            "identifier" => {
                self.bind(&target.text(), value);
                Ok(())
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "expression_list" | "tuple"
            | "list" => self.assign_unpacked(target, value, line),
            "parenthesized_expression" | "as_pattern_target" => match named_children(target).first() {
                Some(inner) => self.assign(inner, value),
                None => Ok(()),
            },
            "subscript" => self.assign_subscript(target, value, line),
            kind => {
                debug!("Ignoring assignment to '{}' at line {}", kind, line);
                Ok(())
            }
        }
    }

    fn assign_unpacked(
        &mut self,
        target: &PyNode<'r>,
        value: Value,
        line: usize,
    ) -> Result<(), ScriptError> {
        let targets = named_children(target);
        let Some(items) = self.iterate(&value, line)? else {
            for target in &targets {
                self.assign(target, value.clone())?;
            }
            return Ok(());
        };

        let starred = targets
            .iter()
            .position(|t| t.kind() == "list_splat_pattern" || t.kind() == "list_splat");
        let required = targets.len() - usize::from(starred.is_some());
        let fits = match starred {
            Some(_) => items.len() >= required,
            None => items.len() == required,
        };
        if !fits {
            return Err(ScriptError::Builtin {
                kind: "ValueError",
                message: format!(
                    "cannot unpack {} values into {} targets",
                    items.len(),
                    targets.len()
                ),
                line,
            });
        }

        let mut items = items.into_iter();
        for (idx, target) in targets.iter().enumerate() {
            if Some(idx) == starred {
                let rest = items.len() - (targets.len() - idx - 1);
                let collected: Vec<Value> = items.by_ref().take(rest).collect();
                if let Some(inner) = named_children(target).first() {
                    self.assign(inner, Value::List(collected))?;
                }
            } else if let Some(item) = items.next() {
                self.assign(target, item)?;
            }
        }
        Ok(())
    }

    fn assign_subscript(
        &mut self,
        target: &PyNode<'r>,
        value: Value,
        line: usize,
    ) -> Result<(), ScriptError> {
        let (Some(object), Some(index)) = (target.field("value"), target.field("subscript")) else {
            return Ok(());
        };
        if object.kind() != "identifier" {
            debug!("Ignoring nested item assignment at line {}", line);
            return Ok(());
        }

        let name = object.text();
        let key = self.eval(&index)?;
        let container = match self.lookup(&name, line)? {
            Value::Dict(mut pairs) => {
                builtins::dict_insert(&mut pairs, key, value);
                Value::Dict(pairs)
            }
            Value::List(mut items) => {
                let slot = builtins::sequence_index(&key, items.len(), line)?;
                items[slot] = value;
                Value::List(items)
            }
            Value::Opaque(_) => return Ok(()),
            other => {
                return Err(ScriptError::Type {
                    message: format!(
                        "'{}' object does not support item assignment",
                        other.type_name()
                    ),
                    line,
                })
            }
        };
        self.store_existing(&name, container);
        Ok(())
    }

    fn exec_import(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        let line = self.line(node);
        for child in named_children(node) {
            match &*child.kind() {
                "dotted_name" => {
                    let module = child.text();
                    self.ensure_importable(&module, line)?;
                    let top = module.split('.').next().unwrap_or_default();
                    self.bind(top, Value::Reference(top.to_string()));
                }
                "aliased_import" => {
                    let (Some(name), Some(alias)) = (child.field("name"), child.field("alias"))
                    else {
                        continue;
                    };
                    let module = name.text();
                    self.ensure_importable(&module, line)?;
                    self.bind(&alias.text(), Value::Reference(module.to_string()));
                }
                _ => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_import_from(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        let line = self.line(node);
        let Some(module_node) = node.field("module_name") else {
            return Ok(Flow::Normal);
        };
        let module = module_node.text().to_string();
        if module_node.kind() != "relative_import" {
            self.ensure_importable(&module, line)?;
        }

        for child in named_children(node) {
            if child.range() == module_node.range() {
                continue;
            }
            match &*child.kind() {
                "dotted_name" => {
                    let name = child.text();
                    self.bind(&name, Value::Reference(format!("{}.{}", module, name)));
                }
                "aliased_import" => {
                    let (Some(name), Some(alias)) = (child.field("name"), child.field("alias"))
                    else {
                        continue;
                    };
                    let qualified = format!("{}.{}", module, name.text());
                    self.bind(&alias.text(), Value::Reference(qualified));
                }
                "wildcard_import" => {
                    for name in builtins::wildcard_names(&module) {
                        self.bind(name, Value::Reference(format!("{}.{}", module, name)));
                    }
                }
                _ => {}
            }
        }
        Ok(Flow::Normal)
    }

    /// Fail like Python would for modules that are neither provided, part of
    /// the standard library, nor found next to the script
    fn ensure_importable(&self, module: &str, line: usize) -> Result<(), ScriptError> {
        let top = module.split('.').next().unwrap_or(module);
        let importable = self.provider.provides(module)
            || STDLIB_MODULES.contains(&top)
            || self.cwd.join(format!("{}.py", top)).is_file()
            || self.cwd.join(top).is_dir();
        if importable {
            Ok(())
        } else {
            Err(ScriptError::Builtin {
                kind: "ModuleNotFoundError",
                message: format!("No module named '{}'", top),
                line,
            })
        }
    }

    fn exec_if(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        if let (Some(condition), Some(consequence)) =
            (node.field("condition"), node.field("consequence"))
        {
            if self.eval(&condition)?.is_truthy() {
                return self.exec_block(&consequence);
            }
        }

        for clause in named_children(node) {
            match &*clause.kind() {
                "elif_clause" => {
                    let (Some(condition), Some(consequence)) =
                        (clause.field("condition"), clause.field("consequence"))
                    else {
                        continue;
                    };
                    if self.eval(&condition)?.is_truthy() {
                        return self.exec_block(&consequence);
                    }
                }
                "else_clause" => {
                    if let Some(body) = clause.field("body") {
                        return self.exec_block(&body);
                    }
                }
                _ => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        let (Some(left), Some(right), Some(body)) =
            (node.field("left"), node.field("right"), node.field("body"))
        else {
            return Ok(Flow::Normal);
        };
        let line = self.line(node);
        let iterable = self.eval(&right)?;
        let Some(items) = self.iterate(&iterable, line)? else {
            debug!("Skipping loop over opaque value at line {}", line);
            return Ok(Flow::Normal);
        };

        for item in items {
            self.assign(&left, item)?;
            match self.exec_block(&body)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }

        match node.field("alternative").and_then(|alt| alt.field("body")) {
            Some(body) => self.exec_block(&body),
            None => Ok(Flow::Normal),
        }
    }

    fn exec_while(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        let (Some(condition), Some(body)) = (node.field("condition"), node.field("body")) else {
            return Ok(Flow::Normal);
        };
        let line = self.line(node);

        let mut iterations = 0;
        loop {
            let test = self.eval(&condition)?;
            if let Value::Opaque(repr) = &test {
                return Err(ScriptError::Builtin {
                    kind: "NotImplementedError",
                    message: format!("while condition {} cannot be evaluated", repr),
                    line,
                });
            }
            if !test.is_truthy() {
                break;
            }
            if iterations == MAX_LOOP_ITERATIONS {
                return Err(ScriptError::Builtin {
                    kind: "RuntimeError",
                    message: format!(
                        "while loop did not finish after {} iterations",
                        MAX_LOOP_ITERATIONS
                    ),
                    line,
                });
            }
            iterations += 1;
            match self.exec_block(&body)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }

        match node.field("alternative").and_then(|alt| alt.field("body")) {
            Some(body) => self.exec_block(&body),
            None => Ok(Flow::Normal),
        }
    }

    fn exec_with(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        for clause in named_children(node) {
            if clause.kind() != "with_clause" {
                continue;
            }
            for item in named_children(&clause) {
                if item.kind() == "with_item" {
                    self.enter_with_item(&item)?;
                }
            }
        }
        match node.field("body") {
            Some(body) => self.exec_block(&body),
            None => Ok(Flow::Normal),
        }
    }

    fn enter_with_item(&mut self, item: &PyNode<'r>) -> Result<(), ScriptError> {
        let Some(value) = item.field("value") else {
            return Ok(());
        };
        if value.kind() == "as_pattern" {
            let Some(expr) = named_children(&value).into_iter().next() else {
                return Ok(());
            };
            let context = self.eval(&expr)?;
            if let Some(alias) = value.field("alias") {
                self.assign(&alias, context)?;
            }
        } else {
            let context = self.eval(&value)?;
            if let Some(alias) = item.field("alias") {
                self.assign(&alias, context)?;
            }
        }
        Ok(())
    }

    fn exec_try(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        let Some(body) = node.field("body") else {
            return Ok(Flow::Normal);
        };
        let clauses = named_children(node);
        let handlers: Vec<&PyNode<'r>> = clauses
            .iter()
            .filter(|c| c.kind() == "except_clause" || c.kind() == "except_group_clause")
            .collect();
        let else_clause = clauses.iter().find(|c| c.kind() == "else_clause");
        let finally_clause = clauses.iter().find(|c| c.kind() == "finally_clause");

        let outcome = match self.exec_block(&body) {
            Ok(Flow::Normal) => match else_clause.and_then(|c| c.field("body")) {
                Some(block) => self.exec_block(&block),
                None => Ok(Flow::Normal),
            },
            Ok(flow) => Ok(flow),
            Err(err) => self.handle_exception(&handlers, err),
        };

        if let Some(block) = finally_clause.and_then(last_block) {
            match self.exec_block(&block)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn handle_exception(
        &mut self,
        handlers: &[&PyNode<'r>],
        err: ScriptError,
    ) -> Result<Flow, ScriptError> {
        for handler in handlers {
            let parts = named_children(handler);
            let Some(block) = last_block(handler) else {
                continue;
            };
            let header: Vec<&PyNode<'r>> = parts.iter().filter(|p| p.kind() != "block").collect();

            let (class_node, alias) = match header.first() {
                None => (None, None),
                Some(first) if first.kind() == "as_pattern" => (
                    named_children(first).into_iter().next(),
                    first.field("alias"),
                ),
                Some(first) => (Some((*first).clone()), header.get(1).map(|a| (*a).clone())),
            };

            let matches = match &class_node {
                None => true,
                Some(class_node) => exception_classes(class_node)
                    .iter()
                    .any(|class| err.is_instance_of(class)),
            };
            if !matches {
                continue;
            }

            debug!("Handled {} from the script", err.exception_name());
            if let Some(alias) = alias {
                self.assign(&alias, Value::str(err.to_string()))?;
            }
            self.handling.push(err.exception_name().to_string());
            let outcome = self.exec_block(&block);
            self.handling.pop();
            return outcome;
        }
        Err(err)
    }

    fn raise(&self, node: &PyNode<'r>) -> ScriptError {
        let line = self.line(node);
        match named_children(node).first() {
            Some(expr) => {
                let class = if expr.kind() == "call" {
                    expr.field("function")
                        .map(|f| f.text().to_string())
                        .unwrap_or_default()
                } else {
                    expr.text().to_string()
                };
                let kind = class.rsplit('.').next().unwrap_or_default().to_string();
                ScriptError::Raised {
                    kind,
                    statement: expr.text().to_string(),
                    line,
                }
            }
            None => {
                let kind = self
                    .handling
                    .last()
                    .cloned()
                    .unwrap_or_else(|| "RuntimeError".to_string());
                ScriptError::Raised {
                    statement: kind.clone(),
                    kind,
                    line,
                }
            }
        }
    }

    fn exec_assert(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        let parts = named_children(node);
        let Some(condition) = parts.first() else {
            return Ok(Flow::Normal);
        };
        if self.eval(condition)?.is_truthy() {
            return Ok(Flow::Normal);
        }
        let statement = match parts.get(1) {
            Some(message) => format!("AssertionError: {}", self.eval(message)?.python_str()),
            None => "AssertionError".to_string(),
        };
        Err(ScriptError::Raised {
            kind: "AssertionError".to_string(),
            statement,
            line: self.line(node),
        })
    }

    fn exec_delete(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        let line = self.line(node);
        let mut targets = named_children(node);
        if let Some(first) = targets.first() {
            if first.kind() == "expression_list" {
                targets = named_children(first);
            }
        }

        for target in targets {
            match &*target.kind() {
                "identifier" => self.unbind(&target.text(), line)?,
                "subscript" => {
                    let (Some(object), Some(index)) =
                        (target.field("value"), target.field("subscript"))
                    else {
                        continue;
                    };
                    if object.kind() != "identifier" {
                        continue;
                    }
                    let name = object.text();
                    let key = self.eval(&index)?;
                    let updated = match self.lookup(&name, line)? {
                        Value::Dict(mut pairs) => {
                            let before = pairs.len();
                            pairs.retain(|(k, _)| !builtins::values_equal(k, &key));
                            if pairs.len() == before {
                                return Err(builtins::key_error(&key, line));
                            }
                            Value::Dict(pairs)
                        }
                        Value::List(mut items) => {
                            let slot = builtins::sequence_index(&key, items.len(), line)?;
                            items.remove(slot);
                            Value::List(items)
                        }
                        _ => continue,
                    };
                    self.store_existing(&name, updated);
                }
                _ => {}
            }
        }
        Ok(Flow::Normal)
    }

    // Functions

    fn define_function(&mut self, node: &PyNode<'r>) -> Result<Flow, ScriptError> {
        let (Some(name), Some(body)) = (node.field("name"), node.field("body")) else {
            return Ok(Flow::Normal);
        };
        let name = name.text().to_string();
        let parameters = match node.field("parameters") {
            Some(parameters) => self.parse_parameters(&parameters)?,
            None => Vec::new(),
        };

        let (scope, closure) = match self.frames.last() {
            Some(frame) => (Some(frame.id), frame.visible()),
            None => (None, HashMap::new()),
        };
        let id = format!("{}:{}", name, node.range().start);
        self.functions.insert(
            id.clone(),
            FunctionDef {
                name: name.clone(),
                parameters,
                body,
                scope,
                closure,
            },
        );
        self.bind(&name, Value::Function(id));
        Ok(Flow::Normal)
    }

    fn parse_parameters(&mut self, node: &PyNode<'r>) -> Result<Vec<Parameter>, ScriptError> {
        let mut parameters = Vec::new();
        let mut keyword_only = false;

        for child in named_children(node) {
            let regular = if keyword_only {
                ParameterKind::KeywordOnly
            } else {
                ParameterKind::Regular
            };
            let (name, kind, default) = match &*child.kind() {
                "identifier" => (child.text().to_string(), regular, None),
                "default_parameter" | "typed_default_parameter" => {
                    let name = child.field("name").map(|n| n.text().to_string());
                    let default = match child.field("value") {
                        Some(value) => Some(self.eval(&value)?),
                        None => None,
                    };
                    (name.unwrap_or_default(), regular, default)
                }
                "typed_parameter" => {
                    let Some(inner) = named_children(&child).into_iter().next() else {
                        continue;
                    };
                    match &*inner.kind() {
                        "list_splat_pattern" => {
                            keyword_only = true;
                            (splat_name(&inner), ParameterKind::VarArgs, None)
                        }
                        "dictionary_splat_pattern" => {
                            (splat_name(&inner), ParameterKind::VarKeywords, None)
                        }
                        _ => (inner.text().to_string(), regular, None),
                    }
                }
                "list_splat_pattern" => {
                    keyword_only = true;
                    (splat_name(&child), ParameterKind::VarArgs, None)
                }
                "dictionary_splat_pattern" => {
                    (splat_name(&child), ParameterKind::VarKeywords, None)
                }
                "keyword_separator" => {
                    keyword_only = true;
                    continue;
                }
                _ => continue,
            };
            parameters.push(Parameter {
                name,
                kind,
                default,
            });
        }
        Ok(parameters)
    }

    pub(crate) fn call_function(
        &mut self,
        id: &str,
        args: CallArguments,
        line: usize,
    ) -> Result<Value, ScriptError> {
        let Some(function) = self.functions.get(id).cloned() else {
            debug!("Call to a function defined outside this script body: {}", id);
            return Ok(Value::Opaque(format!("<{}()>", id)));
        };
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::Recursion {
                limit: MAX_CALL_DEPTH,
                line,
            });
        }

        let locals = bind_arguments(&function, args, line)?;
        let mut closure = function.closure.clone();
        if let Some(defining) = function
            .scope
            .and_then(|scope| self.frames.iter().find(|frame| frame.id == scope))
        {
            closure.extend(defining.visible());
        }

        self.frames.push(Frame {
            id: self.next_frame,
            enclosing: function.scope,
            locals,
            closure,
            globals: HashSet::new(),
        });
        self.next_frame += 1;
        self.depth += 1;
        let outcome = self.exec_block(&function.body);
        self.depth -= 1;
        if let Some(frame) = self.frames.pop() {
            self.close_over(&frame);
        }

        match outcome? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    /// Freeze the final names of a returning frame into the functions it defined
    fn close_over(&mut self, frame: &Frame) {
        let defined: Vec<&mut FunctionDef<'r>> = self
            .functions
            .values_mut()
            .filter(|function| function.scope == Some(frame.id))
            .collect();
        if defined.is_empty() {
            return;
        }
        let visible = frame.visible();
        for function in defined {
            function.closure = visible.clone();
        }
    }
}

fn splat_name(node: &PyNode<'_>) -> String {
    named_children(node)
        .first()
        .map(|n| n.text().to_string())
        .unwrap_or_default()
}

fn last_block<'r>(node: &PyNode<'r>) -> Option<PyNode<'r>> {
    named_children(node)
        .into_iter()
        .rev()
        .find(|child| child.kind() == "block")
}

/// Class names listed by an `except` clause
fn exception_classes(node: &PyNode<'_>) -> Vec<String> {
    match &*node.kind() {
        "tuple" | "parenthesized_expression" | "expression_list" => named_children(node)
            .iter()
            .flat_map(exception_classes)
            .collect(),
        _ => {
            let text = node.text();
            vec![text.rsplit('.').next().unwrap_or_default().to_string()]
        }
    }
}

fn bind_arguments(
    function: &FunctionDef<'_>,
    args: CallArguments,
    line: usize,
) -> Result<HashMap<String, Value>, ScriptError> {
    let mut locals = HashMap::new();
    let mut positional = args.positional.into_iter();
    let mut keywords = args.keywords;
    let mut var_keywords = None;

    for parameter in &function.parameters {
        let value = match parameter.kind {
            ParameterKind::Regular => positional
                .next()
                .or_else(|| keywords.remove(&parameter.name))
                .or_else(|| parameter.default.clone()),
            ParameterKind::KeywordOnly => keywords
                .remove(&parameter.name)
                .or_else(|| parameter.default.clone()),
            ParameterKind::VarArgs => Some(Value::Tuple(positional.by_ref().collect())),
            ParameterKind::VarKeywords => {
                var_keywords = Some(parameter.name.clone());
                continue;
            }
        };
        match value {
            Some(value) => {
                locals.insert(parameter.name.clone(), value);
            }
            None => {
                return Err(ScriptError::Type {
                    message: format!(
                        "{}() missing required argument: '{}'",
                        function.name, parameter.name
                    ),
                    line,
                })
            }
        }
    }

    if positional.next().is_some() {
        return Err(ScriptError::Type {
            message: format!("{}() got too many positional arguments", function.name),
            line,
        });
    }
    match var_keywords {
        Some(name) => {
            let pairs = keywords
                .iter()
                .map(|(k, v)| (Value::str(k), v.clone()))
                .collect();
            locals.insert(name, Value::Dict(pairs));
        }
        None => {
            if let Some(unexpected) = keywords.keys().next() {
                return Err(ScriptError::Type {
                    message: format!(
                        "{}() got an unexpected keyword argument '{}'",
                        function.name, unexpected
                    ),
                    line,
                });
            }
        }
    }
    Ok(locals)
}

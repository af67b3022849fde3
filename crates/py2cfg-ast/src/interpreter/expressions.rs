use crate::errors::ScriptError;
use crate::interpreter::builtins::{
    self, dedupe, dict_insert, percent_format, repeat_count, repeat_items, values_equal,
};
use crate::interpreter::literals::{self, decode_escapes, decode_format_literal, split_string};
use crate::interpreter::{named_children, Interpreter, PyNode};
use crate::shim::CallArguments;
use crate::value::Value;
use std::cmp::Ordering;
use tracing::debug;

/// List and dict methods that update a named container in place
const MUTATING_METHODS: &[&str] = &["append", "extend", "insert", "update"];

impl<'r, 'p> Interpreter<'r, 'p> {
    pub(crate) fn eval(&mut self, node: &PyNode<'r>) -> Result<Value, ScriptError> {
        let line = self.line(node);
        match &*node.kind() {
            "identifier" => self.lookup(&node.text(), line),
            "string" => self.eval_string(node),
            "concatenated_string" => {
                let mut joined = String::new();
                for part in named_children(node) {
                    match self.eval_string(&part)? {
                        Value::Str(text) => joined.push_str(&text),
                        other => return Ok(other),
                    }
                }
                Ok(Value::Str(joined))
            }
            "integer" => Ok(literals::parse_integer(&node.text())),
            "float" => Ok(literals::parse_float(&node.text())),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "none" => Ok(Value::None),
            "list" => Ok(Value::List(self.eval_items(node)?)),
            "tuple" | "expression_list" | "pattern_list" => Ok(Value::Tuple(self.eval_items(node)?)),
            "set" => Ok(Value::List(dedupe(self.eval_items(node)?))),
            "dictionary" => self.eval_dict(node),
            "parenthesized_expression" => match named_children(node).first() {
                Some(inner) => self.eval(inner),
                None => Ok(Value::Tuple(Vec::new())),
            },
            "attribute" => {
                let (Some(object), Some(attribute)) = (node.field("object"), node.field("attribute"))
                else {
                    return Ok(Value::Opaque(node.text().to_string()));
                };
                let receiver = self.eval(&object)?;
                Ok(self.get_attribute(receiver, &attribute.text()))
            }
            "subscript" => self.eval_subscript(node, line),
            "call" => self.eval_call(node, line),
            "unary_operator" => {
                let (Some(operator), Some(argument)) = (node.field("operator"), node.field("argument"))
                else {
                    return Ok(Value::Opaque(node.text().to_string()));
                };
                let value = self.eval(&argument)?;
                unary_op(&operator.text(), value, line)
            }
            "not_operator" => match node.field("argument") {
                Some(argument) => Ok(Value::Bool(!self.eval(&argument)?.is_truthy())),
                None => Ok(Value::Opaque(node.text().to_string())),
            },
            "binary_operator" => {
                let (Some(left), Some(operator), Some(right)) =
                    (node.field("left"), node.field("operator"), node.field("right"))
                else {
                    return Ok(Value::Opaque(node.text().to_string()));
                };
                let left = self.eval(&left)?;
                let right = self.eval(&right)?;
                self.binary_op(&operator.text(), left, right, line)
            }
            "boolean_operator" => self.eval_boolean(node),
            "comparison_operator" => self.eval_comparison(node, line),
            "conditional_expression" => {
                let parts = named_children(node);
                let [body, condition, alternative] = parts.as_slice() else {
                    return Ok(Value::Opaque(node.text().to_string()));
                };
                if self.eval(condition)?.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(alternative)
                }
            }
            "list_comprehension" | "generator_expression" => {
                Ok(self.eval_comprehension(node, line)?.map_or_else(
                    || Value::Opaque(node.text().to_string()),
                    Value::List,
                ))
            }
            "set_comprehension" => Ok(self.eval_comprehension(node, line)?.map_or_else(
                || Value::Opaque(node.text().to_string()),
                |items| Value::List(dedupe(items)),
            )),
            "dictionary_comprehension" => {
                let Some(items) = self.eval_comprehension(node, line)? else {
                    return Ok(Value::Opaque(node.text().to_string()));
                };
                let mut pairs = Vec::new();
                for item in items {
                    if let Value::Tuple(mut pair) = item {
                        if let (Some(value), Some(key)) = (pair.pop(), pair.pop()) {
                            dict_insert(&mut pairs, key, value);
                        }
                    }
                }
                Ok(Value::Dict(pairs))
            }
            "named_expression" => {
                let (Some(name), Some(value)) = (node.field("name"), node.field("value")) else {
                    return Ok(Value::Opaque(node.text().to_string()));
                };
                let value = self.eval(&value)?;
                self.bind(&name.text(), value.clone());
                Ok(value)
            }
            kind => {
                debug!("Unsupported expression '{}' at line {}", kind, line);
                Ok(Value::Opaque(format!("<{}>", node.text())))
            }
        }
    }

    fn eval_string(&mut self, node: &PyNode<'r>) -> Result<Value, ScriptError> {
        if node.kind() != "string" {
            return self.eval(node);
        }
        let text = node.text();
        let Some(token) = split_string(&text) else {
            return Ok(Value::Opaque(text.to_string()));
        };
        let Some(body) = text.get(token.body_start..token.body_end) else {
            return Ok(Value::Opaque(text.to_string()));
        };
        if !token.is_formatted() {
            let decoded = if token.is_raw() {
                body.to_string()
            } else {
                decode_escapes(body)
            };
            return Ok(Value::Str(decoded));
        }

        let start = node.range().start;
        let mut out = String::new();
        let mut cursor = token.body_start;
        for field in node.children() {
            if field.kind() != "interpolation" {
                continue;
            }
            let range = field.range();
            let (from, to) = (range.start - start, range.end - start);
            let Some(chunk) = text.get(cursor..from) else {
                return Ok(Value::Opaque(text.to_string()));
            };
            out.push_str(&decode_format_literal(chunk, token.is_raw()));

            let parts = named_children(&field);
            let expr = parts
                .iter()
                .find(|p| p.kind() != "type_conversion" && p.kind() != "format_specifier");
            let value = match expr {
                Some(expr) => self.eval(expr)?,
                None => return Ok(Value::Opaque(text.to_string())),
            };
            if matches!(value, Value::Opaque(_)) {
                return Ok(value);
            }
            let as_repr = parts
                .iter()
                .any(|p| p.kind() == "type_conversion" && p.text() == "!r");
            if as_repr {
                out.push_str(&value.python_repr());
            } else {
                out.push_str(&value.python_str());
            }
            cursor = to;
        }

        match text.get(cursor..token.body_end) {
            Some(rest) => {
                out.push_str(&decode_format_literal(rest, token.is_raw()));
                Ok(Value::Str(out))
            }
            None => Ok(Value::Opaque(text.to_string())),
        }
    }

    /// Items of a list, tuple or set display, expanding `*splats`
    fn eval_items(&mut self, node: &PyNode<'r>) -> Result<Vec<Value>, ScriptError> {
        let mut items = Vec::new();
        for child in named_children(node) {
            if child.kind() == "list_splat" {
                let line = self.line(&child);
                let Some(inner) = named_children(&child).into_iter().next() else {
                    continue;
                };
                let value = self.eval(&inner)?;
                match self.iterate(&value, line)? {
                    Some(values) => items.extend(values),
                    None => items.push(value),
                }
            } else {
                items.push(self.eval(&child)?);
            }
        }
        Ok(items)
    }

    fn eval_dict(&mut self, node: &PyNode<'r>) -> Result<Value, ScriptError> {
        let mut pairs = Vec::new();
        for child in named_children(node) {
            match &*child.kind() {
                "pair" => {
                    let (Some(key), Some(value)) = (child.field("key"), child.field("value")) else {
                        continue;
                    };
                    let key = self.eval(&key)?;
                    let value = self.eval(&value)?;
                    dict_insert(&mut pairs, key, value);
                }
                "dictionary_splat" => {
                    let Some(inner) = named_children(&child).into_iter().next() else {
                        continue;
                    };
                    match self.eval(&inner)? {
                        Value::Dict(splat) => {
                            for (key, value) in splat {
                                dict_insert(&mut pairs, key, value);
                            }
                        }
                        _ => return Ok(Value::Opaque(node.text().to_string())),
                    }
                }
                _ => {}
            }
        }
        Ok(Value::Dict(pairs))
    }

    fn eval_boolean(&mut self, node: &PyNode<'r>) -> Result<Value, ScriptError> {
        let (Some(left), Some(operator), Some(right)) =
            (node.field("left"), node.field("operator"), node.field("right"))
        else {
            return Ok(Value::Opaque(node.text().to_string()));
        };
        let left = self.eval(&left)?;
        let short_circuits = match &*operator.text() {
            "and" => !left.is_truthy(),
            _ => left.is_truthy(),
        };
        if short_circuits {
            Ok(left)
        } else {
            self.eval(&right)
        }
    }

    fn eval_comparison(&mut self, node: &PyNode<'r>, line: usize) -> Result<Value, ScriptError> {
        let mut operands = Vec::new();
        let mut operators = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for child in node.children() {
            if child.kind() == "comment" {
                continue;
            }
            if child.is_named() {
                if !operands.is_empty() {
                    operators.push(pending.join(" "));
                    pending.clear();
                }
                operands.push(child);
            } else {
                pending.push(child.text().to_string());
            }
        }

        let Some(first) = operands.first() else {
            return Ok(Value::Opaque(node.text().to_string()));
        };
        let mut left = self.eval(first)?;
        for (operator, operand) in operators.iter().zip(operands.iter().skip(1)) {
            let right = self.eval(operand)?;
            if !compare(operator, &left, &right, line)? {
                return Ok(Value::Bool(false));
            }
            left = right;
        }
        Ok(Value::Bool(true))
    }

    fn eval_subscript(&mut self, node: &PyNode<'r>, line: usize) -> Result<Value, ScriptError> {
        let (Some(object), Some(index)) = (node.field("value"), node.field("subscript")) else {
            return Ok(Value::Opaque(node.text().to_string()));
        };
        let container = self.eval(&object)?;

        if index.kind() == "slice" {
            let mut bounds: [Option<Value>; 3] = [None, None, None];
            let mut part = 0;
            for child in index.children() {
                if child.is_named() {
                    if let Some(slot) = bounds.get_mut(part) {
                        *slot = Some(self.eval(&child)?);
                    }
                } else if child.text() == ":" {
                    part += 1;
                }
            }
            let [start, stop, step] = bounds;
            return builtins::slice(&container, start, stop, step, line);
        }

        let key = self.eval(&index)?;
        builtins::index(&container, &key, line)
    }

    fn eval_call(&mut self, node: &PyNode<'r>, line: usize) -> Result<Value, ScriptError> {
        let Some(function) = node.field("function") else {
            return Ok(Value::Opaque(node.text().to_string()));
        };
        let arguments = node.field("arguments");

        if let Some(result) = self.try_mutate_named(&function, arguments.as_ref(), line)? {
            return Ok(result);
        }

        let callee = self.eval(&function)?;
        let args = self.eval_arguments(arguments.as_ref())?;
        if matches!(&callee, Value::Reference(name) if name == "builtins.exec") {
            let namespace = arguments
                .as_ref()
                .and_then(|a| named_children(a).into_iter().nth(1))
                .filter(|n| n.kind() == "identifier")
                .map(|n| n.text().to_string());
            return self.exec_code(&args, namespace.as_deref(), line);
        }
        self.call_value(callee, args, line)
    }

    /// `name.append(x)` and friends, which must update the binding itself
    fn try_mutate_named(
        &mut self,
        function: &PyNode<'r>,
        arguments: Option<&PyNode<'r>>,
        line: usize,
    ) -> Result<Option<Value>, ScriptError> {
        if function.kind() != "attribute" {
            return Ok(None);
        }
        let (Some(object), Some(method)) = (function.field("object"), function.field("attribute"))
        else {
            return Ok(None);
        };
        let method = method.text();
        if object.kind() != "identifier" || !MUTATING_METHODS.contains(&&*method) {
            return Ok(None);
        }

        let name = object.text();
        let container = self.lookup(&name, line)?;
        if !matches!(container, Value::List(_) | Value::Dict(_)) {
            return Ok(None);
        }
        let args = self.eval_arguments(arguments)?;
        let updated = self.mutate(container, &method, args, line)?;
        self.store_existing(&name, updated);
        Ok(Some(Value::None))
    }

    pub(crate) fn eval_arguments(
        &mut self,
        node: Option<&PyNode<'r>>,
    ) -> Result<CallArguments, ScriptError> {
        let mut args = CallArguments::default();
        let Some(node) = node else {
            return Ok(args);
        };
        if node.kind() == "generator_expression" {
            args.positional.push(self.eval(node)?);
            return Ok(args);
        }

        for child in named_children(node) {
            let line = self.line(&child);
            match &*child.kind() {
                "keyword_argument" => {
                    let (Some(name), Some(value)) = (child.field("name"), child.field("value"))
                    else {
                        continue;
                    };
                    let value = self.eval(&value)?;
                    args.keywords.insert(name.text().to_string(), value);
                }
                "list_splat" => {
                    let Some(inner) = named_children(&child).into_iter().next() else {
                        continue;
                    };
                    let value = self.eval(&inner)?;
                    match self.iterate(&value, line)? {
                        Some(values) => args.positional.extend(values),
                        None => args.positional.push(value),
                    }
                }
                "dictionary_splat" => {
                    let Some(inner) = named_children(&child).into_iter().next() else {
                        continue;
                    };
                    match self.eval(&inner)? {
                        Value::Dict(pairs) => {
                            for (key, value) in pairs {
                                args.keywords.insert(key.python_str(), value);
                            }
                        }
                        Value::Opaque(_) => {
                            debug!("Dropping opaque **kwargs at line {}", line);
                        }
                        other => {
                            return Err(ScriptError::Type {
                                message: format!(
                                    "argument after ** must be a mapping, not {}",
                                    other.type_name()
                                ),
                                line,
                            })
                        }
                    }
                }
                _ => args.positional.push(self.eval(&child)?),
            }
        }
        Ok(args)
    }

    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: CallArguments,
        line: usize,
    ) -> Result<Value, ScriptError> {
        match callee {
            Value::Function(id) => self.call_function(&id, args, line),
            Value::Reference(name) => self.call_reference(&name, args, line),
            Value::Method(receiver, method) => self.call_method(*receiver, &method, args, line),
            Value::Opaque(text) => Ok(Value::Opaque(format!("{}()", text))),
            other => Err(ScriptError::Type {
                message: format!("'{}' object is not callable", other.type_name()),
                line,
            }),
        }
    }

    fn call_reference(
        &mut self,
        name: &str,
        args: CallArguments,
        line: usize,
    ) -> Result<Value, ScriptError> {
        if let Some(value) = self.call_builtin(name, &args, line)? {
            return Ok(value);
        }
        if let Some((module, function)) = name.rsplit_once('.') {
            if self.provider.provides(module) {
                return Ok(self.provider.call(module, function, args));
            }
        }
        debug!("Call to unmodelled function {} at line {}", name, line);
        Ok(Value::Opaque(format!("<{}()>", name)))
    }

    /// Run each `for` clause of a comprehension and collect the body values
    ///
    /// Returns `None` when one of the iterables is opaque.
    fn eval_comprehension(
        &mut self,
        node: &PyNode<'r>,
        line: usize,
    ) -> Result<Option<Vec<Value>>, ScriptError> {
        let Some(body) = node.field("body") else {
            return Ok(None);
        };
        let clauses: Vec<PyNode<'r>> = named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "for_in_clause" || c.kind() == "if_clause")
            .collect();

        let mut bound = Vec::new();
        for clause in clauses.iter().filter(|c| c.kind() == "for_in_clause") {
            if let Some(left) = clause.field("left") {
                collect_identifiers(&left, &mut bound);
            }
        }
        let saved: Vec<(String, Option<Value>)> = bound
            .into_iter()
            .map(|name| {
                let previous = self.lookup(&name, line).ok();
                (name, previous)
            })
            .collect();

        let mut out = Vec::new();
        let outcome = self.run_clauses(&clauses, &body, &mut out);

        for (name, previous) in saved {
            match previous {
                Some(value) => self.bind(&name, value),
                None => {
                    self.unbind_quietly(&name);
                }
            }
        }
        Ok(outcome?.then_some(out))
    }

    fn run_clauses(
        &mut self,
        clauses: &[PyNode<'r>],
        body: &PyNode<'r>,
        out: &mut Vec<Value>,
    ) -> Result<bool, ScriptError> {
        let Some((clause, rest)) = clauses.split_first() else {
            let value = if body.kind() == "pair" {
                let (Some(key), Some(value)) = (body.field("key"), body.field("value")) else {
                    return Ok(true);
                };
                Value::Tuple(vec![self.eval(&key)?, self.eval(&value)?])
            } else {
                self.eval(body)?
            };
            out.push(value);
            return Ok(true);
        };

        if clause.kind() == "if_clause" {
            let Some(condition) = named_children(clause).into_iter().next() else {
                return self.run_clauses(rest, body, out);
            };
            if self.eval(&condition)?.is_truthy() {
                return self.run_clauses(rest, body, out);
            }
            return Ok(true);
        }

        let (Some(left), Some(right)) = (clause.field("left"), clause.field("right")) else {
            return Ok(true);
        };
        let line = self.line(clause);
        let iterable = self.eval(&right)?;
        let Some(items) = self.iterate(&iterable, line)? else {
            return Ok(false);
        };
        for item in items {
            self.assign(&left, item)?;
            if !self.run_clauses(rest, body, out)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn unbind_quietly(&mut self, name: &str) -> Option<Value> {
        match self.frames.last_mut() {
            Some(frame) => frame.locals.remove(name),
            None => self.globals.remove(name),
        }
    }

    /// Items produced by iterating over `value`, or `None` if it is opaque
    pub(crate) fn iterate(&self, value: &Value, line: usize) -> Result<Option<Vec<Value>>, ScriptError> {
        match value {
            Value::List(items) | Value::Tuple(items) => Ok(Some(items.clone())),
            Value::Str(text) => Ok(Some(text.chars().map(|c| Value::Str(c.to_string())).collect())),
            Value::Dict(pairs) => Ok(Some(pairs.iter().map(|(k, _)| k.clone()).collect())),
            Value::File(path) => {
                let text = self.read_text(path, line)?;
                Ok(Some(split_lines_keepends(&text)))
            }
            Value::Opaque(_) | Value::Reference(_) | Value::Discovery(_) => Ok(None),
            other => Err(ScriptError::Type {
                message: format!("'{}' object is not iterable", other.type_name()),
                line,
            }),
        }
    }

    pub(crate) fn binary_op(
        &self,
        operator: &str,
        left: Value,
        right: Value,
        line: usize,
    ) -> Result<Value, ScriptError> {
        if matches!(left, Value::Opaque(_)) || matches!(right, Value::Opaque(_)) {
            return Ok(Value::Opaque(format!(
                "<{} {} {}>",
                left.python_repr(),
                operator,
                right.python_repr()
            )));
        }

        let result = match (operator, &left, &right) {
            ("+", Value::Str(a), Value::Str(b)) => Some(Value::Str(format!("{}{}", a, b))),
            ("+", Value::List(a), Value::List(b)) => Some(Value::List([a.clone(), b.clone()].concat())),
            ("+", Value::Tuple(a), Value::Tuple(b)) => {
                Some(Value::Tuple([a.clone(), b.clone()].concat()))
            }
            ("*", Value::Str(s), Value::Int(n)) | ("*", Value::Int(n), Value::Str(s)) => {
                Some(Value::Str(s.repeat(repeat_count(s.len(), *n, line)?)))
            }
            ("*", Value::List(items), Value::Int(n)) | ("*", Value::Int(n), Value::List(items)) => {
                let count = repeat_count(items.len(), *n, line)?;
                Some(Value::List(repeat_items(items, count)))
            }
            ("*", Value::Tuple(items), Value::Int(n)) | ("*", Value::Int(n), Value::Tuple(items)) => {
                let count = repeat_count(items.len(), *n, line)?;
                Some(Value::Tuple(repeat_items(items, count)))
            }
            ("/", Value::Path(base), Value::Str(part)) => Some(Value::Path(base.join(part))),
            ("/", Value::Path(base), Value::Path(part)) => Some(Value::Path(base.join(part))),
            ("/", Value::Str(base), Value::Path(part)) => {
                Some(Value::Path(std::path::Path::new(base).join(part)))
            }
            ("|", Value::Dict(a), Value::Dict(b)) => {
                let mut merged = a.clone();
                for (key, value) in b {
                    dict_insert(&mut merged, key.clone(), value.clone());
                }
                Some(Value::Dict(merged))
            }
            ("%", Value::Str(template), args) => {
                let Some(text) = percent_format(template, args, line)? else {
                    debug!("%-formatting left unevaluated (line {})", line);
                    return Ok(Value::Opaque(format!(
                        "<{} % {}>",
                        left.python_repr(),
                        right.python_repr()
                    )));
                };
                Some(Value::Str(text))
            }
            _ => arithmetic(operator, &left, &right, line)?,
        };

        result.ok_or_else(|| ScriptError::Type {
            message: format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                operator,
                left.type_name(),
                right.type_name()
            ),
            line,
        })
    }
}

fn collect_identifiers(node: &PyNode<'_>, out: &mut Vec<String>) {
    if node.kind() == "identifier" {
        out.push(node.text().to_string());
        return;
    }
    for child in named_children(node) {
        collect_identifiers(&child, out);
    }
}

pub(crate) fn split_lines_keepends(text: &str) -> Vec<Value> {
    text.split_inclusive('\n')
        .map(|line| Value::Str(line.to_string()))
        .collect()
}

fn unary_op(operator: &str, value: Value, line: usize) -> Result<Value, ScriptError> {
    match (operator, value) {
        (_, value @ Value::Opaque(_)) => Ok(value),
        ("-", Value::Int(i)) => Ok(i.checked_neg().map_or(Value::Float(-(i as f64)), Value::Int)),
        ("-", Value::Float(f)) => Ok(Value::Float(-f)),
        ("+", value @ (Value::Int(_) | Value::Float(_))) => Ok(value),
        ("~", Value::Int(i)) => Ok(Value::Int(!i)),
        (operator, other) => Err(ScriptError::Type {
            message: format!(
                "bad operand type for unary {}: '{}'",
                operator,
                other.type_name()
            ),
            line,
        }),
    }
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn zero_division(line: usize) -> ScriptError {
    ScriptError::Builtin {
        kind: "ZeroDivisionError",
        message: "division by zero".to_string(),
        line,
    }
}

/// Numeric operators; `None` when the operand types do not support them
fn arithmetic(
    operator: &str,
    left: &Value,
    right: &Value,
    line: usize,
) -> Result<Option<Value>, ScriptError> {
    if let (Some(a), Some(b)) = (as_integer(left), as_integer(right)) {
        let value = match operator {
            "+" => a.checked_add(b),
            "-" => a.checked_sub(b),
            "*" => a.checked_mul(b),
            "//" => {
                if b == 0 {
                    return Err(zero_division(line));
                }
                a.checked_div_euclid(b)
                    .map(|q| q - i64::from(b < 0 && a.rem_euclid(b) != 0))
            }
            "%" => {
                if b == 0 {
                    return Err(zero_division(line));
                }
                // The remainder takes the sign of the divisor
                a.checked_rem_euclid(b)
                    .map(|r| if b < 0 && r != 0 { r + b } else { r })
            }
            "**" => u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp)),
            "&" => Some(a & b),
            "|" => Some(a | b),
            "^" => Some(a ^ b),
            "/" => None,
            _ => return Ok(None),
        };
        if let Some(value) = value {
            return Ok(Some(Value::Int(value)));
        }
    }

    let (Some(a), Some(b)) = (as_number(left), as_number(right)) else {
        return Ok(None);
    };
    let value = match operator {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" | "//" => {
            if b == 0.0 {
                return Err(zero_division(line));
            }
            if operator == "/" {
                a / b
            } else {
                (a / b).floor()
            }
        }
        "%" => {
            if b == 0.0 {
                return Err(zero_division(line));
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
        "**" => a.powf(b),
        _ => return Ok(None),
    };
    Ok(Some(Value::Float(value)))
}

/// Ordering between two values, if Python defines one
pub(crate) fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                if !values_equal(x, y) {
                    return order(x, y);
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => as_number(left)?.partial_cmp(&as_number(right)?),
    }
}

fn contains(container: &Value, item: &Value, line: usize) -> Result<bool, ScriptError> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::List(items) | Value::Tuple(items), _) => {
            Ok(items.iter().any(|candidate| values_equal(candidate, item)))
        }
        (Value::Dict(pairs), _) => Ok(pairs.iter().any(|(key, _)| values_equal(key, item))),
        (Value::Opaque(_), _) => Ok(false),
        (other, _) => Err(ScriptError::Type {
            message: format!("argument of type '{}' is not iterable", other.type_name()),
            line,
        }),
    }
}

/// One link of a comparison chain; comparisons against opaque values are false
fn compare(operator: &str, left: &Value, right: &Value, line: usize) -> Result<bool, ScriptError> {
    let opaque = matches!(left, Value::Opaque(_)) || matches!(right, Value::Opaque(_));
    match operator {
        "==" => Ok(!opaque && values_equal(left, right)),
        "!=" => Ok(!opaque && !values_equal(left, right)),
        "in" => contains(right, left, line),
        "not in" => Ok(!opaque && !contains(right, left, line)?),
        "is" => Ok(identical(left, right)),
        "is not" => Ok(!identical(left, right)),
        "<" | "<=" | ">" | ">=" => {
            if opaque {
                return Ok(false);
            }
            let ordering = order(left, right).ok_or_else(|| ScriptError::Type {
                message: format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    operator,
                    left.type_name(),
                    right.type_name()
                ),
                line,
            })?;
            Ok(match operator {
                "<" => ordering == Ordering::Less,
                "<=" => ordering != Ordering::Greater,
                ">" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        _ => Ok(false),
    }
}

fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Reference(a), Value::Reference(b)) => a == b,
        _ => false,
    }
}

//! Decoding of Python literal tokens

use crate::value::Value;

/// Layout of a string token: `<prefix><quote><body><quote>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct StringToken {
    /// Lower-cased prefix letters (`r`, `b`, `u`, `f` in any combination)
    pub prefix: String,
    pub body_start: usize,
    pub body_end: usize,
}

impl StringToken {
    pub fn is_raw(&self) -> bool {
        self.prefix.contains('r')
    }

    pub fn is_formatted(&self) -> bool {
        self.prefix.contains('f')
    }
}

/// Split a string token into its prefix and the byte range of its body
pub(super) fn split_string(text: &str) -> Option<StringToken> {
    let prefix_len = text
        .find(|c: char| c == '\'' || c == '"')
        .filter(|&idx| text[..idx].chars().all(|c| c.is_ascii_alphabetic()))?;
    let rest = &text[prefix_len..];
    let quote_len = if rest.starts_with("\"\"\"") || rest.starts_with("'''") {
        3
    } else {
        1
    };
    if rest.len() < quote_len * 2 {
        return None;
    }

    Some(StringToken {
        prefix: text[..prefix_len].to_ascii_lowercase(),
        body_start: prefix_len + quote_len,
        body_end: text.len() - quote_len,
    })
}

/// Resolve backslash escapes the way the Python tokenizer does
pub(super) fn decode_escapes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            out.push('\\');
            break;
        };
        match escape {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),
            '0'..='7' => {
                let mut digits = escape.to_string();
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(&d @ '0'..='7') => {
                            digits.push(d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                push_code_point(&mut out, u32::from_str_radix(&digits, 8).ok(), &digits);
            }
            'x' | 'u' | 'U' => {
                let width = match escape {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..width).filter_map(|_| chars.next()).collect();
                let code = if digits.len() == width {
                    u32::from_str_radix(&digits, 16).ok()
                } else {
                    None
                };
                push_code_point(&mut out, code, &format!("{}{}", escape, digits));
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    out
}

fn push_code_point(out: &mut String, code: Option<u32>, original: &str) {
    match code.and_then(char::from_u32) {
        Some(ch) => out.push(ch),
        None => {
            out.push('\\');
            out.push_str(original);
        }
    }
}

/// Literal text between replacement fields of an f-string
pub(super) fn decode_format_literal(chunk: &str, raw: bool) -> String {
    let chunk = chunk.replace("{{", "{").replace("}}", "}");
    if raw {
        chunk
    } else {
        decode_escapes(&chunk)
    }
}

pub(super) fn parse_integer(text: &str) -> Value {
    let cleaned: String = text
        .trim_end_matches(['l', 'L'])
        .chars()
        .filter(|c| *c != '_')
        .collect();
    let lower = cleaned.to_ascii_lowercase();

    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        lower.parse::<i64>()
    };

    parsed
        .map(Value::Int)
        .unwrap_or_else(|_| Value::Opaque(format!("<int {}>", text)))
}

pub(super) fn parse_float(text: &str) -> Value {
    if text.ends_with(['j', 'J']) {
        return Value::Opaque(format!("<complex {}>", text));
    }
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    cleaned
        .parse::<f64>()
        .map(Value::Float)
        .unwrap_or_else(|_| Value::Opaque(format!("<float {}>", text)))
}

#[cfg(test)]
mod tests {
    use crate::interpreter::literals::*;

    #[test]
    fn test_split_string_prefixes_and_quotes() {
        let token = split_string("rb'abc'");
        assert_eq!(
            token,
            Some(StringToken {
                prefix: "rb".to_string(),
                body_start: 3,
                body_end: 6,
            })
        );

        let token = split_string("F\"\"\"doc\"\"\"");
        assert!(token.as_ref().is_some_and(StringToken::is_formatted));
        assert_eq!(token.map(|t| (t.body_start, t.body_end)), Some((4, 7)));
        assert_eq!(split_string("''").map(|t| t.body_start..t.body_end), Some(1..1));
    }

    #[test]
    fn test_decode_escapes() {
        assert_eq!(decode_escapes(r"a\tb\n"), "a\tb\n");
        assert_eq!(decode_escapes(r"\x41é\101"), "AéA");
        assert_eq!(decode_escapes(r"keep \d as is"), r"keep \d as is");
        assert_eq!(decode_escapes("line\\\ncontinued"), "linecontinued");
    }

    #[test]
    fn test_format_literal_braces() {
        assert_eq!(decode_format_literal("{{x}}\\n", false), "{x}\n");
        assert_eq!(decode_format_literal("{{x}}\\n", true), "{x}\\n");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_integer("1_000"), Value::Int(1000));
        assert_eq!(parse_integer("0x1F"), Value::Int(31));
        assert_eq!(parse_integer("0o17"), Value::Int(15));
        assert_eq!(parse_integer("10L"), Value::Int(10));
        assert!(matches!(parse_integer("99999999999999999999"), Value::Opaque(_)));
        assert_eq!(parse_float("1.5"), Value::Float(1.5));
        assert_eq!(parse_float("1e3"), Value::Float(1000.0));
        assert!(matches!(parse_float("2j"), Value::Opaque(_)));
    }
}

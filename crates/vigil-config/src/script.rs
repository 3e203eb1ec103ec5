//! Script configuration format.
//!
//! A script is a sequence of top-level bindings:
//!
//! ```text
//! # comment
//! DEBUG = True
//! PORT = 5000
//! EXTENSIONS = {
//!     http: { port: 8000 },
//!     "dock": None,
//! }
//! ALIAS = PORT
//! ```
//!
//! The right-hand side is a JSON5 literal, extended with `True`, `False` and
//! `None`, or the name of an earlier binding. A binding ends at a newline or
//! `;` once all brackets are closed. Names starting with `__` are evaluated
//! but never exported.

use serde_json::{Map, Value};

use crate::value::is_reserved_key;

/// Error raised while evaluating a script.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    /// 1-based line on which the failing statement starts.
    pub line: usize,
    /// Description of the failure.
    pub message: String,
}

impl ScriptError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

struct Statement {
    line: usize,
    text: String,
}

/// Evaluates a script, returning its exported top-level bindings.
pub fn evaluate(source: &str) -> Result<Map<String, Value>, ScriptError> {
    let mut bindings = Map::new();

    for statement in split_statements(source)? {
        let (name, expr) = statement
            .text
            .split_once('=')
            .ok_or_else(|| ScriptError::new(statement.line, "expected `NAME = value`"))?;
        let name = name.trim();
        let expr = expr.trim();

        if !is_identifier(name) {
            return Err(ScriptError::new(
                statement.line,
                format!("invalid binding name {name:?}"),
            ));
        }
        if expr.is_empty() || expr.starts_with('=') {
            return Err(ScriptError::new(statement.line, "missing value"));
        }

        let value = if is_identifier(expr) && !is_literal_word(expr) {
            bindings.get(expr).cloned().ok_or_else(|| {
                ScriptError::new(statement.line, format!("name {expr:?} is not defined"))
            })?
        } else {
            json5::from_str::<Value>(&normalize_literals(expr))
                .map_err(|e| ScriptError::new(statement.line, e.to_string()))?
        };

        bindings.insert(name.to_string(), value);
    }

    bindings.retain(|name, _| !is_reserved_key(name));
    Ok(bindings)
}

/// Splits the source into statements, dropping `#` comments.
fn split_statements(source: &str) -> Result<Vec<Statement>, ScriptError> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut start_line = 1;
    let mut line = 1;
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut in_comment = false;

    let mut flush = |current: &mut String, start_line: usize| {
        let text = current.trim();
        if !text.is_empty() {
            statements.push(Statement {
                line: start_line,
                text: text.to_string(),
            });
        }
        current.clear();
    };

    for ch in source.chars() {
        if ch == '\n' {
            line += 1;
        }

        if in_comment {
            if ch != '\n' {
                continue;
            }
            in_comment = false;
        }

        if let Some(q) = quote {
            if ch == '\n' {
                return Err(ScriptError::new(line - 1, "unterminated string"));
            }
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '#' => in_comment = true,
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ']' | '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ScriptError::new(line, format!("unbalanced {ch:?}")))?;
                current.push(ch);
            }
            '\n' | ';' if depth == 0 => {
                flush(&mut current, start_line);
                start_line = line;
            }
            _ => {
                if current.trim().is_empty() {
                    start_line = line;
                }
                current.push(ch);
            }
        }
    }

    if quote.is_some() {
        return Err(ScriptError::new(line, "unterminated string"));
    }
    if depth > 0 {
        return Err(ScriptError::new(start_line, "unclosed bracket"));
    }
    flush(&mut current, start_line);

    Ok(statements)
}

/// Rewrites `True`, `False` and `None` outside of strings into JSON5 words.
fn normalize_literals(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    let flush_word = |word: &mut String, out: &mut String| {
        out.push_str(match word.as_str() {
            "True" => "true",
            "False" => "false",
            "None" => "null",
            other => other,
        });
        word.clear();
    };

    for ch in expr.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        if ch.is_alphanumeric() || ch == '_' || ch == '$' {
            word.push(ch);
            continue;
        }

        flush_word(&mut word, &mut out);
        if ch == '"' || ch == '\'' {
            quote = Some(ch);
        }
        out.push(ch);
    }
    flush_word(&mut word, &mut out);

    out
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_literal_word(s: &str) -> bool {
    matches!(
        s,
        "True" | "False" | "None" | "true" | "false" | "null" | "Infinity" | "NaN"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(source: &str) -> Value {
        Value::Object(evaluate(source).unwrap())
    }

    #[test]
    fn test_simple_bindings() {
        let source = "DEBUG = True\nPORT = 5000\nHOST = 'localhost'\nPROXY = None\n";
        assert_eq!(
            eval(source),
            json!({"DEBUG": true, "PORT": 5000, "HOST": "localhost", "PROXY": null})
        );
    }

    #[test]
    fn test_multiline_mapping_and_comments() {
        let source = r#"
# top comment
EXTENSIONS = {
    http: { port: 8000 },   # trailing comment
    "dock": None,
    note: "hash # inside string",
}
"#;
        assert_eq!(
            eval(source),
            json!({"EXTENSIONS": {
                "http": {"port": 8000},
                "dock": null,
                "note": "hash # inside string"
            }})
        );
    }

    #[test]
    fn test_reference_to_earlier_binding() {
        let source = "BASE = [1, 2]\nCOPY = BASE";
        assert_eq!(eval(source), json!({"BASE": [1, 2], "COPY": [1, 2]}));
    }

    #[test]
    fn test_undefined_reference_fails() {
        let err = evaluate("A = MISSING").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("MISSING"));
    }

    #[test]
    fn test_dunder_bindings_are_stripped() {
        let source = "__version__ = '1.0'\n__all__ = []\nNAME = 'app'";
        assert_eq!(eval(source), json!({"NAME": "app"}));
    }

    #[test]
    fn test_semicolon_separated() {
        assert_eq!(eval("A = 1; B = 2"), json!({"A": 1, "B": 2}));
    }

    #[test]
    fn test_literal_words_inside_strings_untouched() {
        assert_eq!(eval("A = 'True or None'"), json!({"A": "True or None"}));
    }

    #[test]
    fn test_error_line_numbers() {
        let err = evaluate("A = 1\n\nB = {oops: }\n").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_missing_assignment() {
        assert!(evaluate("just_a_name").is_err());
        assert!(evaluate("A == 1").is_err());
    }

    #[test]
    fn test_unclosed_bracket() {
        let err = evaluate("A = [1, 2\nB = 3").unwrap_err();
        assert!(err.message.contains("unclosed"));
    }
}

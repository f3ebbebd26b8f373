use crate::error::OperandError;
use serde_json::Value;
use std::fmt::Write;

pub const DEFAULT_REPR_LENGTH: usize = 100;

pub trait ValueExt {
    /// Length of strings (in chars), arrays and objects
    fn to_length(&self) -> Option<i64>;

    /// Extract numeric value for comparison
    fn as_numeric(&self) -> Option<f64>;

    /// Check if value is truthy
    fn is_truthy(&self) -> bool;

    /// Runtime kind of the value
    fn kind(&self) -> ValueKind;
}

impl ValueExt for Value {
    fn to_length(&self) -> Option<i64> {
        match self {
            Value::Array(arr) => Some(arr.len() as i64),
            Value::String(s) => Some(s.chars().count() as i64),
            Value::Object(obj) => Some(obj.len() as i64),
            _ => None,
        }
    }

    fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() != Some(0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
        }
    }

    fn kind(&self) -> ValueKind {
        ValueKind::of(self)
    }
}

/// Runtime type of a JSON value.
///
/// Every kind has a short name, a qualified name and a chain of ancestor kinds,
/// which is what type checks match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Dict,
}

const NUMBER: (&str, &str) = ("number", "json.number");
const ANY: (&str, &str) = ("any", "json.value");

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueKind::Int,
            Value::Number(_) => ValueKind::Float,
            Value::String(_) => ValueKind::Str,
            Value::Array(_) => ValueKind::List,
            Value::Object(_) => ValueKind::Dict,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::List => "list",
            ValueKind::Dict => "dict",
        }
    }

    pub fn qualified_name(&self) -> &'static str {
        match self {
            ValueKind::Null => "json.null",
            ValueKind::Bool => "json.boolean",
            ValueKind::Int => "json.integer",
            ValueKind::Float => "json.float",
            ValueKind::Str => "json.string",
            ValueKind::List => "json.array",
            ValueKind::Dict => "json.object",
        }
    }

    /// (short, qualified) names of the ancestor kinds, nearest first
    pub fn ancestors(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ValueKind::Int | ValueKind::Float => &[NUMBER, ANY],
            _ => &[ANY],
        }
    }

    /// True if `name` is the short or qualified name of this kind or one of its ancestors
    pub fn is_named(&self, name: &str) -> bool {
        if self.short_name() == name || self.qualified_name() == name {
            return true;
        }
        self.ancestors()
            .iter()
            .any(|(short, qualified)| *short == name || *qualified == name)
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Structural equality where integers and floats compare by numeric value
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return a == b;
            }
            if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                return a == b;
            }
            a.as_f64() == b.as_f64()
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

/// Membership test used by containment checks and the `in` operator.
///
/// Arrays test element equality, strings test substrings and objects test keys.
pub fn contains_value(container: &Value, item: &Value) -> Result<bool, OperandError> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|candidate| values_equal(candidate, item))),
        Value::String(haystack) => match item {
            Value::String(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(OperandError(format!(
                "'in <string>' requires string as left operand, not {}",
                other.kind()
            ))),
        },
        Value::Object(map) => match item {
            Value::String(key) => Ok(map.contains_key(key)),
            Value::Array(_) | Value::Object(_) => Err(OperandError(format!(
                "unhashable type: '{}'",
                item.kind()
            ))),
            _ => Ok(false),
        },
        other => Err(OperandError(format!(
            "argument of type '{}' is not iterable",
            other.kind()
        ))),
    }
}

/// Renders a value for use in reasons and messages
///
/// Strings are quoted, sequences are rendered as `[1, 2, 3]` and objects as `{'key': value}`
pub fn repr(value: &Value) -> String {
    let mut out = String::new();
    write_repr(&mut out, value);
    out
}

fn write_repr(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => write_quoted(out, s),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_repr(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (idx, (key, item)) in map.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_quoted(out, key);
                out.push_str(": ");
                write_repr(out, item);
            }
            out.push('}');
        }
    }
}

fn write_quoted(out: &mut String, s: &str) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

/// `repr` clipped to `max_length` chars, keeping both ends
pub fn truncated_repr(value: &Value, max_length: usize) -> String {
    truncate_middle(repr(value), max_length)
}

fn truncate_middle(rendered: String, max_length: usize) -> String {
    let count = rendered.chars().count();
    if count <= max_length {
        return rendered;
    }
    let half = max_length / 2;
    let head: String = rendered.chars().take(half).collect();
    let tail: String = rendered.chars().skip(count - half).collect();
    format!("{head}...{tail}")
}

/// Plain string form: strings are used as-is, everything else is rendered with `repr`
pub fn str_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => repr(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_kind_names() {
        assert_eq!(json!(42).kind(), ValueKind::Int);
        assert_eq!(json!(4.2).kind(), ValueKind::Float);
        assert_eq!(json!("a").kind().short_name(), "str");
        assert!(json!(42).kind().is_named("number"));
        assert!(json!(42).kind().is_named("json.integer"));
        assert!(json!([1]).kind().is_named("any"));
        assert!(!json!(42).kind().is_named("str"));
        assert!(!json!("a").kind().is_named("number"));
    }

    #[test]
    fn test_values_equal_numeric() {
        assert!(values_equal(&json!(42), &json!(42.0)));
        assert!(values_equal(&json!([1, {"a": 2.0}]), &json!([1.0, {"a": 2}])));
        assert!(!values_equal(&json!(1), &json!(true)));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_contains_value() {
        assert!(contains_value(&json!([1, 42, 3]), &json!(42)).unwrap());
        assert!(!contains_value(&json!([1, 2, 3]), &json!(42)).unwrap());
        assert!(contains_value(&json!("hello world"), &json!("world")).unwrap());
        assert!(contains_value(&json!({"key": 1}), &json!("key")).unwrap());
        assert!(!contains_value(&json!({"key": 1}), &json!(42)).unwrap());

        let err = contains_value(&json!(42), &json!(1)).unwrap_err();
        assert_eq!(err.to_string(), "argument of type 'int' is not iterable");

        let err = contains_value(&json!("abc"), &json!(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'in <string>' requires string as left operand, not int"
        );
    }

    #[test]
    fn test_repr() {
        assert_eq!(repr(&json!([1, 2, 3])), "[1, 2, 3]");
        assert_eq!(repr(&json!("different")), "'different'");
        assert_eq!(repr(&json!({"key": "value"})), "{'key': 'value'}");
        assert_eq!(repr(&json!("it's")), "\"it's\"");
        assert_eq!(str_form(&json!("plain")), "plain");
        assert_eq!(str_form(&json!([1, 42, 3])), "[1, 42, 3]");
    }

    #[test]
    fn test_truncated_repr() {
        let long = json!("x".repeat(300));
        let rendered = truncated_repr(&long, 20);
        assert_eq!(rendered.chars().count(), 23);
        assert!(rendered.starts_with("'xxxxxxxxx"));
        assert!(rendered.contains("..."));
        assert_eq!(truncated_repr(&json!(1), 20), "1");
    }

    #[test]
    fn test_truthiness() {
        assert!(!json!(0).is_truthy());
        assert!(!json!("").is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(json!([0]).is_truthy());
        assert_eq!(json!("héllo").to_length(), Some(5));
    }
}

pub mod class;
pub mod error;
pub mod location;
pub mod parser;
pub mod trace;

pub use class::{CharClass, ClassPart};
pub use error::{Expectation, ParseError};
pub use location::{Location, Position};
pub use parser::{ParseOptions, ParseState};
pub use trace::{LogTracer, TraceEvent, TraceKind, Tracer};

/// A semantic value produced by a parsing expression.
///
/// `Failed` is the failure sentinel, it never escapes a successful parse.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Failed,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Value::Failed)
    }
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Failed => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) => true,
        }
    }
    /// Number of elements of an array value, zero for everything else.
    pub fn len(&self) -> usize {
        match self {
            Value::Array(a) => a.len(),
            _ => 0,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Appends to an array value, other values are left untouched.
    pub fn push(&mut self, value: Value) {
        match self {
            Value::Array(a) => a.push(value),
            _ => debug_assert!(false, "push into a non-array value"),
        }
    }
    /// Interprets the value as a repetition count.
    pub fn count_or(&self, default: usize) -> usize {
        match *self {
            Value::Int(i) if i >= 0 => i as usize,
            _ => default,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Value {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Value {
        Value::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Value {
        Value::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Value {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Value {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Value {
        Value::Array(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Failed => f.write_str("<failed>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(a) => {
                f.write_str("[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[test]
fn test_value_truthiness() {
    assert!(!Value::Null.is_truthy());
    assert!(!Value::Str(String::new()).is_truthy());
    assert!(Value::Array(Vec::new()).is_truthy());
    assert!(Value::Int(3).is_truthy());
}

#[test]
fn test_value_display() {
    let value = Value::Array(vec!["a".into(), Value::Int(1), Value::Null]);
    assert_eq!(value.to_string(), r#"["a", 1, null]"#);
}

#[test]
fn test_count_or() {
    assert_eq!(Value::Int(4).count_or(0), 4);
    assert_eq!(Value::Int(-1).count_or(7), 7);
    assert_eq!(Value::Null.count_or(usize::MAX), usize::MAX);
}

use std::fmt;
use std::rc::Rc;

/// A runtime value.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Nil,
    Number(f64),
    String(Rc<str>),
}
use Value::*;

impl Value {
    /// `nil` and `false` are falsey. Everything else, including `0` and `""`,
    /// is truthy.
    pub fn is_falsey(&self) -> bool {
        matches!(self, Nil | Bool(false))
    }
}

impl Default for Value {
    fn default() -> Self {
        Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        String(s.into())
    }
}

impl From<std::string::String> for Value {
    fn from(s: std::string::String) -> Self {
        String(s.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bool(b) => b.fmt(f),
            Nil => write!(f, "nil"),
            Number(n) => n.fmt(f),
            String(s) => f.write_str(s),
        }
    }
}

/// Values of different variants are never equal. Numbers compare as IEEE-754
/// floats, so `NaN != NaN`.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Nil, Nil) => true,
            (Number(a), Number(b)) => a == b,
            (String(a), String(b)) => a == b,
            _ => false,
        }
    }
}

//! Values carried by signals

use std::fmt;

/// A value held by a present signal
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Double(f64),
    Int(i64),
    Bool(bool),
}

impl Token {
    /// Numeric view of the token; booleans map to 0 and 1
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Token::Double(v) => Some(v),
            Token::Int(v) => Some(v as f64),
            Token::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Token::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Token::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for Token {
    fn from(value: f64) -> Self {
        Token::Double(value)
    }
}

impl From<i64> for Token {
    fn from(value: i64) -> Self {
        Token::Int(value)
    }
}

impl From<bool> for Token {
    fn from(value: bool) -> Self {
        Token::Bool(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Double(v) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Bool(b) => write!(f, "{b}"),
        }
    }
}

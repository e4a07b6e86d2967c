//! Typed values stored in variable collections.
//!
//! Variables drive response conditions: a condition compares a stored value
//! against an authored reference value. Comparisons are defined between
//! like kinds, and numeric values compare across the int/float divide so
//! authors do not have to care which of the two a writer used.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A typed variable value.
///
/// The untagged serde representation lets authored files write plain
/// literals (`5`, `2.5`, `true`, `"alerted"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i32),
    /// Single-precision float (matches game-side variable storage).
    Float(f32),
    /// String value.
    Str(String),
}

impl Value {
    /// Return the numeric content as `f64`, if this value is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(f64::from(*v)),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Bool(_) | Self::Str(_) => None,
        }
    }

    /// Compare two values.
    ///
    /// Booleans and strings compare against their own kind; integers and
    /// floats compare numerically against each other. Mismatched kinds
    /// (for example a string against a number) are incomparable and yield
    /// `None`, which condition evaluation treats as "not met".
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
        }
    }

    /// Whether two values compare equal under [`Value::compare`].
    pub fn equals(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

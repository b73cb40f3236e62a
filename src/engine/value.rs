//! Runtime value type for the suspendable execution engine
//!
//! `Value` is the unified representation of everything that flows across a
//! suspension boundary: values surfaced by a sequence, values resumed back
//! into it, settlement outcomes of deferreds, and exception payloads.
//!
//! Awaitability is an explicit capability: a value is awaitable if and only
//! if it is the `Deferred` variant. The async driver dispatches on the tag,
//! never on structure.

use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, Serializer};

use crate::engine::deferred::DeferredHandle;

/// Runtime value crossing suspension boundaries.
///
/// Small values are stored inline; strings and lists are shared via `Arc`
/// so that cloning a value (which happens at every suspension point) stays
/// cheap.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value. Resuming a finished sequence yields this.
    #[default]
    Undefined,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String (shared)
    Str(Arc<str>),
    /// List (shared)
    List(Arc<Vec<Value>>),
    /// A deferred value; the one awaitable variant
    Deferred(DeferredHandle),
}

impl Value {
    /// Build a string value.
    #[inline]
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Build a list value.
    #[inline]
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    /// Check whether this value is `Undefined`.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check whether this value is awaitable.
    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::Deferred(_))
    }

    /// Extract the deferred handle, if this value is awaitable.
    #[inline]
    pub fn as_deferred(&self) -> Option<&DeferredHandle> {
        match self {
            Value::Deferred(handle) => Some(handle),
            _ => None,
        }
    }

    /// Extract an integer, if this value is one.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract a boolean, if this value is one.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract a string slice, if this value is a string.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract the list contents, if this value is a list.
    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Deferreds compare by identity
            (Value::Deferred(a), Value::Deferred(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Deferred(handle) => write!(f, "{}", handle.id()),
        }
    }
}

// Serialization exists for diagnostic snapshots only; a deferred renders as
// its id rather than its (possibly cyclic) contents.
impl Serialize for Value {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Undefined => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => items.serialize(serializer),
            Value::Deferred(handle) => serializer.serialize_str(&handle.id().to_string()),
        }
    }
}

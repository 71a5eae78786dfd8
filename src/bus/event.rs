//! Event value model.
//!
//! An [`Event`] is a topic plus an ordered key→[`Value`] payload. Handlers
//! receive `&mut Event` and may rewrite values in place; the trigger caller
//! gets the mutated event back and reads the final values through the typed
//! accessors.

use core::fmt;

/// A single payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Bool(_) => "bool",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
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

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Typed accessor failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    Missing {
        key: String,
    },
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { key } => write!(f, "missing key '{key}'"),
            Self::TypeMismatch {
                key,
                expected,
                found,
            } => write!(f, "key '{key}' is {found}, expected {expected}"),
        }
    }
}

/// A published event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    topic: String,
    payload: Vec<(String, Value)>,
}

impl Event {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: Vec::new(),
        }
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Replace the value under `key` in place, or append it.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.payload.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.payload.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    pub fn payload(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.payload.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, key: &str) -> Result<&Value, EventError> {
        self.get(key).ok_or_else(|| EventError::Missing {
            key: key.to_owned(),
        })
    }

    fn mismatch(key: &str, expected: &'static str, found: &Value) -> EventError {
        EventError::TypeMismatch {
            key: key.to_owned(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64, EventError> {
        match self.require(key)? {
            Value::Int(v) => Ok(*v),
            other => Err(Self::mismatch(key, "int", other)),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<f64, EventError> {
        match self.require(key)? {
            Value::Float(v) => Ok(*v),
            other => Err(Self::mismatch(key, "float", other)),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str, EventError> {
        match self.require(key)? {
            Value::Str(v) => Ok(v),
            other => Err(Self::mismatch(key, "string", other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, EventError> {
        match self.require(key)? {
            Value::Bool(v) => Ok(*v),
            other => Err(Self::mismatch(key, "bool", other)),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic)?;
        for (i, (k, v)) in self.payload.iter().enumerate() {
            let sep = if i == 0 { " {" } else { ", " };
            write!(f, "{sep}{k}={v}")?;
        }
        if !self.payload.is_empty() {
            f.write_str("}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EventError {}

//! The generic value container carried by every c2c payload.
//!
//! Payloads, method arguments, constants and description trees all use the
//! same closed set of variants so that every consumer can match on them
//! exhaustively.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// A signed 32-bit integer.
    Int32(i32),
    /// A UTF-8 string.
    String(String),
    /// A dictionary with string keys, ordered by key.
    Dict(BTreeMap<String, Value>),
    /// An ordered list of values.
    List(Vec<Value>),
    /// An error message in place of a value.
    Error(String),
}

/// The type tag of a [`Value`], used to describe method arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int32,
    String,
    Dict,
    List,
    Error,
}

impl ValueType {
    /// Returns the wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::String => "string",
            Self::Dict => "dict",
            Self::List => "list",
            Self::Error => "error",
        }
    }

    /// Parses a wire name back into a type.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "int32" => Some(Self::Int32),
            "string" => Some(Self::String),
            "dict" => Some(Self::Dict),
            "list" => Some(Self::List),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Creates an error value.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Creates a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Builds a list of strings, the usual shape of a namespace path.
    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(segments.into_iter().map(|s| Self::String(s.into())).collect())
    }

    /// Builds a dictionary from key/value pairs.
    pub fn dict<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int32(_) => ValueType::Int32,
            Self::String(_) => ValueType::String,
            Self::Dict(_) => ValueType::Dict,
            Self::List(_) => ValueType::List,
            Self::Error(_) => ValueType::Error,
        }
    }

    /// Returns true if this is an error value.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns the error message if this is an error value.
    pub fn as_error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_int32(&self) -> Option<i32> {
        match self {
            Self::Int32(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    /// Returns the integer at `index` if this is a list holding one there.
    pub fn list_get_int32(&self, index: usize) -> Option<i32> {
        self.as_list()?.get(index)?.as_int32()
    }

    /// Looks up a key if this is a dictionary.
    pub fn dict_get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?.get(key)
    }

    /// Interprets this value as a list of strings (a namespace path).
    pub fn as_path(&self) -> Option<Vec<String>> {
        self.as_list()?
            .iter()
            .map(|segment| segment.as_str().map(str::to_string))
            .collect()
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int32(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Dict(entries)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(i) => write!(f, "{}", i),
            Self::String(s) => f.write_str(s),
            Self::Error(message) => write!(f, "error: {}", message),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Self::Dict(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::traits::StructuredError;

/// Log level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Uppercase name as written to the `level` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str().to_lowercase())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Destination file stream of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Everything below the elevated threshold
    Normal,
    /// Events at or above the elevated threshold (`.wf` files)
    Elevated,
}

impl Stream {
    pub fn name(&self) -> &'static str {
        match self {
            Stream::Normal => "normal",
            Stream::Elevated => "elevated",
        }
    }

    /// Discriminator inserted after the app name in file and symlink names
    pub fn infix(&self) -> &'static str {
        match self {
            Stream::Normal => "",
            Stream::Elevated => ".wf",
        }
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured fields of an error value, flattened into the event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: i64,
    pub code_msg: String,
    pub err_type: String,
    pub service: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    /// Overrides the code's default text when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of a log call
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Any plain value, stored under `msg`
    Value(Value),
    /// A structured error, expanded into code/type/service fields
    Structured(ErrorDetail),
    /// A generic error, rendered under `error`
    Error(String),
    /// A value that failed to serialize; the event is reported and not written
    Unencodable(String),
}

impl Message {
    /// Wrap any serializable value
    pub fn value<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Message::Value(v),
            Err(e) => Message::Unencodable(e.to_string()),
        }
    }

    /// Render a generic error
    pub fn error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Message::Error(err.to_string())
    }

    /// Expand a structured error
    pub fn structured<E: StructuredError + ?Sized>(err: &E) -> Self {
        Message::Structured(err.detail())
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Value(Value::String(s.to_string()))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Value(Value::String(s))
    }
}

impl From<&String> for Message {
    fn from(s: &String) -> Self {
        Message::Value(Value::String(s.clone()))
    }
}

impl From<Value> for Message {
    fn from(v: Value) -> Self {
        Message::Value(v)
    }
}

impl From<ErrorDetail> for Message {
    fn from(detail: ErrorDetail) -> Self {
        Message::Structured(detail)
    }
}

/// A key whose value could not be turned into JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeFailure {
    pub key: String,
    pub message: String,
}

/// Extra key/value pairs attached to a single log call
#[derive(Debug, Clone, Default)]
pub struct Fields {
    entries: Vec<(String, Value)>,
    failures: Vec<EncodeFailure>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style)
    pub fn with<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.push(key, value);
        self
    }

    /// Add a field, recording a failure instead if the value does not serialize
    pub fn push<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(v) => self.entries.push((key, v)),
            Err(e) => self.failures.push(EncodeFailure {
                key,
                message: e.to_string(),
            }),
        }
    }

    /// Build from a flat `[key, value, key, value, ...]` sequence.
    ///
    /// A pair whose key is not a string is skipped; a trailing unpaired
    /// item is ignored.
    pub fn from_pairs(items: &[Value]) -> Self {
        let mut fields = Self::new();
        for pair in items.chunks_exact(2) {
            if let Value::String(key) = &pair[0] {
                fields.entries.push((key.clone(), pair[1].clone()));
            }
        }
        fields
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn failures(&self) -> &[EncodeFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<(String, Value)>, Vec<EncodeFailure>) {
        (self.entries, self.failures)
    }
}

/// Immutable snapshot of one log call
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// Time of the log call
    pub timestamp: DateTime<Local>,

    /// Severity
    pub level: Level,

    /// Event tag (may be empty)
    pub tag: String,

    /// Merged attributes in insertion order, unique keys
    pub attrs: Map<String, Value>,

    /// Error detail block when the message was a structured error
    pub error: Option<ErrorDetail>,

    /// Attributes dropped because they could not be encoded
    pub failures: Vec<EncodeFailure>,
}

impl LogEvent {
    /// Create an event with no attributes
    pub fn new(level: Level, tag: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            tag: tag.into(),
            attrs: Map::new(),
            error: None,
            failures: Vec::new(),
        }
    }

    /// Set the timestamp
    pub fn at(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Insert an attribute; an existing key keeps its position and takes the new value
    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }
}

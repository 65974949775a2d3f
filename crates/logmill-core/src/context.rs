//! Ambient context carried alongside a request or operation
//!
//! A [`LogContext`] holds the active trace span (if any) and a bag of
//! attributes that are merged into every event logged with it. Contexts are
//! immutable: `with*` methods return a new context and leave the original
//! untouched, so one can be shared freely between tasks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Identifiers of the active trace span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: String,
    pub span_id: String,
}

impl SpanContext {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogContext {
    span: Option<SpanContext>,
    attrs: Arc<Map<String, Value>>,
}

impl LogContext {
    /// Empty context: no span, no attributes
    pub fn background() -> Self {
        Self::default()
    }

    /// Return a copy carrying the given span
    pub fn with_span(&self, span: SpanContext) -> Self {
        Self {
            span: Some(span),
            attrs: Arc::clone(&self.attrs),
        }
    }

    /// Return a copy with one more attribute
    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        let mut attrs = (*self.attrs).clone();
        attrs.insert(key.into(), value);
        Self {
            span: self.span.clone(),
            attrs: Arc::new(attrs),
        }
    }

    /// Return a copy with several more attributes
    pub fn with_many<I, K>(&self, kv: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut attrs = (*self.attrs).clone();
        for (k, v) in kv {
            attrs.insert(k.into(), v);
        }
        Self {
            span: self.span.clone(),
            attrs: Arc::new(attrs),
        }
    }

    pub fn span(&self) -> Option<&SpanContext> {
        self.span.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attrs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_none() && self.attrs.is_empty()
    }
}

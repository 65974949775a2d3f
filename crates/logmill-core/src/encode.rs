//! Event encoder
//!
//! [`build_event`] runs on the producer side and merges everything known
//! about a log call into one ordered attribute set. [`encode_line`] runs on
//! the writer side and turns an event into a newline-terminated JSON line.
//!
//! Merge order, later keys overwriting earlier ones in place:
//! tag, caller, trace ids, message fields, context attributes, extra fields.

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::caller::CallerInfo;
use crate::context::LogContext;
use crate::error::{PipelineError, Result};
use crate::log_entry::{EncodeFailure, Fields, Level, LogEvent, Message};

/// Well-known attribute keys
pub mod keys {
    pub const TS: &str = "ts";
    pub const LEVEL: &str = "level";
    pub const TAG: &str = "tag";
    pub const FILE: &str = "file";
    pub const LINE: &str = "line";
    pub const FUNC: &str = "func";
    pub const TRACE_ID: &str = "trace_id";
    pub const SPAN_ID: &str = "span_id";
    pub const CODE: &str = "code";
    pub const CODE_MSG: &str = "code_msg";
    pub const ERR_TYPE: &str = "err_type";
    pub const SERVICE: &str = "service";
    pub const SUCCESS: &str = "success";
    pub const MSG: &str = "msg";
    pub const ERROR: &str = "error";

    // Shared vocabulary for producer fields
    pub const COST: &str = "cost";
    pub const REMOTE: &str = "remote";
    pub const METHOD: &str = "method";
    pub const URL: &str = "url";
    pub const PATH: &str = "path";
    pub const QUERY: &str = "query";
    pub const REQUEST: &str = "request";
    pub const BODY: &str = "body";
    pub const RESPONSE: &str = "response";
    pub const ATTEMPT: &str = "attempt";
    pub const ATTEMPTS: &str = "attempts";
    pub const MAX_ATTEMPTS: &str = "max_attempts";
}

/// Well-known event tags
pub mod tags {
    pub const UNDEF: &str = "undef";
    pub const REQUEST_IN: &str = "request_in";
    pub const REQUEST_OUT: &str = "request_out";
    pub const HTTP_SUCCESS: &str = "http_success";
    pub const HTTP_FAILURE: &str = "http_failure";
    pub const MYSQL_SUCCESS: &str = "mysql_success";
    pub const MYSQL_FAILURE: &str = "mysql_failure";
    pub const REDIS_SUCCESS: &str = "redis_success";
    pub const REDIS_FAILURE: &str = "redis_failure";
    pub const KAFKA_SUCCESS: &str = "kafka_success";
    pub const KAFKA_FAILURE: &str = "kafka_failure";
}

/// Build the event for one log call
pub fn build_event(
    level: Level,
    tag: &str,
    message: Message,
    ctx: &LogContext,
    caller: CallerInfo,
    fields: Fields,
) -> LogEvent {
    let mut event = LogEvent::new(level, tag);
    let attrs = &mut event.attrs;

    if !tag.is_empty() {
        attrs.insert(keys::TAG.into(), Value::String(tag.to_string()));
    }

    attrs.insert(keys::FILE.into(), Value::String(caller.file));
    attrs.insert(keys::LINE.into(), Value::from(caller.line));
    attrs.insert(keys::FUNC.into(), Value::String(caller.function));

    if let Some(span) = ctx.span() {
        attrs.insert(keys::TRACE_ID.into(), Value::String(span.trace_id.clone()));
        attrs.insert(keys::SPAN_ID.into(), Value::String(span.span_id.clone()));
    }

    match message {
        Message::Structured(detail) => {
            attrs.insert(keys::CODE.into(), Value::from(detail.code));
            attrs.insert(keys::CODE_MSG.into(), Value::String(detail.code_msg.clone()));
            attrs.insert(keys::ERR_TYPE.into(), Value::String(detail.err_type.clone()));
            attrs.insert(keys::SERVICE.into(), Value::String(detail.service.clone()));
            attrs.insert(keys::SUCCESS.into(), Value::Bool(detail.success));
            for (k, v) in &detail.fields {
                attrs.insert(k.clone(), v.clone());
            }
            if let Some(msg) = &detail.message {
                attrs.insert(keys::MSG.into(), Value::String(msg.clone()));
            }
            event.error = Some(detail);
        }
        Message::Error(text) => {
            attrs.insert(keys::ERROR.into(), Value::String(text));
        }
        Message::Value(value) => {
            attrs.insert(keys::MSG.into(), value);
        }
        Message::Unencodable(reason) => {
            event.failures.push(EncodeFailure {
                key: keys::MSG.to_string(),
                message: reason,
            });
        }
    }

    for (k, v) in ctx.attrs() {
        event.attrs.insert(k.clone(), v.clone());
    }

    let (entries, failures) = fields.into_parts();
    for (k, v) in entries {
        event.attrs.insert(k, v);
    }
    event.failures.extend(failures);

    event
}

/// Serialize an event as one JSON line, newline included
pub fn encode_line(event: &LogEvent) -> Result<String> {
    if let Some(failure) = event.failures.first() {
        return Err(PipelineError::Encode {
            key: failure.key.clone(),
            message: failure.message.clone(),
        });
    }

    let mut data = Map::with_capacity(event.attrs.len() + 2);
    data.insert(
        keys::TS.into(),
        Value::String(event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, false)),
    );
    data.insert(keys::LEVEL.into(), Value::String(event.level.as_str().into()));
    for (k, v) in &event.attrs {
        data.insert(k.clone(), v.clone());
    }

    let mut line = serde_json::to_string(&data).map_err(|e| PipelineError::Encode {
        key: "<event>".to_string(),
        message: e.to_string(),
    })?;
    line.push('\n');
    Ok(line)
}

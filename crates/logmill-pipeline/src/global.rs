//! Process-wide default logger
//!
//! Optional convenience over an explicitly built [`Logger`]: set it once with
//! [`init`] and the free functions here log through it. Before `init` they
//! do nothing. The global handle is never dropped, so call [`shutdown`]
//! before the process exits or queued events are lost.

use logmill_core::{Fields, Level, LogContext, Message, PipelineError, Result};
use std::sync::OnceLock;

use crate::logger::{Logger, ShutdownSummary};

static GLOBAL: OnceLock<Logger> = OnceLock::new();

/// Install `logger` as the process-wide default. Fails if one is already set.
pub fn init(logger: Logger) -> Result<()> {
    GLOBAL
        .set(logger)
        .map_err(|_| PipelineError::Config("global logger is already initialized".to_string()))
}

pub fn get() -> Option<&'static Logger> {
    GLOBAL.get()
}

/// Log through the global logger; like [`Logger::log`], `func` is `"unknown"`
#[track_caller]
pub fn log(level: Level, ctx: &LogContext, tag: &str, message: impl Into<Message>, fields: Fields) {
    if let Some(logger) = get() {
        logger.log(level, ctx, tag, message, fields);
    }
}

#[track_caller]
pub fn debug(ctx: &LogContext, tag: &str, message: impl Into<Message>, fields: Fields) {
    log(Level::Debug, ctx, tag, message, fields);
}

#[track_caller]
pub fn info(ctx: &LogContext, tag: &str, message: impl Into<Message>, fields: Fields) {
    log(Level::Info, ctx, tag, message, fields);
}

#[track_caller]
pub fn warn(ctx: &LogContext, tag: &str, message: impl Into<Message>, fields: Fields) {
    log(Level::Warn, ctx, tag, message, fields);
}

#[track_caller]
pub fn error(ctx: &LogContext, tag: &str, message: impl Into<Message>, fields: Fields) {
    log(Level::Error, ctx, tag, message, fields);
}

/// Shut the global logger down; `None` when it was never initialized
pub fn shutdown() -> Option<Result<ShutdownSummary>> {
    get().map(Logger::shutdown)
}

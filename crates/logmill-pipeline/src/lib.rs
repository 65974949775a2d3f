//! logmill pipeline
//!
//! Ties the pieces together: a [`Logger`] encodes events on the caller's
//! thread, offers them to the bounded queue and a single writer thread
//! appends them to the rotating files.
//!
//! ```ignore
//! let logger = Logger::new(PipelineConfig::new("api", "/var/log/api"))?;
//! let ctx = LogContext::background().with_span(SpanContext::new("t-1", "s-1"));
//! logmill_pipeline::info!(logger, &ctx, "http", "request served"; "status" => 200);
//! logger.shutdown()?;
//! ```

pub mod global;
pub mod logger;
pub mod worker;
mod macros;

pub use logger::{Logger, ShutdownSummary};
pub use logmill_core::{
    ErrorDetail, Fields, Level, LogContext, Message, PipelineConfig, PipelineError, SpanContext,
    Stream, StructuredError,
};

#[doc(hidden)]
pub use logmill_core as __core;

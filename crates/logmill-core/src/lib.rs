//! logmill core
//!
//! Core types, configuration and the event encoder shared by the logmill
//! pipeline crates.

pub mod caller;
pub mod config;
pub mod context;
pub mod encode;
pub mod error;
pub mod log_entry;
pub mod traits;

// Re-export commonly used types
pub use caller::{CallerInfo, SourceLocation};
pub use config::{PipelineConfig, RetentionConfig, RotationPolicy};
pub use context::{LogContext, SpanContext};
pub use encode::{build_event, encode_line, keys, tags};
pub use error::{OutputError, PipelineError, Result};
pub use log_entry::{EncodeFailure, ErrorDetail, Fields, Level, LogEvent, Message, Stream};
pub use traits::StructuredError;

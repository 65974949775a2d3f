//! logmill output
//!
//! Rotating file streams with "latest" symlinks, retention sweeps, the
//! console mirror and the pipeline's Prometheus metrics.

pub mod file;
pub mod metrics;
pub mod retention;
pub mod stdout;

pub use file::{FileSettings, RotationManager, WriteReport};
pub use metrics::PipelineMetrics;
pub use stdout::ConsoleMirror;

use thiserror::Error;

/// Core error types for logmill
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Encoding error for '{key}': {message}")]
    Encode { key: String, message: String },

    #[error("Pipeline is shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the output side (file streams, console, metrics)
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create log directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to {stream} stream: {source}")]
    Write {
        stream: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to update symlink {path}: {source}")]
    Symlink {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stdout write error: {0}")]
    Console(String),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

/// Result type alias for logmill operations
pub type Result<T> = std::result::Result<T, PipelineError>;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::PipelineError;
use crate::log_entry::{Level, Stream};

/// Queue capacity used when the configured size is zero or negative
pub const DEFAULT_QUEUE_SIZE: usize = 10_000;

/// App name used when none is configured
pub const DEFAULT_APP_NAME: &str = "app";

/// Main configuration for a logging pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Naming, location, levels and queue sizing
    pub general: GeneralConfig,

    /// Console mirroring
    pub console: ConsoleConfig,

    /// Rotation and retention
    pub rotation: RotationConfig,
}

impl PipelineConfig {
    /// Configuration with the given app name and log directory, defaults elsewhere
    pub fn new(app_name: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.general.app_name = app_name.into();
        config.general.log_dir = log_dir.into();
        config
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, PipelineError> {
        toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Fill in defaults for empty values and check the rest
    pub fn normalized(mut self) -> Result<Self, PipelineError> {
        if self.general.app_name.trim().is_empty() {
            self.general.app_name = DEFAULT_APP_NAME.to_string();
        }
        if self.general.log_dir.as_os_str().is_empty() {
            self.general.log_dir = PathBuf::from(".");
        }
        if self.general.queue_size <= 0 {
            self.general.queue_size = DEFAULT_QUEUE_SIZE as i64;
        }
        if self.general.app_name.contains(['/', '\\']) {
            return Err(PipelineError::Config(format!(
                "app_name '{}' must not contain path separators",
                self.general.app_name
            )));
        }
        Ok(self)
    }

    /// Queue capacity with the default applied
    pub fn queue_capacity(&self) -> usize {
        if self.general.queue_size <= 0 {
            DEFAULT_QUEUE_SIZE
        } else {
            self.general.queue_size as usize
        }
    }

    /// Whether an event at `level` passes the minimum threshold
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.general.level
    }

    /// Streams written by this configuration
    pub fn streams(&self) -> Vec<Stream> {
        match self.general.elevated_level {
            Some(_) => vec![Stream::Normal, Stream::Elevated],
            None => vec![Stream::Normal],
        }
    }

    /// Destination stream of an event at `level`
    pub fn stream_for(&self, level: Level) -> Stream {
        match self.general.elevated_level {
            Some(threshold) if level >= threshold => Stream::Elevated,
            _ => Stream::Normal,
        }
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Prefix of every file and symlink name
    pub app_name: String,

    /// Directory holding the log files
    pub log_dir: PathBuf,

    /// Minimum level accepted by the logger
    pub level: Level,

    /// Events at or above this level go to the `.wf` stream instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevated_level: Option<Level>,

    /// Ingestion queue capacity; zero or negative means the default
    pub queue_size: i64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            log_dir: PathBuf::from("."),
            level: Level::Info,
            elevated_level: None,
            queue_size: DEFAULT_QUEUE_SIZE as i64,
        }
    }
}

/// Console mirroring configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Prefix lines with an ANSI-colored level tag
    pub color: bool,
}

/// When to start a new file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationMode {
    #[default]
    Hourly,
    Size,
}

/// Resolved rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// New file every wall-clock hour
    Hourly,
    /// New file once the current one reaches `max_bytes`; zero never rotates on size
    SizeBound { max_bytes: u64 },
}

/// How many rotated files to keep per stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Zero disables pruning
    pub max_backups: usize,
}

impl RetentionConfig {
    pub fn enabled(&self) -> bool {
        self.max_backups > 0
    }
}

/// Rotation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Rotation: hourly, size
    pub mode: RotationMode,
    /// Threshold in megabytes for size-based rotation
    pub max_size_mb: u64,
    /// Number of files to keep per stream
    pub max_backups: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            mode: RotationMode::Hourly,
            max_size_mb: 100,
            max_backups: 0,
        }
    }
}

impl RotationConfig {
    pub fn policy(&self) -> RotationPolicy {
        match self.mode {
            RotationMode::Hourly => RotationPolicy::Hourly,
            RotationMode::Size => RotationPolicy::SizeBound {
                max_bytes: self.max_size_mb.saturating_mul(1024 * 1024),
            },
        }
    }

    pub fn retention(&self) -> RetentionConfig {
        RetentionConfig {
            max_backups: self.max_backups,
        }
    }
}

use chrono::Local;
use logmill_core::{
    build_event, Fields, Level, LogContext, LogEvent, Message, OutputError, PipelineConfig,
    PipelineError, Result, SourceLocation, Stream,
};
use logmill_ingestion::{create_event_queue, Enqueue, EventSender, QueueSnapshot};
use logmill_output::{ConsoleMirror, FileSettings, PipelineMetrics, RotationManager};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::worker::{Sinks, Worker, WorkerSummary};

/// Final counters returned by [`Logger::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub accepted: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub written: u64,
    pub encode_errors: u64,
    pub write_errors: u64,
}

impl ShutdownSummary {
    fn new(queue: QueueSnapshot, worker: WorkerSummary) -> Self {
        Self {
            accepted: queue.accepted,
            dropped: queue.dropped,
            rejected: queue.rejected,
            written: worker.written,
            encode_errors: worker.encode_errors,
            write_errors: worker.write_errors,
        }
    }
}

struct Running {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<WorkerSummary>,
}

struct Inner {
    config: Arc<PipelineConfig>,
    sender: EventSender,
    sinks: Arc<Mutex<Sinks>>,
    metrics: Arc<PipelineMetrics>,
    running: Mutex<Option<Running>>,
    summary: Mutex<Option<ShutdownSummary>>,
}

impl Inner {
    fn shutdown(&self) -> Result<ShutdownSummary> {
        let running = self.running.lock().take();
        let Some(Running { stop, handle }) = running else {
            return Ok((*self.summary.lock()).unwrap_or_default());
        };

        // The worker may already be gone when its thread panicked
        let _ = stop.send(());
        let worker = handle.join().map_err(|_| PipelineError::ShutDown)?;

        let summary = ShutdownSummary::new(self.sender.stats(), worker);
        *self.summary.lock() = Some(summary);
        info!(
            written = summary.written,
            dropped = summary.dropped,
            "Logger shut down"
        );
        Ok(summary)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Logger shutdown on drop failed");
        }
    }
}

/// Handle to one running pipeline
///
/// Cheap to clone; all clones feed the same queue. Logging never blocks and
/// never fails: events that do not fit are dropped and counted. Dropping the
/// last handle shuts the pipeline down like [`Logger::shutdown`].
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    /// Open the log files and start the writer thread
    ///
    /// Failing to create the directory or open the first file of any stream
    /// is fatal here; later failures are only reported.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let console = ConsoleMirror::from_config(&config.console);
        Self::build(config, console)
    }

    /// Like [`Logger::new`], mirroring to the given console instead of stdout
    pub fn with_console(config: PipelineConfig, console: ConsoleMirror) -> Result<Self> {
        Self::build(config, Some(console))
    }

    fn build(config: PipelineConfig, console: Option<ConsoleMirror>) -> Result<Self> {
        let config = Arc::new(config.normalized()?);

        let files = RotationManager::open(
            FileSettings::from_config(&config),
            &config.streams(),
            Local::now(),
        )?;
        let sinks = Arc::new(Mutex::new(Sinks { files, console }));
        let metrics = Arc::new(PipelineMetrics::new()?);

        let (sender, receiver) = create_event_queue(config.queue_capacity());
        let (stop, stop_rx) = oneshot::channel();
        let worker = Worker::new(receiver, sinks.clone(), config.clone(), metrics.clone());
        let handle = worker.spawn(stop_rx)?;

        info!(
            app = %config.general.app_name,
            dir = %config.general.log_dir.display(),
            queue = config.queue_capacity(),
            "Logger started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                sender,
                sinks,
                metrics,
                running: Mutex::new(Some(Running { stop, handle })),
                summary: Mutex::new(None),
            }),
        })
    }

    /// Log with the caller's file and line
    ///
    /// Only the file and line of a `#[track_caller]` call are known, so the
    /// event's `func` is `"unknown"`. The logging macros ([`log!`](crate::log),
    /// [`info!`](crate::info), ...) also record the enclosing function.
    #[track_caller]
    pub fn log(
        &self,
        level: Level,
        ctx: &LogContext,
        tag: &str,
        message: impl Into<Message>,
        fields: Fields,
    ) {
        self.log_at(SourceLocation::caller(), level, ctx, tag, message, fields);
    }

    /// Log with loose key/value pairs: `[key, value, key, value, ...]`
    ///
    /// A non-string key skips its pair; a trailing key without a value is ignored.
    #[track_caller]
    pub fn log_kv(
        &self,
        level: Level,
        ctx: &LogContext,
        tag: &str,
        message: impl Into<Message>,
        kv: &[Value],
    ) {
        self.log_at(
            SourceLocation::caller(),
            level,
            ctx,
            tag,
            message,
            Fields::from_pairs(kv),
        );
    }

    /// Log with an explicit source location (used by the logging macros)
    pub fn log_at(
        &self,
        location: SourceLocation,
        level: Level,
        ctx: &LogContext,
        tag: &str,
        message: impl Into<Message>,
        fields: Fields,
    ) {
        if !self.enabled(level) {
            return;
        }
        let event = build_event(level, tag, message.into(), ctx, location.resolve(), fields);
        self.submit(event);
    }

    #[track_caller]
    pub fn debug(&self, ctx: &LogContext, tag: &str, message: impl Into<Message>, fields: Fields) {
        self.log(Level::Debug, ctx, tag, message, fields);
    }

    #[track_caller]
    pub fn info(&self, ctx: &LogContext, tag: &str, message: impl Into<Message>, fields: Fields) {
        self.log(Level::Info, ctx, tag, message, fields);
    }

    #[track_caller]
    pub fn warn(&self, ctx: &LogContext, tag: &str, message: impl Into<Message>, fields: Fields) {
        self.log(Level::Warn, ctx, tag, message, fields);
    }

    #[track_caller]
    pub fn error(&self, ctx: &LogContext, tag: &str, message: impl Into<Message>, fields: Fields) {
        self.log(Level::Error, ctx, tag, message, fields);
    }

    /// Whether events at `level` pass the configured threshold
    pub fn enabled(&self, level: Level) -> bool {
        self.inner.config.enabled(level)
    }

    /// Offer a ready-made event to the queue
    pub fn submit(&self, event: LogEvent) -> Enqueue {
        let outcome = self.inner.sender.enqueue(event);
        let metrics = &self.inner.metrics;
        match outcome {
            Enqueue::Accepted => metrics.record_accepted(),
            Enqueue::Dropped => metrics.record_dropped(),
            Enqueue::Rejected => metrics.record_rejected(),
        }
        outcome
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn queue_stats(&self) -> QueueSnapshot {
        self.inner.sender.stats()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.inner.metrics
    }

    /// Metrics in Prometheus text format, with the current queue depth
    pub fn gather_metrics(&self) -> std::result::Result<String, OutputError> {
        self.inner.metrics.set_queue_depth(self.inner.sender.depth());
        self.inner.metrics.gather()
    }

    /// File currently open (or last open) for `stream`
    pub fn current_file(&self, stream: Stream) -> Option<PathBuf> {
        self.inner
            .sinks
            .lock()
            .files
            .current_path(stream)
            .map(|p| p.to_path_buf())
    }

    /// Stop accepting events, drain the queue and close every file
    ///
    /// Later calls return the same summary. Events logged afterwards are
    /// rejected and counted.
    pub fn shutdown(&self) -> Result<ShutdownSummary> {
        self.inner.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn logger(dir: &TempDir) -> Logger {
        Logger::new(PipelineConfig::new("unit", dir.path())).unwrap()
    }

    fn lines(path: PathBuf) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_log_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        let ctx = LogContext::background().with("request", "r-1".into());

        logger.info(&ctx, "start", "hello", Fields::new().with("port", &8080));
        let summary = logger.shutdown().unwrap();
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.written, 1);

        let written = lines(logger.current_file(Stream::Normal).unwrap());
        assert_eq!(written.len(), 1);
        let line = &written[0];
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["tag"], "start");
        assert_eq!(line["msg"], "hello");
        assert_eq!(line["request"], "r-1");
        assert_eq!(line["port"], 8080);
        assert_eq!(line["func"], "unknown");
        assert!(line["file"].as_str().unwrap().ends_with("logger.rs"));
    }

    #[test]
    fn test_below_threshold_is_skipped() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        logger.debug(&LogContext::background(), "", "quiet", Fields::new());
        assert_eq!(logger.queue_stats().accepted, 0);
        logger.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        logger.warn(&LogContext::background(), "", "once", Fields::new());
        let first = logger.shutdown().unwrap();
        let second = logger.shutdown().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_log_after_shutdown_is_rejected() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        logger.shutdown().unwrap();

        logger.error(&LogContext::background(), "", "late", Fields::new());
        assert_eq!(logger.queue_stats().rejected, 1);
        assert!(logger.gather_metrics().unwrap().contains("logmill_events_rejected_total 1"));
    }

    #[test]
    fn test_log_kv_skips_bad_pairs() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        logger.log_kv(
            Level::Info,
            &LogContext::background(),
            "kv",
            "m",
            &["a".into(), 1.into(), 2.into(), "x".into(), "b".into(), true.into(), "dangling".into()],
        );
        logger.shutdown().unwrap();

        let line = &lines(logger.current_file(Stream::Normal).unwrap())[0];
        assert_eq!(line["a"], 1);
        assert_eq!(line["b"], true);
        assert!(line.get("x").is_none());
        assert!(line.get("dangling").is_none());
    }

    #[test]
    fn test_invalid_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();

        let result = Logger::new(PipelineConfig::new("unit", blocker.join("logs")));
        assert!(matches!(result, Err(PipelineError::Output(_))));
    }

    #[test]
    fn test_drop_drains_queue() {
        let dir = TempDir::new().unwrap();
        let path = {
            let logger = logger(&dir);
            logger.info(&LogContext::background(), "", "bye", Fields::new());
            logger.current_file(Stream::Normal).unwrap()
        };
        assert_eq!(lines(path).len(), 1);
    }
}

use chrono::Local;
use logmill_core::{encode_line, LogEvent, PipelineConfig};
use logmill_ingestion::EventReceiver;
use logmill_output::{ConsoleMirror, PipelineMetrics, RotationManager};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Name of the writer thread
pub const WORKER_THREAD_NAME: &str = "logmill-writer";

/// Everything written under the pipeline lock
pub struct Sinks {
    pub files: RotationManager,
    pub console: Option<ConsoleMirror>,
}

/// Counters kept by the writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub written: u64,
    pub encode_errors: u64,
    pub write_errors: u64,
    pub console_errors: u64,
}

/// Single consumer of the ingestion queue
pub struct Worker {
    rx: EventReceiver,
    sinks: Arc<Mutex<Sinks>>,
    config: Arc<PipelineConfig>,
    metrics: Arc<PipelineMetrics>,
    summary: WorkerSummary,
}

impl Worker {
    pub fn new(
        rx: EventReceiver,
        sinks: Arc<Mutex<Sinks>>,
        config: Arc<PipelineConfig>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            rx,
            sinks,
            config,
            metrics,
            summary: WorkerSummary::default(),
        }
    }

    /// Start the worker on its own thread.
    ///
    /// The thread runs until `shutdown` fires (or its sender is dropped),
    /// then drains the queue, closes every stream and returns its counters.
    pub fn spawn(self, shutdown: oneshot::Receiver<()>) -> io::Result<JoinHandle<WorkerSummary>> {
        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(self.run(shutdown)))
    }

    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> WorkerSummary {
        debug!("Writer worker started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                event = self.rx.recv() => match event {
                    Some(event) => {
                        self.handle(event);
                        while let Some(event) = self.rx.try_recv() {
                            self.handle(event);
                        }
                    }
                    None => break,
                },
            }
        }

        self.rx.close();
        let mut drained = 0u64;
        while let Some(event) = self.rx.recv().await {
            self.handle(event);
            drained += 1;
        }

        self.sinks.lock().files.close();

        info!(
            drained,
            written = self.summary.written,
            "Writer worker stopped"
        );
        self.summary
    }

    /// Encode, then write and mirror under the lock
    fn handle(&mut self, event: LogEvent) {
        let line = match encode_line(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!(level = %event.level, tag = %event.tag, error = %e, "Dropping event that cannot be encoded");
                self.metrics.record_encode_error();
                self.summary.encode_errors += 1;
                return;
            }
        };

        let stream = self.config.stream_for(event.level);
        let now = Local::now();
        let mut sinks = self.sinks.lock();

        match sinks.files.write(stream, &line, &now) {
            Ok(report) => {
                if report.rotated {
                    info!(stream = %stream, pruned = report.pruned, "Rotated log file");
                    self.metrics.record_rotation(stream, report.pruned);
                }
                self.metrics.record_written(stream, report.bytes);
                self.summary.written += 1;
            }
            Err(e) => {
                error!(stream = %stream, error = %e, "Failed to write log line");
                self.metrics.record_write_error(stream);
                self.summary.write_errors += 1;
            }
        }

        if let Some(console) = sinks.console.as_mut() {
            if let Err(e) = console.write(event.level, &line) {
                warn!(error = %e, "Failed to mirror log line to console");
                self.metrics.record_console_error();
                self.summary.console_errors += 1;
            }
        }
    }
}

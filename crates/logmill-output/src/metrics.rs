//! Prometheus metrics of a pipeline
//!
//! Every pipeline owns its own registry so independent instances do not
//! collide. Drops are exported here so operators can alert on log loss.

use logmill_core::{OutputError, Stream};
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

/// Metrics collector for one pipeline
pub struct PipelineMetrics {
    registry: Registry,

    // Ingestion metrics
    events_accepted_total: Counter,
    events_dropped_total: Counter,
    events_rejected_total: Counter,
    queue_depth: Gauge,

    // Output metrics
    events_written_total: CounterVec,
    bytes_written_total: CounterVec,
    rotations_total: CounterVec,
    write_errors_total: CounterVec,
    encode_errors_total: Counter,
    console_errors_total: Counter,
    files_pruned_total: Counter,
}

fn metric_err(e: prometheus::Error) -> OutputError {
    OutputError::Metrics(format!("Failed to create metric: {}", e))
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, OutputError> {
        let registry = Registry::new();

        let events_accepted_total = Counter::new(
            "logmill_events_accepted_total",
            "Total number of events accepted by the ingestion queue",
        )
        .map_err(metric_err)?;

        let events_dropped_total = Counter::new(
            "logmill_events_dropped_total",
            "Total number of events dropped because the queue was full",
        )
        .map_err(metric_err)?;

        let events_rejected_total = Counter::new(
            "logmill_events_rejected_total",
            "Total number of events rejected after shutdown",
        )
        .map_err(metric_err)?;

        let queue_depth = Gauge::new(
            "logmill_queue_depth",
            "Events waiting in the ingestion queue",
        )
        .map_err(metric_err)?;

        let events_written_total = CounterVec::new(
            Opts::new("logmill_events_written_total", "Events written per stream"),
            &["stream"],
        )
        .map_err(metric_err)?;

        let bytes_written_total = CounterVec::new(
            Opts::new("logmill_bytes_written_total", "Bytes written per stream"),
            &["stream"],
        )
        .map_err(metric_err)?;

        let rotations_total = CounterVec::new(
            Opts::new("logmill_rotations_total", "File rotations per stream"),
            &["stream"],
        )
        .map_err(metric_err)?;

        let write_errors_total = CounterVec::new(
            Opts::new(
                "logmill_write_errors_total",
                "Rotation or write failures per stream",
            ),
            &["stream"],
        )
        .map_err(metric_err)?;

        let encode_errors_total = Counter::new(
            "logmill_encode_errors_total",
            "Events discarded because they could not be encoded",
        )
        .map_err(metric_err)?;

        let console_errors_total = Counter::new(
            "logmill_console_errors_total",
            "Failures mirroring events to the console",
        )
        .map_err(metric_err)?;

        let files_pruned_total = Counter::new(
            "logmill_files_pruned_total",
            "Rotated files removed by retention sweeps",
        )
        .map_err(metric_err)?;

        // Register all metrics
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(events_accepted_total.clone()),
            Box::new(events_dropped_total.clone()),
            Box::new(events_rejected_total.clone()),
            Box::new(queue_depth.clone()),
            Box::new(events_written_total.clone()),
            Box::new(bytes_written_total.clone()),
            Box::new(rotations_total.clone()),
            Box::new(write_errors_total.clone()),
            Box::new(encode_errors_total.clone()),
            Box::new(console_errors_total.clone()),
            Box::new(files_pruned_total.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .map_err(|e| OutputError::Metrics(format!("Failed to register metric: {}", e)))?;
        }

        Ok(Self {
            registry,
            events_accepted_total,
            events_dropped_total,
            events_rejected_total,
            queue_depth,
            events_written_total,
            bytes_written_total,
            rotations_total,
            write_errors_total,
            encode_errors_total,
            console_errors_total,
            files_pruned_total,
        })
    }

    pub fn record_accepted(&self) {
        self.events_accepted_total.inc();
    }

    pub fn record_dropped(&self) {
        self.events_dropped_total.inc();
    }

    pub fn record_rejected(&self) {
        self.events_rejected_total.inc();
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }

    /// Record a line written to `stream`
    pub fn record_written(&self, stream: Stream, bytes: u64) {
        self.events_written_total
            .with_label_values(&[stream.name()])
            .inc();
        self.bytes_written_total
            .with_label_values(&[stream.name()])
            .inc_by(bytes as f64);
    }

    pub fn record_rotation(&self, stream: Stream, pruned: usize) {
        self.rotations_total.with_label_values(&[stream.name()]).inc();
        self.files_pruned_total.inc_by(pruned as f64);
    }

    pub fn record_write_error(&self, stream: Stream) {
        self.write_errors_total
            .with_label_values(&[stream.name()])
            .inc();
    }

    pub fn record_encode_error(&self) {
        self.encode_errors_total.inc();
    }

    pub fn record_console_error(&self) {
        self.console_errors_total.inc();
    }

    pub fn dropped(&self) -> u64 {
        self.events_dropped_total.get() as u64
    }

    pub fn written(&self, stream: Stream) -> u64 {
        self.events_written_total
            .with_label_values(&[stream.name()])
            .get() as u64
    }

    pub fn write_errors(&self, stream: Stream) -> u64 {
        self.write_errors_total
            .with_label_values(&[stream.name()])
            .get() as u64
    }

    pub fn encode_errors(&self) -> u64 {
        self.encode_errors_total.get() as u64
    }

    /// Get metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, OutputError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| OutputError::Metrics(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| OutputError::Metrics(format!("Metrics are not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = PipelineMetrics::new().unwrap();
        let output = metrics.gather().unwrap();
        assert!(output.contains("logmill_events_dropped_total"));
        assert!(output.contains("logmill_queue_depth"));
    }

    #[test]
    fn test_independent_registries() {
        let a = PipelineMetrics::new().unwrap();
        let b = PipelineMetrics::new().unwrap();
        a.record_dropped();
        assert_eq!(a.dropped(), 1);
        assert_eq!(b.dropped(), 0);
    }

    #[test]
    fn test_per_stream_counters() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.record_written(Stream::Normal, 100);
        metrics.record_written(Stream::Normal, 50);
        metrics.record_written(Stream::Elevated, 10);
        metrics.record_write_error(Stream::Elevated);

        assert_eq!(metrics.written(Stream::Normal), 2);
        assert_eq!(metrics.written(Stream::Elevated), 1);
        assert_eq!(metrics.write_errors(Stream::Elevated), 1);
        assert_eq!(metrics.write_errors(Stream::Normal), 0);

        let output = metrics.gather().unwrap();
        assert!(output.contains("logmill_bytes_written_total{stream=\"normal\"} 150"));
    }

    #[test]
    fn test_rotation_and_pruning() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.record_rotation(Stream::Normal, 3);
        let output = metrics.gather().unwrap();
        assert!(output.contains("logmill_rotations_total{stream=\"normal\"} 1"));
        assert!(output.contains("logmill_files_pruned_total 3"));
    }
}

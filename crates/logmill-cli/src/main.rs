use anyhow::{Context, Result};
use clap::Parser;
use logmill_core::{Fields, Level, LogContext, PipelineConfig, SpanContext};
use logmill_pipeline::Logger;
use serde_json::json;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

/// logmill - rotating structured log pipeline demo
#[derive(Parser, Debug)]
#[command(name = "logmill")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log directory (overrides config)
    #[arg(short = 'd', long)]
    log_dir: Option<PathBuf>,

    /// Number of producer threads
    #[arg(short, long, default_value_t = 4)]
    producers: usize,

    /// Events logged by each producer
    #[arg(short, long, default_value_t = 1000)]
    events: usize,

    /// Mirror every line to stdout
    #[arg(long)]
    console: bool,

    /// Color the console level prefix
    #[arg(long)]
    color: bool,

    /// Enable verbose diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --print-config
    if args.print_config {
        let config = PipelineConfig::default().normalized()?;
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let mut config = match args.config {
        Some(ref path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.log_dir {
        config.general.log_dir = dir;
    }
    config.console.enabled |= args.console;
    config.console.color |= args.color;

    // Pipeline diagnostics (drops, write failures) always reach stderr
    FmtSubscriber::builder()
        .with_max_level(diagnostics_level(args.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let logger = Logger::new(config).context("starting logger")?;
    info!(producers = args.producers, events = args.events, "Starting producers");

    let started = Instant::now();
    let handles: Vec<_> = (0..args.producers)
        .map(|producer| {
            let logger = logger.clone();
            let events = args.events;
            thread::spawn(move || produce(&logger, producer, events))
        })
        .collect();
    for handle in handles {
        if handle.join().is_err() {
            eprintln!("Warning: a producer thread panicked");
        }
    }

    let summary = logger.shutdown()?;
    let elapsed = started.elapsed();

    eprintln!(
        "accepted={} dropped={} rejected={} written={} encode_errors={} write_errors={} elapsed={:?}",
        summary.accepted,
        summary.dropped,
        summary.rejected,
        summary.written,
        summary.encode_errors,
        summary.write_errors,
        elapsed
    );
    if args.verbose {
        eprintln!("{}", logger.gather_metrics()?);
    }

    Ok(())
}

fn diagnostics_level(verbose: bool) -> tracing::Level {
    if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    }
}

/// Log `events` events with a mix of levels from one producer
fn produce(logger: &Logger, producer: usize, events: usize) {
    let ctx = LogContext::background()
        .with_span(SpanContext::new(format!("trace-{}", producer), "root"))
        .with("producer", json!(producer));

    for seq in 0..events {
        let level = match seq % 20 {
            0 => Level::Error,
            1..=3 => Level::Warn,
            4..=9 => Level::Debug,
            _ => Level::Info,
        };
        logger.log(
            level,
            &ctx,
            "demo",
            format!("event {}", seq),
            Fields::new().with("seq", &seq),
        );
    }
    logmill_pipeline::info!(logger, &ctx, "demo", "producer done"; "events" => events);
}

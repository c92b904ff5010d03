use anyhow::Result;
use clap::Parser;
use motioncam::display::{ChannelSink, DisplayFeed, DisplayStats};
use motioncam::{CapturePipeline, MotioncamConfig, PipelineEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "motioncam")]
#[command(about = "Camera pipeline with motion-gated recording and a live display feed")]
#[command(version)]
#[command(long_about = "Captures frames from a camera, detects motion by frame differencing, \
records a video file while motion continues, and hands every frame to a display feed.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "motioncam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the pipeline")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[derive(Debug)]
enum ShutdownReason {
    Signal(&'static str),
    Fatal(String),
}

impl ShutdownReason {
    fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) => 0,
            ShutdownReason::Fatal(_) => 1,
        }
    }
}

enum StartOutcome {
    Finished(std::result::Result<motioncam::Result<()>, tokio::task::JoinError>),
    Interrupted(Option<ShutdownReason>),
}

/// How often the display consumer logs its statistics
const DISPLAY_STATS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting motioncam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match MotioncamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let pipeline = Arc::new(CapturePipeline::from_config(&config).map_err(|e| {
        error!("Failed to create capture pipeline: {}", e);
        e
    })?);

    let (sink, feed) = ChannelSink::new(config.display.feed_capacity);
    pipeline.set_display_sink(Box::new(sink));
    let consumer = std::thread::Builder::new()
        .name("motioncam-display".to_string())
        .spawn(move || consume_display_feed(feed))?;

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<ShutdownReason>(4);
    setup_signal_handlers(shutdown_tx.clone());
    watch_for_fatal_events(pipeline.events(), shutdown_tx);

    let starter = Arc::clone(&pipeline);
    let start = tokio::task::spawn_blocking(move || starter.start());

    let outcome = tokio::select! {
        started = start => StartOutcome::Finished(started),
        reason = shutdown_rx.recv() => StartOutcome::Interrupted(reason),
    };

    let closed = || ShutdownReason::Fatal("Shutdown channel closed".to_string());
    let reason = match outcome {
        StartOutcome::Finished(Ok(Ok(()))) => {
            info!("Motioncam is running");
            shutdown_rx.recv().await.unwrap_or_else(closed)
        }
        StartOutcome::Finished(Ok(Err(e))) => {
            ShutdownReason::Fatal(format!("Failed to start pipeline: {}", e))
        }
        StartOutcome::Finished(Err(e)) => {
            ShutdownReason::Fatal(format!("Start task failed: {}", e))
        }
        StartOutcome::Interrupted(reason) => reason.unwrap_or_else(closed),
    };

    info!("Shutdown initiated: {:?}", reason);

    let stopper = Arc::clone(&pipeline);
    if let Err(e) = tokio::task::spawn_blocking(move || stopper.stop()).await {
        error!("Failed to stop pipeline cleanly: {}", e);
    }

    let stats = pipeline.stats();
    info!(
        "Captured {} frames, {} detections, {} recordings, {} reconnects",
        stats.frames_captured, stats.motion_detections, stats.sessions_opened, stats.reconnects
    );

    // Dropping the sink disconnects the feed and ends the consumer
    drop(pipeline.take_display_sink());
    if consumer.join().is_err() {
        warn!("Display consumer panicked");
    }

    let exit_code = reason.exit_code();
    if let ShutdownReason::Fatal(message) = &reason {
        error!("{}", message);
    }
    info!("Motioncam exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

/// Drain the display feed, logging statistics periodically
fn consume_display_feed(feed: DisplayFeed) {
    let mut stats = DisplayStats::default();
    let mut last_format = None;
    let mut last_report = Instant::now();

    loop {
        match feed.recv_timeout(Duration::from_millis(500)) {
            Ok(Some(frame)) => {
                let format = feed.format();
                if format != last_format {
                    stats.record_negotiation();
                    if let Some(format) = format {
                        info!(
                            "Display feed now {} {:?}",
                            format.geometry, format.pixel_format
                        );
                    }
                    last_format = format;
                }
                debug!("Display frame {} ({} bytes)", frame.id, frame.data.len());
                stats.record_frame();
            }
            Ok(None) => {}
            Err(_) => break,
        }

        if last_report.elapsed() >= DISPLAY_STATS_INTERVAL {
            match stats.last_frame_time.map(|at| at.elapsed().unwrap_or_default()) {
                Some(idle) if idle < DISPLAY_STATS_INTERVAL => info!(
                    "Display feed: {} frames, {} format changes",
                    stats.frames_presented, stats.negotiations
                ),
                Some(idle) => warn!("Display feed idle for {}s", idle.as_secs()),
                None => warn!("Display feed has not received a frame yet"),
            }
            last_report = Instant::now();
        }
    }

    debug!("Display feed closed after {} frames", stats.frames_presented);
}

fn setup_signal_handlers(shutdown: mpsc::Sender<ShutdownReason>) {
    #[cfg(unix)]
    {
        let shutdown_sigterm = shutdown.clone();
        tokio::spawn(async move {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_some() {
                        info!("Received SIGTERM signal");
                        let _ = shutdown_sigterm.send(ShutdownReason::Signal("SIGTERM")).await;
                    }
                }
                Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
            }
        });
    }

    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            let _ = shutdown.send(ShutdownReason::Signal("SIGINT")).await;
        }
    });
}

fn watch_for_fatal_events(
    mut events: broadcast::Receiver<PipelineEvent>,
    shutdown: mpsc::Sender<ShutdownReason>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PipelineEvent::Fatal { component, error }) => {
                    let _ = shutdown
                        .send(ShutdownReason::Fatal(format!("{}: {}", component, error)))
                        .await;
                    break;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Event watcher skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("motioncam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Motioncam configuration file");
    println!("# Every option with its default value; environment variables");
    println!("# such as MOTIONCAM_RECORDING__COOLDOWN_SECONDS override the file.");
    println!();
    println!("{}", MotioncamConfig::default().to_toml()?);
    Ok(())
}

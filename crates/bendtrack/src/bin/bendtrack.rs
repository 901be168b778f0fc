use std::{error::Error, path::PathBuf, time::Duration};

use bendtrack::{
    Decision, DirectoryFrames, FixedDecision, FolderMonitor, FrameProvider, FrameRate, TrackConfig,
    TrackReport, TrackingSession,
};
use clap::{Parser, ValueEnum};
use log::LevelFilter;

/// Track the bending of a needle-like object through a folder of frames.
#[derive(Debug, Parser)]
#[command(author, version, about = "Three-point bending tracker")]
struct Args {
    /// Path to the JSON tracking config.
    config: PathBuf,

    /// Keep watching the frames folder for new files.
    #[arg(long)]
    monitor: bool,

    /// Folder poll interval in monitor mode, in milliseconds.
    #[arg(long, default_value_t = 300)]
    poll_ms: u64,

    /// Stop monitoring after this many seconds without a new frame.
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Answer to every match the quality gate rejects.
    #[arg(long, value_enum, default_value_t = OnFailure::Skip)]
    on_failure: OnFailure,

    /// Derive frame times from a fixed frame rate instead of `time_step`.
    #[arg(long)]
    frame_rate: Option<f64>,

    /// Report path; overrides `output_path` from the config.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OnFailure {
    Accept,
    Skip,
    Stop,
    Reselect,
}

impl From<OnFailure> for Decision {
    fn from(value: OnFailure) -> Self {
        match value {
            OnFailure::Accept => Decision::Accept,
            OnFailure::Skip => Decision::Skip,
            OnFailure::Stop => Decision::Stop,
            OnFailure::Reselect => Decision::Reselect,
        }
    }
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(level: LevelFilter) -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "tracing")]
    {
        let _ = level;
        let _ = tracing_log::LogTracer::init();
        bendtrack::core::init_tracing(false);
    }
    #[cfg(not(feature = "tracing"))]
    bendtrack::core::init_with_level(level)?;
    Ok(())
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log_level)?;

    let cfg = TrackConfig::load_json(&args.config)?;
    let provider: Box<dyn FrameProvider> = if args.monitor {
        let mut monitor = FolderMonitor::new(&cfg.frames_dir, Duration::from_millis(args.poll_ms));
        if let Some(secs) = args.idle_timeout_secs {
            monitor = monitor.with_idle_timeout(Duration::from_secs(secs));
        }
        Box::new(monitor)
    } else {
        Box::new(DirectoryFrames::open(&cfg.frames_dir)?)
    };

    let mut session = TrackingSession::new(
        cfg.params.clone(),
        provider,
        Box::new(cfg.build_calibration()),
    )
    .with_resolver(Box::new(FixedDecision(args.on_failure.into())));
    if let Some(fps) = args.frame_rate {
        session = session.with_time_source(Box::new(FrameRate { fps }));
    }

    let handle = session.spawn()?;
    let results = handle.results().clone();
    let summary = handle.join()?;

    let report = TrackReport {
        config_path: Some(args.config.display().to_string()),
        summary,
        frames: results.snapshot(),
    };
    let out = args.output.unwrap_or_else(|| cfg.output_path());
    report.write_json(&out)?;
    log::info!("wrote report to {}", out.display());
    println!(
        "{} frames measured, {} skipped, {} dropped; report: {}",
        report.summary.frames_measured,
        report.summary.frames_skipped,
        report.summary.frames_dropped,
        out.display()
    );
    Ok(())
}

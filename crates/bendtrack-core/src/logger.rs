//! Stderr logger for tracking runs.
//!
//! Lines look like `[   1.234s  INFO #0012 engine] message`: elapsed time,
//! level, the frame being processed on this thread (if any) and the last
//! segment of the module path. Install it once at startup with
//! `init_with_level`; library code only talks to the `log` facade.

use std::cell::Cell;
use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

thread_local! {
    static FRAME: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Tags log lines of the current thread with a frame index until dropped.
///
/// Scopes nest; dropping one restores the enclosing frame.
#[derive(Debug)]
#[must_use = "the frame tag is removed when the scope is dropped"]
pub struct FrameLogScope {
    previous: Option<usize>,
}

impl FrameLogScope {
    pub fn enter(index: usize) -> Self {
        Self {
            previous: FRAME.with(|f| f.replace(Some(index))),
        }
    }
}

impl Drop for FrameLogScope {
    fn drop(&mut self) {
        FRAME.with(|f| f.set(self.previous));
    }
}

/// Frame index tagged on this thread, if any.
pub fn current_frame() -> Option<usize> {
    FRAME.with(Cell::get)
}

fn format_line(
    elapsed: f64,
    level: Level,
    frame: Option<usize>,
    target: &str,
    args: fmt::Arguments<'_>,
) -> String {
    let module = target.rsplit("::").next().unwrap_or(target);
    match frame {
        Some(index) => format!("[{elapsed:8.3}s {level:>5} #{index:04} {module}] {args}"),
        None => format!("[{elapsed:8.3}s {level:>5} {module}] {args}"),
    }
}

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            current_frame(),
            record.target(),
            *record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger with the provided level filter.
///
/// Only the first call installs anything; the first level wins.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber honouring `RUST_LOG` (default `info`).
///
/// Span-close events carry the time spent in instrumented functions such as
/// template matching and per-frame processing.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

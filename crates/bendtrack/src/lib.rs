//! Bending tracker for needle-like objects in image sequences.
//!
//! Three points are followed from frame to frame: a holder region the
//! object is clamped in, the free end, and a midpoint. Each frame the holder
//! is matched first, then the free end and the midpoint are re-matched with
//! templates rotated to the current pose until the free end settles. The
//! three positions define a circular arc whose bend, curvature, arc length
//! and deformation make up one [`FrameResult`].
//!
//! ## Quickstart
//!
//! ```no_run
//! use bendtrack::{DirectoryFrames, TrackConfig, TrackingSession};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = TrackConfig::load_json("track.json")?;
//! let session = TrackingSession::new(
//!     cfg.params.clone(),
//!     Box::new(DirectoryFrames::open(&cfg.frames_dir)?),
//!     Box::new(cfg.build_calibration()),
//! );
//! let handle = session.spawn()?;
//! let summary = handle.join()?;
//! println!("{} frames measured", summary.frames_measured);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `bendtrack::core`: frames, patches, blur and rotation.
//! - `bendtrack::matching`: correlation metrics, sub-pixel matching, quality gate.
//! - [`TrackingSession`] / [`SessionHandle`]: worker-thread driver.
//! - [`Engine`]: frame-by-frame tracking without a thread.
//! - [`solve_bending`]: the three-point arc fit on its own.

pub use bendtrack_core as core;
pub use bendtrack_match as matching;

mod calibration;
mod engine;
mod error;
mod geometry;
mod io;
mod params;
mod policy;
mod pose;
mod reference;
mod result;
mod search;
mod session;
mod sink;
mod sources;
mod window;

pub use calibration::{template_square, Calibration, PointSelection, ReferenceSelection, StaticCalibration};
pub use engine::{Engine, FrameOutcome, Measurement};
pub use error::TrackError;
pub use geometry::{
    bending_angle_from_cosine, chord_angle, chord_normal, predicted_midpoint, sagitta,
    solve_bending, BendingState, CosineClamp,
};
pub use io::{TrackConfig, TrackReport};
pub use params::TrackerParams;
pub use policy::{
    Decision, FailureCause, FailureContext, FailurePolicy, FailureResolver, FixedDecision,
    PointKind, PointOutcome,
};
pub use pose::{
    FrameAbort, Interrupt, LocateRequest, PointFix, PointLocator, PoseRefinement, PoseStatus,
    PoseTracker, TrackerState,
};
pub use reference::{HolderTemplate, PointTemplate, ReferenceSet};
pub use result::{FrameResult, FrameStatus, MatchScores};
pub use search::WindowSet;
pub use session::{ControlSignal, SessionHandle, SessionSummary, StopReason, TrackingSession};
pub use sink::{ResultSink, SharedResults};
pub use sources::{
    ConstantStep, FrameClock, FrameProvider, FrameRate, MemoryFrames, SourceFrame, TimeSource,
    Timestamps,
};
#[cfg(feature = "image")]
pub use sources::{frame_from_dynamic, DirectoryFrames, FolderMonitor};
pub use window::{BoundaryHits, Escalation, SearchWindow, SearchWindowController};

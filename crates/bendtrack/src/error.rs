use bendtrack_core::{BitDepth, ImageError};
use bendtrack_match::MatchError;

use crate::PointKind;

/// Errors returned by the tracker.
#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    #[error("no acceptable match for the {point} point")]
    MatchNotFound { point: PointKind },
    #[error("search window of the {point} point cannot grow any further")]
    BoundaryExhausted { point: PointKind },
    #[error("{point} point at ({x:.1}, {y:.1}) is within {margin} px of the image edge")]
    PointTooCloseToEdge {
        point: PointKind,
        x: f64,
        y: f64,
        margin: usize,
    },
    #[error(
        "frame {index} is {width}x{height} {depth:?}, reference is {ref_width}x{ref_height} {ref_depth:?}"
    )]
    FrameMismatch {
        index: usize,
        width: usize,
        height: usize,
        depth: BitDepth,
        ref_width: usize,
        ref_height: usize,
        ref_depth: BitDepth,
    },
    #[error("invalid calibration: {0}")]
    Calibration(String),
    #[error("frame source delivered no frames")]
    NoFrames,
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "image")]
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: std::path::PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("tracking worker panicked")]
    WorkerPanicked,
}

impl TrackError {
    /// A single frame could not be read; the sequence itself is intact.
    pub fn is_unreadable_frame(&self) -> bool {
        match self {
            #[cfg(feature = "image")]
            TrackError::Decode { .. } => true,
            _ => false,
        }
    }
}

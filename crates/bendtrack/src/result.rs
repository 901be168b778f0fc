use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    /// Calibration frame; time 0 and no deformation by construction.
    Reference,
    Measured,
    /// The failure policy skipped the frame; values repeat the last
    /// committed measurement.
    Skipped,
}

/// Final match scores of one frame, `None` when the point was not matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchScores {
    pub holder: Option<f64>,
    pub free: Option<f64>,
    pub mid: Option<f64>,
}

/// One row of the measurement series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub index: usize,
    /// File name or other label supplied by the frame source.
    pub label: Option<String>,
    /// Seconds since the reference frame.
    pub time: f64,
    pub status: FrameStatus,
    pub bending_angle: f64,
    pub deflection_angle: f64,
    pub arc_length: f64,
    pub curvature: f64,
    pub deformation: f64,
    pub chord_length: f64,
    pub free: Point2<f64>,
    pub attached: Point2<f64>,
    pub mid: Point2<f64>,
    pub match_scores: MatchScores,
    pub converged: bool,
    pub iterations: usize,
}

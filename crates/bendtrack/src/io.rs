//! JSON configuration and report helpers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{FrameResult, PointSelection, SessionSummary, StaticCalibration, TrackError, TrackerParams};

/// Configuration of a tracking run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackConfig {
    pub frames_dir: String,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub params: TrackerParams,
    pub selection: PointSelection,
}

impl TrackConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TrackError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TrackError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("bendtrack_report.json"))
    }

    /// Calibration replaying the configured selection.
    pub fn build_calibration(&self) -> StaticCalibration {
        StaticCalibration::new(
            self.selection.clone(),
            self.params.template_size,
            self.params.search_radius,
        )
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackReport {
    #[serde(default)]
    pub config_path: Option<String>,
    pub summary: SessionSummary,
    pub frames: Vec<FrameResult>,
}

impl TrackReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TrackError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TrackError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

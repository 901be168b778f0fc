use bendtrack_match::{MatchMetric, MatchQualityThresholds, MatcherParams};
use serde::{Deserialize, Serialize};

/// Tracker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    pub metric: MatchMetric,
    /// Nominal side of the free-end and midpoint template squares, in px.
    /// Shrunk automatically for points close to the image edge.
    pub template_size: usize,
    /// Initial search margin around each template, in px. `0` searches the
    /// whole frame every time.
    pub search_radius: usize,
    pub subpixel: bool,
    /// Match RGB frames on their intensity instead of per channel.
    pub match_intensity: bool,
    /// Gaussian pre-blur of templates and search crops; `0` disables it.
    pub blur_sigma: f64,
    /// Cap on the rotate-and-rematch iterations per frame.
    pub max_iterations: usize,
    /// Free-end displacement change (px, per axis) that ends the iteration.
    pub convergence_tol: f64,
    /// Fraction cut from every side of a rotated template before matching.
    pub template_inset: f64,
    pub thresholds: MatchQualityThresholds,
    /// Seconds between frames when no timestamp is available.
    pub time_step: f64,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            metric: MatchMetric::CCoeffNormed,
            template_size: 300,
            search_radius: 20,
            subpixel: true,
            match_intensity: true,
            blur_sigma: 2.0,
            max_iterations: 10,
            convergence_tol: 1e-5,
            template_inset: 0.15,
            thresholds: MatchQualityThresholds::default(),
            time_step: 1.0,
        }
    }
}

impl TrackerParams {
    pub fn matcher_params(&self) -> MatcherParams {
        MatcherParams {
            metric: self.metric,
            subpixel: self.subpixel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let params: TrackerParams =
            serde_json::from_str(r#"{ "search_radius": 8, "thresholds": { "ccoeff_normed": 0.3 } }"#)
                .unwrap();
        assert_eq!(params.search_radius, 8);
        assert_eq!(params.template_size, 300);
        assert_eq!(params.thresholds.ccoeff_normed, 0.3);
        assert_eq!(params.thresholds.sqdiff, 0.1);
        assert_eq!(params.matcher_params().metric, MatchMetric::CCoeffNormed);
    }
}

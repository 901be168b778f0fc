//! Match-quality gate.
//!
//! A match is judged against the template's self-match ("ideal") score.
//! The deviation measure is metric specific: a ratio for `SqDiff`, the raw
//! score for `SqDiffNormed`, a relative difference for `CCorr`/`CCoeff`
//! and an absolute difference for the normalised correlations.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::MatchMetric;

/// Relative margin (of template size and of search width) in which a match
/// counts as touching the search-window edge.
const EDGE_MARGIN_FRAC: f64 = 0.05;

/// Factor applied to the observed deviation when a poor match is accepted.
const RELAX_FACTOR: f64 = 1.1;

/// Per-metric acceptance thresholds.
///
/// Thresholds only ever change through [`MatchQualityThresholds::relax`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchQualityThresholds {
    pub sqdiff: f64,
    pub sqdiff_normed: f64,
    pub ccorr: f64,
    pub ccorr_normed: f64,
    pub ccoeff: f64,
    pub ccoeff_normed: f64,
}

impl Default for MatchQualityThresholds {
    fn default() -> Self {
        Self {
            sqdiff: 0.1,
            sqdiff_normed: 0.1,
            ccorr: 0.05,
            ccorr_normed: 0.05,
            ccoeff: 0.2,
            ccoeff_normed: 0.2,
        }
    }
}

/// Outcome of the quality gate for a single match.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MatchVerdict {
    Accepted,
    /// The score deviates from the ideal by more than the threshold.
    PoorScore { deviation: f64, threshold: f64 },
    /// The match sits on the rim of its search window.
    AtWindowEdge,
}

impl MatchVerdict {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, MatchVerdict::Accepted)
    }
}

impl MatchQualityThresholds {
    pub fn get(&self, metric: MatchMetric) -> f64 {
        match metric {
            MatchMetric::SqDiff => self.sqdiff,
            MatchMetric::SqDiffNormed => self.sqdiff_normed,
            MatchMetric::CCorr => self.ccorr,
            MatchMetric::CCorrNormed => self.ccorr_normed,
            MatchMetric::CCoeff => self.ccoeff,
            MatchMetric::CCoeffNormed => self.ccoeff_normed,
        }
    }

    fn slot(&mut self, metric: MatchMetric) -> &mut f64 {
        match metric {
            MatchMetric::SqDiff => &mut self.sqdiff,
            MatchMetric::SqDiffNormed => &mut self.sqdiff_normed,
            MatchMetric::CCorr => &mut self.ccorr,
            MatchMetric::CCorrNormed => &mut self.ccorr_normed,
            MatchMetric::CCoeff => &mut self.ccoeff,
            MatchMetric::CCoeffNormed => &mut self.ccoeff_normed,
        }
    }

    /// Deviation of `score` from `ideal` in the metric's own measure.
    ///
    /// Undefined ratios (zero ideal) come back as `+inf` so they never pass.
    pub fn deviation(metric: MatchMetric, score: f64, ideal: f64) -> f64 {
        let d = match metric {
            MatchMetric::SqDiff => score / ideal,
            MatchMetric::SqDiffNormed => score,
            MatchMetric::CCorr => ((score - ideal) / ideal).abs(),
            MatchMetric::CCoeff => (score - ideal).abs() / ideal,
            MatchMetric::CCorrNormed | MatchMetric::CCoeffNormed => (score - ideal).abs(),
        };
        if d.is_nan() {
            f64::INFINITY
        } else {
            d
        }
    }

    /// Score test alone.
    pub fn accepts(&self, metric: MatchMetric, score: f64, ideal: f64) -> bool {
        Self::deviation(metric, score, ideal) <= self.get(metric)
    }

    /// Full gate: score test, then the window-edge test when `edge` is given.
    pub fn assess(
        &self,
        metric: MatchMetric,
        score: f64,
        ideal: f64,
        edge: Option<EdgeCheck>,
    ) -> MatchVerdict {
        let deviation = Self::deviation(metric, score, ideal);
        let threshold = self.get(metric);
        if deviation > threshold {
            return MatchVerdict::PoorScore {
                deviation,
                threshold,
            };
        }
        match edge {
            Some(check) if check.touches_edge() => MatchVerdict::AtWindowEdge,
            _ => MatchVerdict::Accepted,
        }
    }

    /// Loosen the metric's threshold to `1.1x` the observed deviation so that
    /// similarly weak matches pass from now on. Returns the new threshold.
    ///
    /// A non-finite deviation (zero-variance ideal) leaves the threshold
    /// unchanged and returns `None`; it would otherwise disable the gate.
    pub fn relax(&mut self, metric: MatchMetric, score: f64, ideal: f64) -> Option<f64> {
        let deviation = Self::deviation(metric, score, ideal);
        if !deviation.is_finite() {
            log::warn!("not relaxing {metric:?} threshold: deviation {deviation}");
            return None;
        }
        let relaxed = RELAX_FACTOR * deviation;
        let slot = self.slot(metric);
        log::info!("relaxing {metric:?} threshold {:.4} -> {relaxed:.4}", *slot);
        *slot = relaxed;
        Some(relaxed)
    }
}

/// Inputs of the window-edge test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeCheck {
    /// Match position in surface coordinates.
    pub position: Point2<f64>,
    pub surface_width: usize,
    pub surface_height: usize,
    /// Shorter side of the template.
    pub template_size: usize,
    /// Search radius; `0` disables the test.
    pub radius: usize,
}

impl EdgeCheck {
    pub fn touches_edge(&self) -> bool {
        touches_window_edge(
            self.position,
            self.surface_width,
            self.surface_height,
            self.template_size,
            self.radius,
        )
    }
}

/// True when `position` lies within `min(5% template, 5% search width)` of
/// the surface rim, the search width being `2 * radius`.
///
/// A whole-frame search (`radius == 0`) never touches an edge.
pub fn touches_window_edge(
    position: Point2<f64>,
    surface_width: usize,
    surface_height: usize,
    template_size: usize,
    radius: usize,
) -> bool {
    if radius == 0 {
        return false;
    }
    let margin = (EDGE_MARGIN_FRAC * template_size as f64)
        .min(EDGE_MARGIN_FRAC * (2 * radius) as f64);
    let max_x = surface_width.saturating_sub(1) as f64;
    let max_y = surface_height.saturating_sub(1) as f64;
    position.x < margin
        || position.y < margin
        || position.x > max_x - margin
        || position.y > max_y - margin
}

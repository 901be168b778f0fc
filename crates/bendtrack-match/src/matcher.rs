use bendtrack_core::Patch;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    compute_surface, find_extremum, refine_subpixel, CorrelationSurface, DirectionLine,
    MatchError, MatchMetric,
};

/// Matcher configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherParams {
    pub metric: MatchMetric,
    /// Refine the integer extremum with a local quadratic fit.
    pub subpixel: bool,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            metric: MatchMetric::CCoeffNormed,
            subpixel: true,
        }
    }
}

/// Best placement of a template inside a source patch.
///
/// `x`/`y` are the template's top-left corner in source coordinates, with
/// the sub-pixel offset applied when enabled. `score` is the surface value
/// at the integer extremum.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub x: f64,
    pub y: f64,
    pub score: f64,
}

impl MatchResult {
    #[inline]
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// Stateless template matcher.
#[derive(Clone, Debug, Default)]
pub struct TemplateMatcher {
    params: MatcherParams,
}

impl TemplateMatcher {
    pub fn new(params: MatcherParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &MatcherParams {
        &self.params
    }

    #[inline]
    pub fn metric(&self) -> MatchMetric {
        self.params.metric
    }

    /// Correlation surface under the configured metric.
    pub fn surface(&self, source: &Patch, template: &Patch) -> Result<CorrelationSurface, MatchError> {
        compute_surface(source, template, self.params.metric)
    }

    /// Locate `template` in `source`, optionally only along `line`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(src_w = source.width(), src_h = source.height(), tpl_w = template.width()))
    )]
    pub fn match_template(
        &self,
        source: &Patch,
        template: &Patch,
        line: Option<&DirectionLine>,
    ) -> Result<MatchResult, MatchError> {
        let surface = self.surface(source, template)?;
        let polarity = self.params.metric.polarity();
        let (x, y) = find_extremum(&surface, polarity, line).ok_or(MatchError::NoExtremum)?;
        let score = surface.at(x, y);
        let offset = if self.params.subpixel {
            refine_subpixel(&surface, x, y, line)
        } else {
            Vector2::zeros()
        };
        Ok(MatchResult {
            x: x as f64 + offset.x,
            y: y as f64 + offset.y,
            score,
        })
    }

    /// Self-match score of a template: the best score it could ever reach.
    ///
    /// Uses [`MatchMetric::baseline_metric`], so `SqDiff` reports `sum T^2`.
    pub fn ideal_score(&self, template: &Patch) -> Result<f64, MatchError> {
        let surface = compute_surface(template, template, self.params.metric.baseline_metric())?;
        Ok(surface.at(0, 0))
    }
}

//! What happens when a tracked point cannot be matched well enough.
//!
//! The tracker never decides on its own: it hands a [`FailureContext`] to a
//! caller-supplied [`FailureResolver`] and turns the returned [`Decision`]
//! into a [`PointOutcome`].

use std::fmt;

use bendtrack_core::PixelRect;
use bendtrack_match::{MatchMetric, MatchQualityThresholds};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::TrackError;

/// The three tracked features.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// Holder region; the attached end moves with it.
    Holder,
    Free,
    Mid,
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PointKind::Holder => "holder",
            PointKind::Free => "free-end",
            PointKind::Mid => "mid",
        })
    }
}

/// Why a search gave up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Whole-frame search found nothing acceptable.
    MatchNotFound,
    /// Escalation reached every image side without an acceptable match.
    BoundaryExhausted,
}

/// Everything a resolver may want to show or log about a failed point.
#[derive(Clone, Debug, PartialEq)]
pub struct FailureContext {
    pub frame_index: usize,
    pub point: PointKind,
    pub cause: FailureCause,
    pub metric: MatchMetric,
    pub score: f64,
    pub ideal: f64,
    pub deviation: f64,
    pub threshold: f64,
    /// Best (rejected) location of the tracked point in the frame.
    pub position: Point2<f64>,
    /// Last search window tried.
    pub window: PixelRect,
}

impl FailureContext {
    pub fn error(&self) -> TrackError {
        match self.cause {
            FailureCause::MatchNotFound => TrackError::MatchNotFound { point: self.point },
            FailureCause::BoundaryExhausted => TrackError::BoundaryExhausted { point: self.point },
        }
    }
}

/// Operator answer to a failed match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Use the poor match anyway and loosen the metric's threshold.
    Accept,
    /// Drop this frame and keep the previous displacements.
    Skip,
    Stop,
    /// Select the reference points again.
    Reselect,
}

/// Per-point result after the quality gate and, if needed, the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointOutcome {
    Accepted,
    AcceptedWithThresholdRelax,
    SkipFrame,
    StopTracking,
    Reselect,
}

/// Synchronous callback consulted on every unresolved match.
pub trait FailureResolver: Send {
    fn resolve_failure(&mut self, point: PointKind, context: &FailureContext) -> Decision;
}

impl<F> FailureResolver for F
where
    F: FnMut(PointKind, &FailureContext) -> Decision + Send,
{
    fn resolve_failure(&mut self, point: PointKind, context: &FailureContext) -> Decision {
        self(point, context)
    }
}

/// Resolver that always gives the same answer; the non-interactive default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedDecision(pub Decision);

impl FailureResolver for FixedDecision {
    fn resolve_failure(&mut self, _point: PointKind, _context: &FailureContext) -> Decision {
        self.0
    }
}

/// Owns the resolver and applies its decisions.
pub struct FailurePolicy {
    resolver: Box<dyn FailureResolver>,
}

impl fmt::Debug for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailurePolicy").finish_non_exhaustive()
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::new(Box::new(FixedDecision(Decision::Skip)))
    }
}

impl FailurePolicy {
    pub fn new(resolver: Box<dyn FailureResolver>) -> Self {
        Self { resolver }
    }

    /// Ask the resolver about `context`; an `Accept` relaxes `thresholds`.
    pub fn resolve(
        &mut self,
        context: &FailureContext,
        thresholds: &mut MatchQualityThresholds,
    ) -> PointOutcome {
        log::warn!(
            "frame {}: {} (score {:.4}, ideal {:.4}, deviation {:.4}, threshold {:.4})",
            context.frame_index,
            context.error(),
            context.score,
            context.ideal,
            context.deviation,
            context.threshold
        );
        let decision = self.resolver.resolve_failure(context.point, context);
        log::info!("frame {}: {} point -> {decision:?}", context.frame_index, context.point);
        match decision {
            // edge rejections leave the score threshold alone
            Decision::Accept if context.deviation > context.threshold => {
                match thresholds.relax(context.metric, context.score, context.ideal) {
                    Some(_) => PointOutcome::AcceptedWithThresholdRelax,
                    None => PointOutcome::Accepted,
                }
            }
            Decision::Accept => PointOutcome::Accepted,
            Decision::Skip => PointOutcome::SkipFrame,
            Decision::Stop => PointOutcome::StopTracking,
            Decision::Reselect => PointOutcome::Reselect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(point: PointKind) -> FailureContext {
        FailureContext {
            frame_index: 3,
            point,
            cause: FailureCause::BoundaryExhausted,
            metric: MatchMetric::CCoeffNormed,
            score: 0.6,
            ideal: 1.0,
            deviation: 0.4,
            threshold: 0.2,
            position: Point2::new(10.0, 12.0),
            window: PixelRect::new(0, 0, 40, 40),
        }
    }

    #[test]
    fn accept_relaxes_only_the_metric_in_use() {
        let mut thresholds = MatchQualityThresholds::default();
        let mut policy = FailurePolicy::new(Box::new(FixedDecision(Decision::Accept)));
        let outcome = policy.resolve(&context(PointKind::Free), &mut thresholds);
        assert_eq!(outcome, PointOutcome::AcceptedWithThresholdRelax);
        assert!((thresholds.ccoeff_normed - 0.44).abs() < 1e-12);
        assert_eq!(thresholds.sqdiff, 0.1);
    }

    #[test]
    fn accepting_an_edge_match_keeps_the_threshold() {
        let mut thresholds = MatchQualityThresholds::default();
        let mut policy = FailurePolicy::new(Box::new(FixedDecision(Decision::Accept)));
        let mut ctx = context(PointKind::Free);
        ctx.deviation = 0.05;
        assert_eq!(policy.resolve(&ctx, &mut thresholds), PointOutcome::Accepted);
        assert_eq!(thresholds, MatchQualityThresholds::default());
    }

    #[test]
    fn accepting_a_flat_template_keeps_the_gate() {
        let mut thresholds = MatchQualityThresholds::default();
        let mut policy = FailurePolicy::new(Box::new(FixedDecision(Decision::Accept)));
        let mut ctx = context(PointKind::Mid);
        ctx.metric = MatchMetric::CCoeff;
        ctx.score = 0.0;
        ctx.ideal = 0.0;
        ctx.deviation = f64::INFINITY;
        assert_eq!(policy.resolve(&ctx, &mut thresholds), PointOutcome::Accepted);
        assert_eq!(thresholds, MatchQualityThresholds::default());
    }

    #[test]
    fn closures_resolve_per_point() {
        let mut seen = Vec::new();
        let mut thresholds = MatchQualityThresholds::default();
        {
            let resolver = |point: PointKind, _: &FailureContext| {
                if point == PointKind::Holder {
                    Decision::Stop
                } else {
                    Decision::Reselect
                }
            };
            let mut policy = FailurePolicy::new(Box::new(resolver));
            seen.push(policy.resolve(&context(PointKind::Holder), &mut thresholds));
            seen.push(policy.resolve(&context(PointKind::Mid), &mut thresholds));
        }
        assert_eq!(seen, vec![PointOutcome::StopTracking, PointOutcome::Reselect]);
        assert_eq!(thresholds, MatchQualityThresholds::default());
    }

    #[test]
    fn context_maps_to_error_taxonomy() {
        let mut ctx = context(PointKind::Mid);
        assert!(matches!(ctx.error(), TrackError::BoundaryExhausted { point: PointKind::Mid }));
        ctx.cause = FailureCause::MatchNotFound;
        assert_eq!(ctx.error().to_string(), "no acceptable match for the mid point");
    }
}

//! Matching of one tracked point inside one frame: crop, blur, match, gate,
//! escalate and, when all that fails, ask the failure policy.

use bendtrack_core::{gaussian_blur, Patch};
use bendtrack_match::{
    DirectionLine, EdgeCheck, MatchQualityThresholds, MatchVerdict, TemplateMatcher,
};
use nalgebra::{Point2, Vector2};

use crate::pose::{FrameAbort, Interrupt, LocateRequest, PointFix, PointLocator};
use crate::{
    FailureCause, FailureContext, FailurePolicy, PointKind, PointOutcome, ReferenceSet,
    SearchWindow, SearchWindowController, TrackError,
};

/// Window controllers of the three tracked points.
#[derive(Clone, Debug)]
pub struct WindowSet {
    pub holder: SearchWindowController,
    pub free: SearchWindowController,
    pub mid: SearchWindowController,
}

impl WindowSet {
    pub fn new(refs: &ReferenceSet, radius: usize) -> Self {
        let (w, h) = (refs.width(), refs.height());
        Self {
            holder: SearchWindowController::new(refs.holder.rect, w, h, radius),
            free: SearchWindowController::new(refs.free.match_rect, w, h, radius),
            mid: SearchWindowController::new(refs.mid.match_rect, w, h, radius),
        }
    }
}

/// One match inside one window.
#[derive(Clone, Copy, Debug)]
struct Attempt {
    /// Template top-left corner in image coordinates.
    top_left: Point2<f64>,
    score: f64,
    verdict: MatchVerdict,
}

/// Searches inside a single frame; borrows the engine's state for the
/// duration of that frame.
pub(crate) struct FrameSearch<'a> {
    pub frame_index: usize,
    pub patch: &'a Patch,
    pub refs: &'a ReferenceSet,
    pub windows: &'a WindowSet,
    pub matcher: &'a TemplateMatcher,
    pub blur_sigma: f64,
    pub thresholds: &'a mut MatchQualityThresholds,
    pub policy: &'a mut FailurePolicy,
}

impl FrameSearch<'_> {
    fn attempt(
        &self,
        window: &SearchWindow,
        template: &Patch,
        ideal: f64,
        line: Option<(Point2<f64>, Vector2<f64>)>,
    ) -> Result<Attempt, TrackError> {
        let crop = gaussian_blur(&self.patch.crop(&window.rect)?, self.blur_sigma);
        let line = line.map(|(p, dir)| DirectionLine::new(p - window.origin(), dir));
        let found = self.matcher.match_template(&crop, template, line.as_ref())?;
        let edge = EdgeCheck {
            position: found.position(),
            surface_width: crop.width() - template.width() + 1,
            surface_height: crop.height() - template.height() + 1,
            template_size: template.width().min(template.height()),
            radius: window.radius,
        };
        let verdict = self
            .thresholds
            .assess(self.matcher.metric(), found.score, ideal, Some(edge));
        Ok(Attempt {
            top_left: found.position() + window.origin(),
            score: found.score,
            verdict,
        })
    }

    /// Locate the holder: local window first, then the whole frame.
    pub fn locate_holder(&mut self, displacement: Vector2<f64>) -> Result<PointFix, Interrupt> {
        let (refs, windows) = (self.refs, self.windows);
        let controller = &windows.holder;
        let template = &refs.holder.patch;
        let ideal = refs.holder.ideal;
        let origin = Point2::from(refs.holder.rect.origin());

        let local = controller.window(displacement, controller.base_radius());
        let mut window = local;
        let mut attempt = self.attempt(&window, template, ideal, None)?;
        let mut escalations = 0;
        if !attempt.verdict.is_accepted() && !local.is_full_frame() {
            log::debug!("holder lost locally, searching the whole frame");
            window = controller.window(displacement, 0);
            attempt = self.attempt(&window, template, ideal, None)?;
            escalations = 1;
        }

        let fix = PointFix {
            displacement: attempt.top_left - origin,
            score: attempt.score,
            escalations,
        };
        if attempt.verdict.is_accepted() {
            if escalations > 0 {
                log::info!(
                    "holder relocated by ({:.1}, {:.1})",
                    fix.displacement.x - displacement.x,
                    fix.displacement.y - displacement.y
                );
            }
            return Ok(fix);
        }
        let position = refs.selection.attached + fix.displacement;
        self.consult(
            PointKind::Holder,
            FailureCause::MatchNotFound,
            &attempt,
            ideal,
            &window,
            position,
        )?;
        Ok(fix)
    }

    /// Hand a rejected match to the failure policy. `Ok` means the operator
    /// accepted it.
    fn consult(
        &mut self,
        point: PointKind,
        cause: FailureCause,
        attempt: &Attempt,
        ideal: f64,
        window: &SearchWindow,
        position: Point2<f64>,
    ) -> Result<(), Interrupt> {
        let metric = self.matcher.metric();
        let (deviation, threshold) = match attempt.verdict {
            MatchVerdict::PoorScore {
                deviation,
                threshold,
            } => (deviation, threshold),
            _ => (
                MatchQualityThresholds::deviation(metric, attempt.score, ideal),
                self.thresholds.get(metric),
            ),
        };
        let context = FailureContext {
            frame_index: self.frame_index,
            point,
            cause,
            metric,
            score: attempt.score,
            ideal,
            deviation,
            threshold,
            position,
            window: window.rect,
        };
        match self.policy.resolve(&context, self.thresholds) {
            PointOutcome::Accepted | PointOutcome::AcceptedWithThresholdRelax => Ok(()),
            PointOutcome::SkipFrame => Err(Interrupt::Abort(FrameAbort::Skip(point))),
            PointOutcome::StopTracking => Err(Interrupt::Abort(FrameAbort::Stop(point))),
            PointOutcome::Reselect => Err(Interrupt::Abort(FrameAbort::Reselect(point))),
        }
    }
}

impl PointLocator for FrameSearch<'_> {
    fn locate(&mut self, request: &LocateRequest) -> Result<PointFix, Interrupt> {
        let (refs, windows) = (self.refs, self.windows);
        let Some(reference) = refs.point(request.point) else {
            return self.locate_holder(request.displacement);
        };
        let controller = match request.point {
            PointKind::Mid => &windows.mid,
            _ => &windows.free,
        };
        let template = reference.matching_template(request.angle)?;
        let ideal = self.matcher.ideal_score(&template).map_err(TrackError::from)?;

        let outcome = controller.escalate(request.first, request.displacement, |window| {
            let attempt = self.attempt(window, &template, ideal, request.line)?;
            let accepted = attempt.verdict.is_accepted();
            Ok::<_, TrackError>((attempt, accepted))
        })?;

        let attempt = outcome.value;
        let fix = PointFix {
            displacement: reference.displacement(attempt.top_left, request.angle),
            score: attempt.score,
            escalations: outcome.steps,
        };
        if outcome.accepted {
            return Ok(fix);
        }
        let cause = if outcome.window.is_full_frame() {
            FailureCause::MatchNotFound
        } else {
            FailureCause::BoundaryExhausted
        };
        let position = reference.position + fix.displacement;
        self.consult(request.point, cause, &attempt, ideal, &outcome.window, position)?;
        Ok(fix)
    }
}

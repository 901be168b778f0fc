//! Per-frame registration: holder search, pose refinement, commit.

use bendtrack_core::{Frame, FrameLogScope};
use bendtrack_match::{MatchQualityThresholds, TemplateMatcher};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::pose::{FrameAbort, Interrupt, PoseTracker, TrackerState};
use crate::search::{FrameSearch, WindowSet};
use crate::{
    solve_bending, FailurePolicy, FrameResult, FrameStatus, MatchScores, PointKind,
    ReferenceSelection, ReferenceSet, TrackError, TrackerParams,
};

/// A committed frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub state: TrackerState,
    pub scores: MatchScores,
    pub converged: bool,
    pub iterations: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FrameOutcome {
    Measured(Measurement),
    /// Displacements were left at their previous values.
    Skipped { point: PointKind },
    Stopped { point: PointKind },
    /// Calibration must run again on this frame.
    Reselect { point: PointKind },
    /// Size or bit depth differs from the reference; not processed.
    Dropped,
}

/// Sequential tracking engine. Owns all mutable tracking state.
#[derive(Debug)]
pub struct Engine {
    params: TrackerParams,
    matcher: TemplateMatcher,
    thresholds: MatchQualityThresholds,
    policy: FailurePolicy,
    refs: ReferenceSet,
    windows: WindowSet,
    pose: PoseTracker,
    state: TrackerState,
}

impl Engine {
    /// Calibrate on `reference` with `selection`.
    pub fn new(
        params: TrackerParams,
        reference: &Frame,
        selection: &ReferenceSelection,
        policy: FailurePolicy,
    ) -> Result<Self, TrackError> {
        let matcher = TemplateMatcher::new(params.matcher_params());
        let refs = ReferenceSet::build(reference, selection, &params, &matcher, None)?;
        let windows = WindowSet::new(&refs, params.search_radius);
        Ok(Self {
            thresholds: params.thresholds.clone(),
            pose: PoseTracker::new(params.max_iterations, params.convergence_tol),
            state: TrackerState::at_reference(&refs),
            params,
            matcher,
            policy,
            refs,
            windows,
        })
    }

    #[inline]
    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    /// Current thresholds, including any relaxation.
    #[inline]
    pub fn thresholds(&self) -> &MatchQualityThresholds {
        &self.thresholds
    }

    #[inline]
    pub fn reference(&self) -> &ReferenceSet {
        &self.refs
    }

    /// Last committed state.
    #[inline]
    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// Restart from `frame` with a new selection.
    ///
    /// The initial length is chosen so that the new reference reports the
    /// last committed deformation, keeping the series continuous.
    pub fn recalibrate(
        &mut self,
        frame: &Frame,
        selection: &ReferenceSelection,
    ) -> Result<(), TrackError> {
        let last = self.state.bending.deformation;
        let arc = solve_bending(selection.free, selection.attached, selection.mid, None).arc_length;
        let initial_length = if 1.0 + last > 0.0 {
            arc / (1.0 + last)
        } else {
            arc
        };
        let refs = ReferenceSet::build(frame, selection, &self.params, &self.matcher, Some(initial_length))?;
        log::info!(
            "recalibrated: arc {arc:.2}px, initial length {initial_length:.2}px, deformation {:.5}",
            refs.initial.deformation
        );
        self.windows = WindowSet::new(&refs, self.params.search_radius);
        self.state = TrackerState::at_reference(&refs);
        self.refs = refs;
        Ok(())
    }

    /// Track one frame. Only a `Measured` outcome changes the committed
    /// state.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, frame), fields(w = frame.width(), h = frame.height())))]
    pub fn process_frame(&mut self, index: usize, frame: &Frame) -> Result<FrameOutcome, TrackError> {
        let _frame_tag = FrameLogScope::enter(index);
        if let Err(e) = self.refs.check_layout(index, frame) {
            log::warn!("dropping frame: {e}");
            return Ok(FrameOutcome::Dropped);
        }
        let patch = frame.to_patch(self.params.match_intensity);
        let mut search = FrameSearch {
            frame_index: index,
            patch: &patch,
            refs: &self.refs,
            windows: &self.windows,
            matcher: &self.matcher,
            blur_sigma: self.params.blur_sigma,
            thresholds: &mut self.thresholds,
            policy: &mut self.policy,
        };

        let mut guess = self.state;
        let holder = match search.locate_holder(self.state.holder) {
            Ok(fix) => fix,
            Err(interrupt) => return abort(interrupt),
        };
        guess.holder = holder.displacement;
        if holder.escalations > 0 {
            // carry the holder jump over to the other points' starting guesses
            let jump = (holder.displacement - self.state.holder).map(f64::round);
            guess.free += jump;
            guess.mid += jump;
        }

        let refined = match self.pose.refine(
            &mut search,
            &self.refs,
            &self.windows.free,
            &self.windows.mid,
            guess,
        ) {
            Ok(refined) => refined,
            Err(interrupt) => return abort(interrupt),
        };

        self.state = refined.state;
        let b = &refined.state.bending;
        log::info!(
            "bend {:.5}rad, curvature {:.6}/px, deformation {:.5}{}",
            b.bending_angle,
            b.curvature,
            b.deformation,
            if refined.converged { "" } else { " (not converged)" }
        );
        Ok(FrameOutcome::Measured(Measurement {
            state: refined.state,
            scores: MatchScores {
                holder: Some(holder.score),
                free: Some(refined.free_score),
                mid: Some(refined.mid_score),
            },
            converged: refined.converged,
            iterations: refined.iterations,
        }))
    }

    /// Row describing the committed state.
    pub fn result_row(
        &self,
        index: usize,
        label: Option<String>,
        time: f64,
        status: FrameStatus,
        measurement: Option<&Measurement>,
    ) -> FrameResult {
        let b = &self.state.bending;
        FrameResult {
            index,
            label,
            time,
            status,
            bending_angle: b.bending_angle,
            deflection_angle: b.deflection_angle,
            arc_length: b.arc_length,
            curvature: b.curvature,
            deformation: b.deformation,
            chord_length: b.chord_length,
            free: self.state.free_position(&self.refs),
            attached: self.state.attached_position(&self.refs),
            mid: self.state.mid_position(&self.refs),
            match_scores: measurement.map(|m| m.scores).unwrap_or_default(),
            converged: measurement.is_none_or(|m| m.converged),
            iterations: measurement.map_or(0, |m| m.iterations),
        }
    }

    /// Samples of the committed arc from the attached to the free end.
    pub fn centerline(&self, samples: usize) -> Vec<nalgebra::Point2<f64>> {
        self.state.bending.centerline(
            self.state.attached_position(&self.refs),
            self.state.free_position(&self.refs),
            samples,
        )
    }
}

fn abort(interrupt: Interrupt) -> Result<FrameOutcome, TrackError> {
    match interrupt {
        Interrupt::Abort(FrameAbort::Skip(point)) => Ok(FrameOutcome::Skipped { point }),
        Interrupt::Abort(FrameAbort::Stop(point)) => Ok(FrameOutcome::Stopped { point }),
        Interrupt::Abort(FrameAbort::Reselect(point)) => Ok(FrameOutcome::Reselect { point }),
        Interrupt::Fault(e) => Err(e),
    }
}

//! Rotate-and-rematch refinement of the free end and the midpoint.
//!
//! The two searches are coupled through the geometry: every iteration
//! re-solves the arc, which sets the next template rotation and the next
//! midpoint anchor.

use nalgebra::{Point2, Vector2};

use crate::{
    chord_angle, chord_normal, predicted_midpoint, solve_bending, BendingState, PointKind,
    ReferenceSet, SearchWindow, SearchWindowController, TrackError,
};

/// Displacements of the tracked points relative to the reference frame,
/// plus the geometry they produce. Committed once per accepted frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerState {
    pub holder: Vector2<f64>,
    pub free: Vector2<f64>,
    pub mid: Vector2<f64>,
    pub bending: BendingState,
}

impl TrackerState {
    /// State right after calibration: nothing has moved.
    pub fn at_reference(refs: &ReferenceSet) -> Self {
        Self {
            holder: Vector2::zeros(),
            free: Vector2::zeros(),
            mid: Vector2::zeros(),
            bending: refs.initial,
        }
    }

    pub fn free_position(&self, refs: &ReferenceSet) -> Point2<f64> {
        refs.selection.free + self.free
    }

    /// The attached end moves with the holder.
    pub fn attached_position(&self, refs: &ReferenceSet) -> Point2<f64> {
        refs.selection.attached + self.holder
    }

    pub fn mid_position(&self, refs: &ReferenceSet) -> Point2<f64> {
        refs.selection.mid + self.mid
    }

    /// Re-solve the arc from the current displacements.
    pub fn resolve_geometry(&mut self, refs: &ReferenceSet) {
        self.bending = solve_bending(
            self.free_position(refs),
            self.attached_position(refs),
            self.mid_position(refs),
            Some(refs.initial.initial_length),
        );
    }
}

/// One point search handed to a [`PointLocator`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocateRequest {
    pub point: PointKind,
    pub first: SearchWindow,
    /// Displacement escalated windows are centred on.
    pub displacement: Vector2<f64>,
    /// Template rotation, clockwise on screen.
    pub angle: f64,
    /// Constrain the extremum to a line through this image point.
    pub line: Option<(Point2<f64>, Vector2<f64>)>,
}

/// Accepted (or operator-accepted) location of a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointFix {
    pub displacement: Vector2<f64>,
    pub score: f64,
    /// Number of radius doublings, or `1` for a whole-frame fallback.
    pub escalations: usize,
}

/// Why a frame stopped before producing a measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameAbort {
    Skip(PointKind),
    Stop(PointKind),
    Reselect(PointKind),
}

#[derive(Debug)]
pub enum Interrupt {
    /// The failure policy ended the frame.
    Abort(FrameAbort),
    Fault(TrackError),
}

impl From<TrackError> for Interrupt {
    fn from(e: TrackError) -> Self {
        Interrupt::Fault(e)
    }
}

/// Performs the searches the pose loop asks for.
pub trait PointLocator {
    fn locate(&mut self, request: &LocateRequest) -> Result<PointFix, Interrupt>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoseStatus {
    #[default]
    Searching,
    Escalating,
    Converged,
    /// The iteration cap was reached; the last estimate is still committed.
    NotConverged,
    Failed,
}

/// Outcome of [`PoseTracker::refine`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseRefinement {
    pub state: TrackerState,
    pub converged: bool,
    pub iterations: usize,
    pub free_score: f64,
    pub mid_score: f64,
}

/// Fixed-point iteration over the free-end and midpoint matches.
#[derive(Clone, Debug)]
pub struct PoseTracker {
    max_iterations: usize,
    tolerance: f64,
    status: PoseStatus,
}

impl PoseTracker {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            tolerance,
            status: PoseStatus::default(),
        }
    }

    #[inline]
    pub fn status(&self) -> PoseStatus {
        self.status
    }

    /// Iterate from `state` (holder already located) until the free-end
    /// displacement moves less than the tolerance on both axes between two
    /// iterations, or the iteration cap is reached.
    pub fn refine<L: PointLocator>(
        &mut self,
        locator: &mut L,
        refs: &ReferenceSet,
        free_windows: &SearchWindowController,
        mid_windows: &SearchWindowController,
        mut state: TrackerState,
    ) -> Result<PoseRefinement, Interrupt> {
        self.status = PoseStatus::Searching;
        let radius = free_windows.base_radius();
        let mut previous_free: Option<Vector2<f64>> = None;
        let mut converged = false;
        let mut iterations = 0;
        let (mut free_score, mut mid_score) = (f64::NAN, f64::NAN);

        while iterations < self.max_iterations {
            iterations += 1;

            let request = LocateRequest {
                point: PointKind::Free,
                first: free_windows.window(state.free, radius),
                displacement: state.free,
                angle: -(state.bending.bisector_angle() - refs.initial_angle),
                line: None,
            };
            let fix = self.locate(locator, &request)?;
            state.free = fix.displacement;
            free_score = fix.score;

            let free = state.free_position(refs);
            let attached = state.attached_position(refs);
            let predicted = predicted_midpoint(
                free,
                attached,
                state.bending.curvature,
                state.bending.arc_length,
            );
            let angle = -(chord_angle(free - attached) - refs.initial.full_angle);
            let top_left = refs.mid.top_left_for(predicted, angle);
            let anchor = Point2::new(top_left.x.floor() as i32, top_left.y.floor() as i32);
            let request = LocateRequest {
                point: PointKind::Mid,
                first: mid_windows.window_at(anchor, radius),
                displacement: state.mid,
                angle,
                line: Some((top_left, chord_normal(free - attached))),
            };
            let fix = self.locate(locator, &request)?;
            state.mid = fix.displacement;
            mid_score = fix.score;

            state.resolve_geometry(refs);

            if let Some(prev) = previous_free {
                let delta = state.free - prev;
                if delta.x.abs() < self.tolerance && delta.y.abs() < self.tolerance {
                    converged = true;
                    break;
                }
            }
            previous_free = Some(state.free);
        }

        self.status = if converged {
            PoseStatus::Converged
        } else {
            log::warn!("pose did not converge within {iterations} iterations");
            PoseStatus::NotConverged
        };
        log::debug!(
            "pose {:?} after {iterations} iterations: bend {:.5}rad",
            self.status,
            state.bending.bending_angle
        );
        Ok(PoseRefinement {
            state,
            converged,
            iterations,
            free_score,
            mid_score,
        })
    }

    fn locate<L: PointLocator>(
        &mut self,
        locator: &mut L,
        request: &LocateRequest,
    ) -> Result<PointFix, Interrupt> {
        match locator.locate(request) {
            Ok(fix) => {
                if fix.escalations > 0 {
                    self.status = PoseStatus::Escalating;
                }
                Ok(fix)
            }
            Err(e) => {
                self.status = PoseStatus::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReferenceSelection, TrackerParams};
    use approx::assert_abs_diff_eq;
    use bendtrack_core::{Frame, PixelData, PixelRect};
    use bendtrack_match::TemplateMatcher;

    fn reference() -> ReferenceSet {
        let (w, h) = (160, 120);
        let data = (0..w * h)
            .map(|i| {
                let (x, y) = ((i % w) as f64, (i / w) as f64);
                (128.0 + 60.0 * (x * 0.23).sin() * (y * 0.19).cos()) as u8
            })
            .collect();
        let frame = Frame::new(w, h, PixelData::Gray8(data)).unwrap();
        let selection = ReferenceSelection {
            free: Point2::new(130.0, 60.0),
            attached: Point2::new(30.0, 60.0),
            mid: Point2::new(80.0, 50.0),
            holder_rect: PixelRect::new(10, 40, 20, 40),
            free_rect: PixelRect::new(110, 40, 40, 40),
            mid_rect: PixelRect::new(60, 30, 40, 40),
        };
        let params = TrackerParams::default();
        let matcher = TemplateMatcher::new(params.matcher_params());
        ReferenceSet::build(&frame, &selection, &params, &matcher, None).unwrap()
    }

    fn controllers(refs: &ReferenceSet) -> (SearchWindowController, SearchWindowController) {
        (
            SearchWindowController::new(refs.free.match_rect, 160, 120, 8),
            SearchWindowController::new(refs.mid.match_rect, 160, 120, 8),
        )
    }

    /// Reports fixed displacements and records what was asked.
    struct Scripted {
        free: Vec<Vector2<f64>>,
        mid: Vector2<f64>,
        requests: Vec<LocateRequest>,
    }

    impl PointLocator for Scripted {
        fn locate(&mut self, request: &LocateRequest) -> Result<PointFix, Interrupt> {
            self.requests.push(*request);
            let displacement = match request.point {
                PointKind::Free => {
                    let i = self.requests.iter().filter(|r| r.point == PointKind::Free).count();
                    self.free[(i - 1).min(self.free.len() - 1)]
                }
                _ => self.mid,
            };
            Ok(PointFix {
                displacement,
                score: 0.99,
                escalations: 0,
            })
        }
    }

    #[test]
    fn converges_once_free_end_settles() {
        let refs = reference();
        let (fw, mw) = controllers(&refs);
        let mut locator = Scripted {
            free: vec![Vector2::new(2.0, 1.0), Vector2::new(2.5, 1.0), Vector2::new(2.5, 1.0)],
            mid: Vector2::new(1.0, 0.5),
            requests: Vec::new(),
        };
        let mut pose = PoseTracker::new(10, 1e-5);
        let out = pose
            .refine(&mut locator, &refs, &fw, &mw, TrackerState::at_reference(&refs))
            .unwrap();
        assert!(out.converged);
        assert_eq!(out.iterations, 3);
        assert_eq!(pose.status(), PoseStatus::Converged);
        assert_abs_diff_eq!(out.state.free, Vector2::new(2.5, 1.0));
        assert_abs_diff_eq!(out.state.mid, Vector2::new(1.0, 0.5));
        assert_eq!(out.free_score, 0.99);
        // free, mid per iteration
        assert_eq!(locator.requests.len(), 6);
        assert!(locator.requests[1].line.is_some());
        assert!(locator.requests[0].line.is_none());
    }

    #[test]
    fn midpoint_search_starts_on_the_predicted_arc() {
        let refs = reference();
        let (fw, mw) = controllers(&refs);

        // at rest the sagitta puts the anchor back on the reference midpoint
        let mut locator = Scripted {
            free: vec![Vector2::zeros()],
            mid: Vector2::zeros(),
            requests: Vec::new(),
        };
        let mut pose = PoseTracker::new(10, 1e-5);
        pose.refine(&mut locator, &refs, &fw, &mw, TrackerState::at_reference(&refs))
            .unwrap();
        let (origin, dir) = locator.requests[1].line.unwrap();
        assert_abs_diff_eq!(origin, Point2::from(refs.mid.match_rect.origin()), epsilon = 1e-9);
        assert_abs_diff_eq!(dir.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(dir.y.abs(), 1.0, epsilon = 1e-12);

        // a raised free end drags the anchor along while the midpoint
        // displacement is still zero
        let mut locator = Scripted {
            free: vec![Vector2::new(0.0, -20.0)],
            mid: Vector2::zeros(),
            requests: Vec::new(),
        };
        pose.refine(&mut locator, &refs, &fw, &mw, TrackerState::at_reference(&refs))
            .unwrap();
        let mid = locator.requests[1];
        assert_eq!(mid.point, PointKind::Mid);
        let (free, attached) = (Point2::new(130.0, 40.0), Point2::new(30.0, 60.0));
        let predicted = predicted_midpoint(
            free,
            attached,
            refs.initial.curvature,
            refs.initial.arc_length,
        );
        let angle = -(chord_angle(free - attached) - refs.initial.full_angle);
        assert_abs_diff_eq!(mid.angle, angle, epsilon = 1e-12);
        let top_left = refs.mid.top_left_for(predicted, angle);
        assert_abs_diff_eq!(mid.line.unwrap().0, top_left, epsilon = 1e-9);
        assert_ne!(mid.first.rect, mw.window(Vector2::zeros(), 8).rect);
        assert!(mid.first.rect.y < mw.window(Vector2::zeros(), 8).rect.y);
    }

    #[test]
    fn unchanged_reference_needs_two_iterations() {
        let refs = reference();
        let (fw, mw) = controllers(&refs);
        let mut locator = Scripted {
            free: vec![Vector2::zeros()],
            mid: Vector2::zeros(),
            requests: Vec::new(),
        };
        let mut pose = PoseTracker::new(10, 1e-5);
        let out = pose
            .refine(&mut locator, &refs, &fw, &mw, TrackerState::at_reference(&refs))
            .unwrap();
        assert!(out.converged);
        assert_eq!(out.iterations, 2);
        assert_abs_diff_eq!(out.state.bending.deformation, 0.0, epsilon = 1e-12);
        // no rotation while nothing moved
        assert_abs_diff_eq!(locator.requests[0].angle, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(locator.requests[1].angle, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn iteration_cap_is_respected() {
        let refs = reference();
        let (fw, mw) = controllers(&refs);
        let mut locator = Scripted {
            free: (0..20).map(|i| Vector2::new(i as f64 * 0.1, 0.0)).collect(),
            mid: Vector2::zeros(),
            requests: Vec::new(),
        };
        let mut pose = PoseTracker::new(4, 1e-5);
        let out = pose
            .refine(&mut locator, &refs, &fw, &mw, TrackerState::at_reference(&refs))
            .unwrap();
        assert!(!out.converged);
        assert_eq!(out.iterations, 4);
        assert_eq!(pose.status(), PoseStatus::NotConverged);
    }

    struct Failing;

    impl PointLocator for Failing {
        fn locate(&mut self, request: &LocateRequest) -> Result<PointFix, Interrupt> {
            Err(Interrupt::Abort(FrameAbort::Skip(request.point)))
        }
    }

    #[test]
    fn abort_marks_failure() {
        let refs = reference();
        let (fw, mw) = controllers(&refs);
        let mut pose = PoseTracker::new(10, 1e-5);
        let out = pose.refine(&mut Failing, &refs, &fw, &mw, TrackerState::at_reference(&refs));
        assert!(matches!(out, Err(Interrupt::Abort(FrameAbort::Skip(PointKind::Free)))));
        assert_eq!(pose.status(), PoseStatus::Failed);
    }
}

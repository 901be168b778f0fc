use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use bendtrack::core::{Frame, PixelData, PixelRect};
use bendtrack::{
    ControlSignal, Decision, Engine, FailureCause, FailureContext, FailurePolicy, FixedDecision,
    FrameOutcome,
    FrameProvider, FrameStatus, MemoryFrames, PointKind, PointSelection, SourceFrame,
    StaticCalibration, StopReason, TrackError, TrackerParams, TrackingSession,
};
use crossbeam_channel::{unbounded, Sender};
use nalgebra::{Point2, Vector2};

const W: usize = 200;
const H: usize = 160;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Smooth random texture of Gaussian blobs; pixel `(x, y)` shows the
/// texture at `source(x, y)`.
fn render(source: impl Fn(f64, f64) -> (f64, f64)) -> Frame {
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (seed >> 33) as f64 / (1u64 << 31) as f64
    };
    let blobs: Vec<(f64, f64, f64, f64)> = (0..160)
        .map(|_| {
            (
                next() * (W as f64 + 20.0) - 10.0,
                next() * (H as f64 + 20.0) - 10.0,
                2.5 + 2.5 * next(),
                0.4 + 0.6 * next(),
            )
        })
        .collect();
    let mut data = Vec::with_capacity(W * H);
    for y in 0..H {
        for x in 0..W {
            let (px, py) = source(x as f64, y as f64);
            let v: f64 = blobs
                .iter()
                .map(|&(cx, cy, s, a)| {
                    a * (-((px - cx).powi(2) + (py - cy).powi(2)) / (2.0 * s * s)).exp()
                })
                .sum();
            data.push((30.0 + 200.0 * v).clamp(0.0, 255.0) as u8);
        }
    }
    Frame::new(W, H, PixelData::Gray8(data)).unwrap()
}

/// The texture translated by `shift`.
fn textured(shift: (f64, f64)) -> Frame {
    render(|x, y| (x - shift.0, y - shift.1))
}

/// Everything right of the attached end turned by `theta` about it,
/// counter-clockwise on screen; the holder side stays put.
fn rotated_needle(theta: f64) -> Frame {
    let (ax, ay) = (40.0, 80.0);
    let (s, c) = theta.sin_cos();
    render(|x, y| {
        if x <= ax {
            return (x, y);
        }
        let (dx, dy) = (x - ax, y - ay);
        (ax + c * dx - s * dy, ay + s * dx + c * dy)
    })
}

fn blank() -> Frame {
    Frame::new(W, H, PixelData::Gray8(vec![128; W * H])).unwrap()
}

fn selection() -> PointSelection {
    PointSelection {
        free: Point2::new(160.0, 80.0),
        attached: Point2::new(40.0, 80.0),
        mid: Some(Point2::new(100.0, 70.0)),
        initially_straight: false,
        standard_length: None,
        holder_rect: PixelRect::new(10, 60, 24, 40),
    }
}

fn params(subpixel: bool) -> TrackerParams {
    TrackerParams {
        template_size: 40,
        search_radius: 8,
        subpixel,
        ..TrackerParams::default()
    }
}

fn session(params: TrackerParams, frames: Vec<Frame>) -> TrackingSession {
    let calibration = StaticCalibration::new(selection(), params.template_size, params.search_radius);
    TrackingSession::new(params, Box::new(MemoryFrames::new(frames)), Box::new(calibration))
}

#[test]
fn rigid_shift_is_tracked_exactly() {
    init_logging();
    let frames = vec![textured((0.0, 0.0)), textured((3.0, 2.0)), textured((5.0, 3.0))];
    let (_tx, rx) = unbounded();
    let session = session(params(false), frames);
    let results = session.results();
    let summary = session.run(&rx).unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfFrames);
    assert_eq!(summary.frames_measured, 2);
    let rows = results.snapshot();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].status, FrameStatus::Reference);
    assert_eq!(rows[0].time, 0.0);

    let last = &rows[2];
    assert_eq!(last.status, FrameStatus::Measured);
    assert_eq!(last.time, 2.0);
    assert!(last.converged);
    assert_abs_diff_eq!(last.free, Point2::new(165.0, 83.0), epsilon = 1e-9);
    assert_abs_diff_eq!(last.attached, Point2::new(45.0, 83.0), epsilon = 1e-9);
    assert_abs_diff_eq!(last.mid, Point2::new(105.0, 73.0), epsilon = 1e-9);
    assert_abs_diff_eq!(last.deformation, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(last.bending_angle, rows[0].bending_angle, epsilon = 1e-9);
    assert!(last.match_scores.free.is_some_and(|s| s > 0.9));
}

#[test]
fn rigid_shift_with_subpixel_refinement() {
    let frames = vec![textured((0.0, 0.0)), textured((3.0, 2.0))];
    let (_tx, rx) = unbounded();
    let session = session(params(true), frames);
    let results = session.results();
    session.run(&rx).unwrap();

    let rows = results.snapshot();
    let (first, last) = (&rows[0], &rows[1]);
    let moved = last.free - first.free;
    assert_abs_diff_eq!(moved, Vector2::new(3.0, 2.0), epsilon = 0.5);
    assert!(last.deformation.abs() < 0.01);
}

#[test]
fn blank_frame_is_skipped_and_tracking_resumes() {
    let frames = vec![textured((0.0, 0.0)), blank(), textured((3.0, 2.0))];
    let (_tx, rx) = unbounded();
    let session = session(params(false), frames);
    let results = session.results();
    let summary = session.run(&rx).unwrap();

    assert_eq!(summary.frames_skipped, 1);
    assert_eq!(summary.frames_measured, 1);
    let rows = results.snapshot();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].status, FrameStatus::Skipped);
    assert_eq!(rows[1].time, 1.0);
    assert_eq!(rows[1].free, rows[0].free);
    assert!(rows[1].match_scores.holder.is_none());
    assert_abs_diff_eq!(rows[2].free, Point2::new(163.0, 82.0), epsilon = 1e-9);
}

#[test]
fn stop_decision_ends_the_run() {
    let frames = vec![textured((0.0, 0.0)), blank(), textured((3.0, 2.0))];
    let (_tx, rx) = unbounded();
    let session = session(params(false), frames)
        .with_resolver(Box::new(FixedDecision(Decision::Stop)));
    let results = session.results();
    let summary = session.run(&rx).unwrap();

    assert_eq!(
        summary.stop_reason,
        StopReason::FailurePolicy {
            point: PointKind::Holder
        }
    );
    assert_eq!(results.len(), 1);
}

#[test]
fn accepting_a_weak_match_relaxes_the_threshold() {
    let mut strict = params(false);
    strict.thresholds.ccoeff_normed = 1e-12;
    let asked = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&asked);
    let resolver = move |point: PointKind, _: &FailureContext| {
        log.lock().unwrap().push(point);
        Decision::Accept
    };

    let frames = vec![textured((0.0, 0.0)), textured((3.0, 2.0))];
    let (_tx, rx) = unbounded();
    let session = session(strict, frames).with_resolver(Box::new(resolver));
    let results = session.results();
    let summary = session.run(&rx).unwrap();

    let asked = asked.lock().unwrap();
    assert_eq!(asked.first(), Some(&PointKind::Holder));
    assert!(summary.thresholds.ccoeff_normed > 1e-12);
    assert!(summary.thresholds.ccoeff_normed < 0.2);
    assert_eq!(summary.thresholds.sqdiff, 0.1);
    let rows = results.snapshot();
    assert_eq!(rows[1].status, FrameStatus::Measured);
    assert_abs_diff_eq!(rows[1].attached, Point2::new(43.0, 82.0), epsilon = 1e-9);
}

#[test]
fn mismatched_frames_are_dropped_without_advancing_time() {
    let small = Frame::new(20, 20, PixelData::Gray8(vec![0; 400])).unwrap();
    let frames = vec![textured((0.0, 0.0)), small, textured((3.0, 2.0))];
    let (_tx, rx) = unbounded();
    let session = session(params(false), frames);
    let results = session.results();
    let summary = session.run(&rx).unwrap();

    assert_eq!(summary.frames_dropped, 1);
    let rows = results.snapshot();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].index, 2);
    assert_eq!(rows[1].time, 1.0);
}

/// Frames from memory; asks for a reselection while handing out `at`.
struct ReselectAt {
    frames: MemoryFrames,
    served: usize,
    at: usize,
    control: Sender<ControlSignal>,
}

impl FrameProvider for ReselectAt {
    fn next_frame(&mut self) -> Option<Result<SourceFrame, TrackError>> {
        let next = self.frames.next_frame();
        if self.served == self.at {
            self.control.send(ControlSignal::Reselect).unwrap();
        }
        self.served += 1;
        next
    }
}

#[test]
fn reselection_signal_rebases_on_the_last_frame() {
    let (tx, rx) = unbounded();
    let frames = MemoryFrames::new([
        textured((0.0, 0.0)),
        textured((3.0, 2.0)),
        textured((5.0, 3.0)),
        textured((6.0, 5.0)),
    ]);
    let provider = ReselectAt {
        frames,
        served: 0,
        at: 2,
        control: tx,
    };
    let p = params(false);
    let calibration = StaticCalibration::new(selection(), p.template_size, p.search_radius);
    let session = TrackingSession::new(p, Box::new(provider), Box::new(calibration));
    let results = session.results();
    let summary = session.run(&rx).unwrap();

    assert_eq!(summary.recalibrations, 1);
    assert_eq!(summary.frames_measured, 3);
    let rows = results.snapshot();
    let last = rows.last().unwrap();
    // the new reference is frame 2, shifted (5, 3); frame 3 moved (1, 2) more
    assert_abs_diff_eq!(last.free, Point2::new(161.0, 82.0), epsilon = 1e-9);
    assert_abs_diff_eq!(last.deformation, 0.0, epsilon = 1e-9);
}

#[test]
fn spawned_session_can_be_joined() {
    let frames = vec![textured((0.0, 0.0)), textured((1.0, 1.0))];
    let handle = session(params(false), frames).spawn().unwrap();
    let results = handle.results().clone();
    let summary = handle.join().unwrap();
    assert_eq!(summary.frames_measured, 1);
    assert_eq!(summary.centerline.len(), 11);
    assert_eq!(results.len(), 2);
}

#[test]
fn engine_reports_reselection_without_committing() {
    let p = params(false);
    let reference = textured((0.0, 0.0));
    let selection = selection().resolve(W, H, p.template_size, p.search_radius).unwrap();
    let policy = FailurePolicy::new(Box::new(FixedDecision(Decision::Reselect)));
    let mut engine = Engine::new(p, &reference, &selection, policy).unwrap();

    let measured = engine.process_frame(1, &textured((2.0, 1.0))).unwrap();
    assert!(matches!(measured, FrameOutcome::Measured(_)));
    let committed = *engine.state();
    assert_abs_diff_eq!(committed.free, Vector2::new(2.0, 1.0), epsilon = 1e-9);

    let outcome = engine.process_frame(2, &blank()).unwrap();
    assert_eq!(
        outcome,
        FrameOutcome::Reselect {
            point: PointKind::Holder
        }
    );
    assert_eq!(*engine.state(), committed);
}

#[test]
fn empty_source_is_an_error() {
    let (_tx, rx) = unbounded();
    let err = session(params(false), Vec::new()).run(&rx).unwrap_err();
    assert!(matches!(err, TrackError::NoFrames));
}

#[test]
fn rotating_needle_is_followed_by_rematching() {
    init_logging();
    for theta in [0.08f64, -0.08, 0.15] {
        let frames = vec![textured((0.0, 0.0)), rotated_needle(theta)];
        let (_tx, rx) = unbounded();
        let session = session(params(true), frames);
        let results = session.results();
        let summary = session.run(&rx).unwrap();
        assert_eq!(summary.frames_measured, 1, "theta {theta}");

        let rows = results.snapshot();
        let (first, last) = (&rows[0], &rows[1]);
        assert_eq!(last.status, FrameStatus::Measured);
        // rotated templates only settle after a few rounds
        assert!(last.iterations >= 3, "theta {theta}: {} iterations", last.iterations);
        assert!(last.iterations <= 10);

        let expected = Point2::new(40.0 + 120.0 * theta.cos(), 80.0 - 120.0 * theta.sin());
        assert_abs_diff_eq!(last.free, expected, epsilon = 0.75);
        assert_abs_diff_eq!(last.attached, Point2::new(40.0, 80.0), epsilon = 1e-9);
        assert_abs_diff_eq!(last.deflection_angle - first.deflection_angle, theta, epsilon = 0.05);
        assert_abs_diff_eq!(last.bending_angle, first.bending_angle, epsilon = 0.05);
        assert!(last.deformation.abs() < 0.01, "theta {theta}: {}", last.deformation);
        assert!(last.match_scores.free.is_some_and(|s| s > 0.9));
    }
}

#[test]
fn large_jump_relocates_the_holder_and_carries_the_other_points() {
    init_logging();
    // well beyond the 8 px search radius
    let frames = vec![textured((0.0, 0.0)), textured((17.0, 9.0))];
    let (_tx, rx) = unbounded();
    let session = session(params(false), frames)
        .with_resolver(Box::new(FixedDecision(Decision::Stop)));
    let results = session.results();
    let summary = session.run(&rx).unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfFrames);
    assert_eq!(summary.frames_measured, 1);
    let last = &results.snapshot()[1];
    assert_eq!(last.status, FrameStatus::Measured);
    assert_abs_diff_eq!(last.attached, Point2::new(57.0, 89.0), epsilon = 1e-9);
    assert_abs_diff_eq!(last.free, Point2::new(177.0, 89.0), epsilon = 1e-9);
    assert_abs_diff_eq!(last.mid, Point2::new(117.0, 79.0), epsilon = 1e-9);
    assert_abs_diff_eq!(last.deformation, 0.0, epsilon = 1e-9);
}

/// Flat gray frame that only keeps `region` of `reference`.
fn keep_only(reference: &Frame, region: PixelRect) -> Frame {
    let PixelData::Gray8(src) = reference.pixels() else {
        panic!("gray frame expected");
    };
    let mut data = vec![128u8; W * H];
    for y in region.y as usize..region.y as usize + region.height {
        for x in region.x as usize..region.x as usize + region.width {
            data[y * W + x] = src[y * W + x];
        }
    }
    Frame::new(W, H, PixelData::Gray8(data)).unwrap()
}

#[test]
fn exhausted_search_reaches_the_resolver() {
    init_logging();
    let p = params(false);
    let reference = textured((0.0, 0.0));
    let selection = selection().resolve(W, H, p.template_size, p.search_radius).unwrap();
    let asked = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&asked);
    let resolver = move |point: PointKind, ctx: &FailureContext| {
        log.lock().unwrap().push((point, ctx.cause, ctx.window, ctx.frame_index));
        Decision::Skip
    };
    let policy = FailurePolicy::new(Box::new(resolver));
    let mut engine = Engine::new(p, &reference, &selection, policy).unwrap();

    // the holder's local window, and nothing of the needle
    let frame = keep_only(&reference, PixelRect::new(0, 50, 44, 60));
    let outcome = engine.process_frame(1, &frame).unwrap();
    assert_eq!(
        outcome,
        FrameOutcome::Skipped {
            point: PointKind::Free
        }
    );
    // the holder itself was found, the free end was chased to every side
    let asked = asked.lock().unwrap();
    assert_eq!(
        *asked,
        vec![(
            PointKind::Free,
            FailureCause::BoundaryExhausted,
            PixelRect::new(0, 0, W, H),
            1
        )]
    );
    assert_abs_diff_eq!(engine.state().free, Vector2::zeros(), epsilon = 1e-12);
}

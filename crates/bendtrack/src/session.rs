//! Worker-thread driver: pulls frames, runs the engine, emits rows, and
//! listens for operator signals between frames.

use std::thread::{self, JoinHandle};

use bendtrack_core::Frame;
use bendtrack_match::MatchQualityThresholds;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, FrameOutcome};
use crate::{
    BendingState, Calibration, ConstantStep, FailurePolicy, FailureResolver, FixedDecision,
    Decision, FrameClock, FrameProvider, FrameResult, FrameStatus, PointKind, ResultSink,
    SharedResults, SourceFrame, TimeSource, TrackError, TrackerParams,
};

/// Number of centerline samples in the summary.
const CENTERLINE_SAMPLES: usize = 11;

/// Operator signals, honoured at the next frame boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlSignal {
    Stop,
    /// Select the reference points again on the last processed frame.
    Reselect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum StopReason {
    EndOfFrames,
    Operator,
    FailurePolicy { point: PointKind },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Frames after the reference that reached the engine.
    pub frames_processed: usize,
    pub frames_measured: usize,
    pub frames_skipped: usize,
    /// Frames rejected for layout or decoding problems.
    pub frames_dropped: usize,
    pub recalibrations: usize,
    pub stop_reason: StopReason,
    /// Thresholds at the end of the run, relaxations included.
    pub thresholds: MatchQualityThresholds,
    /// Geometry of the reference frame.
    pub initial: BendingState,
    /// Fitted arc of the last committed frame, attached end first.
    pub centerline: Vec<Point2<f64>>,
}

/// A complete tracking run.
pub struct TrackingSession {
    params: TrackerParams,
    provider: Box<dyn FrameProvider>,
    calibration: Box<dyn Calibration>,
    time: Box<dyn TimeSource>,
    resolver: Box<dyn FailureResolver>,
    sink: Option<Box<dyn ResultSink>>,
    results: SharedResults,
}

impl TrackingSession {
    /// Session with constant time steps of `params.time_step` and a
    /// resolver that skips failed frames.
    pub fn new(
        params: TrackerParams,
        provider: Box<dyn FrameProvider>,
        calibration: Box<dyn Calibration>,
    ) -> Self {
        Self {
            time: Box::new(ConstantStep),
            resolver: Box::new(FixedDecision(Decision::Skip)),
            params,
            provider,
            calibration,
            sink: None,
            results: SharedResults::new(),
        }
    }

    pub fn with_time_source(mut self, time: Box<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn FailureResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Extra sink fed alongside the shared buffer.
    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Buffer of committed rows; clones observe the same rows.
    pub fn results(&self) -> SharedResults {
        self.results.clone()
    }

    /// Start the run on a worker thread.
    pub fn spawn(self) -> Result<SessionHandle, TrackError> {
        let (control, signals) = unbounded();
        let results = self.results.clone();
        let handle = thread::Builder::new()
            .name("bendtrack-worker".into())
            .spawn(move || self.run(&signals))?;
        Ok(SessionHandle {
            control,
            results,
            handle,
        })
    }

    /// Run to completion on the calling thread.
    pub fn run(mut self, signals: &Receiver<ControlSignal>) -> Result<SessionSummary, TrackError> {
        let first = self.provider.next_frame().ok_or(TrackError::NoFrames)??;
        let selection = self.calibration.select_reference_points(&first.frame)?;
        let resolver = std::mem::replace(&mut self.resolver, Box::new(FixedDecision(Decision::Skip)));
        let mut engine = Engine::new(
            self.params.clone(),
            &first.frame,
            &selection,
            FailurePolicy::new(resolver),
        )?;
        let mut clock = FrameClock::new(self.params.time_step, self.time.timestamp_of(0));
        self.emit(engine.result_row(0, first.label, 0.0, FrameStatus::Reference, None))?;

        let mut summary = SessionSummary {
            frames_processed: 0,
            frames_measured: 0,
            frames_skipped: 0,
            frames_dropped: 0,
            recalibrations: 0,
            stop_reason: StopReason::EndOfFrames,
            thresholds: engine.thresholds().clone(),
            initial: engine.reference().initial,
            centerline: Vec::new(),
        };
        let mut last_frame: Frame = first.frame;
        let mut index = 0;

        loop {
            match signals.try_recv() {
                Ok(ControlSignal::Stop) => {
                    log::info!("stop requested after frame {index}");
                    summary.stop_reason = StopReason::Operator;
                    break;
                }
                Ok(ControlSignal::Reselect) => {
                    log::info!("reselection requested on frame {index}");
                    self.recalibrate(&mut engine, &last_frame)?;
                    summary.recalibrations += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }

            let Some(next) = self.provider.next_frame() else {
                break;
            };
            index += 1;
            let SourceFrame { frame, label } = match next {
                Ok(source) => source,
                Err(e) if e.is_unreadable_frame() => {
                    log::warn!("dropping frame {index}: {e}");
                    summary.frames_dropped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match engine.process_frame(index, &frame)? {
                FrameOutcome::Measured(m) => {
                    summary.frames_processed += 1;
                    summary.frames_measured += 1;
                    let time = clock.tick(self.time.timestamp_of(index));
                    self.emit(engine.result_row(index, label, time, FrameStatus::Measured, Some(&m)))?;
                }
                FrameOutcome::Skipped { point } => {
                    summary.frames_processed += 1;
                    summary.frames_skipped += 1;
                    log::info!("frame {index} skipped ({point} point)");
                    let time = clock.tick(self.time.timestamp_of(index));
                    self.emit(engine.result_row(index, label, time, FrameStatus::Skipped, None))?;
                }
                FrameOutcome::Stopped { point } => {
                    summary.frames_processed += 1;
                    summary.stop_reason = StopReason::FailurePolicy { point };
                    log::info!("tracking stopped at frame {index} ({point} point)");
                    break;
                }
                FrameOutcome::Reselect { point } => {
                    summary.frames_processed += 1;
                    log::info!("reselecting on frame {index} ({point} point)");
                    self.recalibrate(&mut engine, &frame)?;
                    summary.recalibrations += 1;
                }
                FrameOutcome::Dropped => {
                    summary.frames_dropped += 1;
                    continue;
                }
            }
            last_frame = frame;
        }

        summary.thresholds = engine.thresholds().clone();
        summary.centerline = engine.centerline(CENTERLINE_SAMPLES);
        log::info!(
            "session finished ({:?}): {} measured, {} skipped, {} dropped",
            summary.stop_reason,
            summary.frames_measured,
            summary.frames_skipped,
            summary.frames_dropped
        );
        Ok(summary)
    }

    fn recalibrate(&mut self, engine: &mut Engine, frame: &Frame) -> Result<(), TrackError> {
        let selection = self.calibration.select_reference_points(frame)?;
        engine.recalibrate(frame, &selection)
    }

    fn emit(&mut self, row: FrameResult) -> Result<(), TrackError> {
        if let Some(sink) = self.sink.as_mut() {
            sink.emit(&row)?;
        }
        self.results.push(row);
        Ok(())
    }
}

/// Control side of a spawned session.
#[derive(Debug)]
pub struct SessionHandle {
    control: Sender<ControlSignal>,
    results: SharedResults,
    handle: JoinHandle<Result<SessionSummary, TrackError>>,
}

impl SessionHandle {
    pub fn send(&self, signal: ControlSignal) {
        // a finished worker has dropped the receiver; nothing left to tell it
        let _ = self.control.send(signal);
    }

    pub fn stop(&self) {
        self.send(ControlSignal::Stop);
    }

    pub fn reselect(&self) {
        self.send(ControlSignal::Reselect);
    }

    /// Rows committed so far.
    pub fn results(&self) -> &SharedResults {
        &self.results
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return its summary.
    pub fn join(self) -> Result<SessionSummary, TrackError> {
        self.handle.join().map_err(|_| TrackError::WorkerPanicked)?
    }
}

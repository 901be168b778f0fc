use std::sync::{Arc, Mutex, MutexGuard};

use crate::{FrameResult, TrackError};

/// Receiver of committed rows, one call per reference, measured or skipped
/// frame.
pub trait ResultSink: Send {
    fn emit(&mut self, result: &FrameResult) -> Result<(), TrackError>;
}

/// Row buffer shared between the worker and its readers.
#[derive(Clone, Debug, Default)]
pub struct SharedResults {
    rows: Arc<Mutex<Vec<FrameResult>>>,
}

impl SharedResults {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FrameResult>> {
        // rows are pushed whole, so a poisoned buffer is still consistent
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, result: FrameResult) {
        self.lock().push(result);
    }

    /// Copy of the rows committed so far.
    pub fn snapshot(&self) -> Vec<FrameResult> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl ResultSink for SharedResults {
    fn emit(&mut self, result: &FrameResult) -> Result<(), TrackError> {
        self.push(result.clone());
        Ok(())
    }
}

impl<F> ResultSink for F
where
    F: FnMut(&FrameResult) -> Result<(), TrackError> + Send,
{
    fn emit(&mut self, result: &FrameResult) -> Result<(), TrackError> {
        self(result)
    }
}

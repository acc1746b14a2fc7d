//! Progress reporting and cancellation between the import worker and whoever
//! watches it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::errors::NoteFailure;

/// Full scale of [`ProgressUpdate::value`].
pub const PROGRESS_MAX: u64 = 100_000;

/// Stages of a run, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStep {
    Start,
    ExtractNotes,
    ParseNotes,
    CalculateWhatToDo,
    ImportNotes,
    Finished,
}

impl SyncStep {
    /// Share of [`PROGRESS_MAX`] the step covers.
    pub fn range(self) -> (u64, u64) {
        match self {
            SyncStep::Start => (0, 0),
            SyncStep::ExtractNotes => (0, 10_000),
            SyncStep::ParseNotes => (10_000, 20_000),
            // 20-30% is not used
            SyncStep::CalculateWhatToDo => (30_000, 35_000),
            SyncStep::ImportNotes => (35_000, PROGRESS_MAX),
            SyncStep::Finished => (PROGRESS_MAX, PROGRESS_MAX),
        }
    }

    pub fn next(self) -> Self {
        match self {
            SyncStep::Start => SyncStep::ExtractNotes,
            SyncStep::ExtractNotes => SyncStep::ParseNotes,
            SyncStep::ParseNotes => SyncStep::CalculateWhatToDo,
            SyncStep::CalculateWhatToDo => SyncStep::ImportNotes,
            SyncStep::ImportNotes | SyncStep::Finished => SyncStep::Finished,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub step: SyncStep,
    pub message: String,
    pub current: u64,
    pub total: u64,
    /// Overall progress, 0..=PROGRESS_MAX
    pub value: u64,
}

/// Receives progress from the import worker.
pub trait ProgressObserver {
    fn report(&mut self, update: ProgressUpdate);

    /// A note was skipped because of an error.
    fn note_failed(&mut self, _failure: &NoteFailure) {}
}

impl<F: FnMut(ProgressUpdate)> ProgressObserver for F {
    fn report(&mut self, update: ProgressUpdate) {
        self(update)
    }
}

/// Latest progress of a run, readable from any thread. Later updates replace
/// earlier ones.
#[derive(Clone, Default)]
pub struct SharedProgress {
    latest: Arc<Mutex<Option<ProgressUpdate>>>,
    failures: Arc<Mutex<Vec<NoteFailure>>>,
}

impl SharedProgress {
    pub fn latest(&self) -> Option<ProgressUpdate> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    /// Failures reported since the last call.
    pub fn take_failures(&self) -> Vec<NoteFailure> {
        self.failures
            .lock()
            .map(|mut failures| std::mem::take(&mut *failures))
            .unwrap_or_default()
    }
}

impl ProgressObserver for SharedProgress {
    fn report(&mut self, update: ProgressUpdate) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(update);
        }
    }

    fn note_failed(&mut self, failure: &NoteFailure) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure.clone());
        }
    }
}

/// Cooperative cancel flag. Clones share the flag.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Turns per-step `(current, total)` pairs into overall progress.
///
/// A report with `total == 0` marks the current step as done: it is shown at
/// the end of the step's range and the tracker moves on to the next step, so
/// `value` never decreases over a run.
pub struct ProgressTracker<'a> {
    step: SyncStep,
    observer: &'a mut dyn ProgressObserver,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(observer: &'a mut dyn ProgressObserver) -> Self {
        Self {
            step: SyncStep::Start,
            observer,
        }
    }

    pub fn step(&self) -> SyncStep {
        self.step
    }

    pub fn report(&mut self, message: impl Into<String>, current: u64, total: u64) {
        let (start, end) = self.step.range();
        let value = if total == 0 {
            end
        } else {
            start + (end - start) * current.min(total) / total
        };

        self.observer.report(ProgressUpdate {
            step: self.step,
            message: message.into(),
            current,
            total,
            value,
        });

        if total == 0 {
            self.step = self.step.next();
        }
    }

    /// Report the end of the current step.
    pub fn complete(&mut self, message: impl Into<String>) {
        self.report(message, 0, 0);
    }

    /// Report the final state of the run.
    pub fn finish(&mut self, message: impl Into<String>) {
        self.step = SyncStep::Finished;
        self.observer.report(ProgressUpdate {
            step: SyncStep::Finished,
            message: message.into(),
            current: 0,
            total: 0,
            value: PROGRESS_MAX,
        });
    }

    pub fn note_failed(&mut self, failure: &NoteFailure) {
        self.observer.note_failed(failure);
    }
}

//! Completion channel for asynchronous block steps.
//!
//! A block that does not support immediate execution receives a
//! `CompletionHandle` in `execute()`. It must eventually report exactly one
//! `Completion` through it, possibly from a worker thread. The runner waits
//! on the paired receiver while staying responsive to cancellation.

use crate::scenario::block::PortData;
use crossbeam_channel::{bounded, Receiver, Sender};

/// Outcome of an asynchronous step.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The step finished; the map holds buffers keyed by data-output port name.
    Finished(PortData),
    /// The step failed; the run is aborted.
    Failed(String),
    /// The block acknowledged a stop request.
    Stopped,
}

/// Sending half handed to a block. Cloneable so a block may hand it to a
/// worker thread while keeping a copy for its stop path; only the first
/// report is observed.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    tx: Sender<Completion>,
}

impl CompletionHandle {
    /// Create a handle and the receiver the runner waits on.
    pub fn channel() -> (Self, Receiver<Completion>) {
        let (tx, rx) = bounded(1);
        (Self { tx }, rx)
    }

    pub fn finish(&self, outputs: PortData) {
        self.report(Completion::Finished(outputs));
    }

    pub fn finish_empty(&self) {
        self.report(Completion::Finished(PortData::new()));
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.report(Completion::Failed(message.into()));
    }

    pub fn stopped(&self) {
        self.report(Completion::Stopped);
    }

    fn report(&self, completion: Completion) {
        // A full or disconnected channel means a report was already
        // delivered or the runner stopped listening.
        if self.tx.try_send(completion).is_err() {
            tracing::trace!("Completion already reported; ignoring");
        }
    }
}

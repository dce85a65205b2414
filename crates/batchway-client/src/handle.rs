//! Collected entries and their completion handles.

use crate::error::BatchError;
use batchway_types::{BatchResponseItem, LogicalRequest};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Outcome of one logical request.
pub type BatchResult = Result<BatchResponseItem, BatchError>;

/// A request waiting in a debounce window, paired with the sending half of
/// its completion handle.
#[derive(Debug)]
pub struct CollectedEntry {
    /// The caller's request.
    pub request: LogicalRequest,
    /// When the request entered the collector.
    pub enqueued_at: Instant,
    completer: oneshot::Sender<BatchResult>,
}

impl CollectedEntry {
    /// Creates an entry and the handle that observes it.
    pub fn new(request: LogicalRequest) -> (Self, CompletionHandle) {
        let (completer, receiver) = oneshot::channel();
        let entry = Self {
            request,
            enqueued_at: Instant::now(),
            completer,
        };
        (entry, CompletionHandle { receiver })
    }

    /// Settles the entry with a response item.
    pub fn resolve(self, item: BatchResponseItem) {
        self.settle(Ok(item));
    }

    /// Settles the entry with an error.
    pub fn reject(self, error: BatchError) {
        self.settle(Err(error));
    }

    // A caller that dropped its handle is not an error.
    fn settle(self, outcome: BatchResult) {
        let _ = self.completer.send(outcome);
    }
}

/// Future resolving to the outcome of one enqueued request.
///
/// Settles exactly once. If the entry is dropped unsettled the handle
/// resolves to [`BatchError::Abandoned`].
#[derive(Debug)]
#[must_use = "the request is sent regardless; the handle only observes its outcome"]
pub struct CompletionHandle {
    receiver: oneshot::Receiver<BatchResult>,
}

impl Future for CompletionHandle {
    type Output = BatchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(BatchError::Abandoned)))
    }
}

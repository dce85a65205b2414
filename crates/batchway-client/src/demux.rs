//! Pairs a bulk response array back to the entries of its batch.
//!
//! `responses[i]` answers `entries[i]`. Before validation, a `304` at an
//! index with a cache hit is replaced by the stored record so callers only
//! ever observe the original success status.

use crate::error::{BatchError, StatusError, TransportError};
use crate::handle::CollectedEntry;
use batchway_cache::{CacheOverlay, CacheRecord};
use batchway_types::{BatchResponseItem, LogicalRequest, STATUS_NOT_MODIFIED};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Counts of one settled batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleSummary {
    /// Handles resolved with a response item.
    pub resolved: usize,
    /// Handles rejected.
    pub rejected: usize,
    /// `304` items replaced by cached records.
    pub substituted: usize,
}

/// Replaces every `304` at a cache-hit index with the stored record.
///
/// Returns the number of substituted items.
pub fn substitute_not_modified(
    responses: &mut [BatchResponseItem],
    hits: &HashMap<usize, CacheRecord>,
) -> usize {
    let mut substituted = 0;
    for (index, item) in responses.iter_mut().enumerate() {
        if item.status != STATUS_NOT_MODIFIED {
            continue;
        }
        if let Some(record) = hits.get(&index) {
            *item = record.to_response_item(item);
            substituted += 1;
        }
    }
    substituted
}

/// Settles completion handles from a response array.
#[derive(Debug, Clone, Default)]
pub struct ResponseDemultiplexer {
    overlay: Option<Arc<CacheOverlay>>,
}

impl ResponseDemultiplexer {
    /// Creates a demultiplexer feeding fresh responses to `overlay`.
    pub fn new(overlay: Option<Arc<CacheOverlay>>) -> Self {
        Self { overlay }
    }

    /// Stores cacheable responses, then substitutes cached payloads for `304`s.
    ///
    /// `requests` are the requests as transmitted. Returns the number of
    /// substituted items.
    pub fn reconcile(
        &self,
        requests: &[LogicalRequest],
        responses: &mut [BatchResponseItem],
        hits: &HashMap<usize, CacheRecord>,
    ) -> usize {
        if let Some(overlay) = &self.overlay {
            overlay.absorb(requests, responses);
        }
        substitute_not_modified(responses, hits)
    }

    /// Settles every entry of a batch.
    ///
    /// A response array shorter than the batch rejects every entry with one
    /// shared [`TransportError::CountMismatch`]. Otherwise each entry is
    /// resolved when its (possibly substituted) status is in `200..400` and
    /// rejected with a [`StatusError`] when it is not.
    pub fn settle(
        &self,
        entries: Vec<CollectedEntry>,
        requests: &[LogicalRequest],
        mut responses: Vec<BatchResponseItem>,
        hits: &HashMap<usize, CacheRecord>,
    ) -> SettleSummary {
        let mut summary = SettleSummary::default();

        if responses.len() < entries.len() {
            let error = Arc::new(TransportError::CountMismatch {
                expected: entries.len(),
                actual: responses.len(),
            });
            for entry in entries {
                entry.reject(BatchError::Transport(Arc::clone(&error)));
                summary.rejected += 1;
            }
            return summary;
        }

        summary.substituted = self.reconcile(requests, &mut responses, hits);

        for (entry, item) in entries.into_iter().zip(responses) {
            if item.is_success() {
                entry.resolve(item);
                summary.resolved += 1;
            } else {
                debug!(
                    status = item.status,
                    path = %entry.request.path,
                    "Request answered with error status"
                );
                entry.reject(BatchError::Status(StatusError {
                    status: item.status,
                    body: item.data,
                }));
                summary.rejected += 1;
            }
        }

        summary
    }
}

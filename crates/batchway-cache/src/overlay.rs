//! Conditional-request overlay for bulk batches.
//!
//! Before a batch goes out, [`CacheOverlay::prepare`] attaches
//! `If-None-Match` to every GET it has a record for. After the batch comes
//! back, [`CacheOverlay::absorb`] stores every fresh GET response that
//! carries an entity tag. Store failures are logged and swallowed: the
//! overlay fails open, never closed.

use crate::{CacheError, CacheKey, CacheRecord, CacheStore};
use batchway_types::{BatchResponseItem, LogicalRequest, IF_NONE_MATCH_HEADER};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A batch annotated with conditional headers.
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    /// Outgoing requests, in submission order.
    pub requests: Vec<LogicalRequest>,
    /// Records found for the batch, keyed by request index.
    pub hits: HashMap<usize, CacheRecord>,
}

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// GET lookups that found a record.
    pub hits: u64,
    /// GET lookups that found nothing (or failed).
    pub misses: u64,
    /// Records written.
    pub writes: u64,
    /// Store reads, writes or partition clears that failed.
    pub failures: u64,
    /// Records removed by partition purges.
    pub purged: u64,
}

impl CacheStats {
    /// Returns the cache hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct OverlayMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    failures: AtomicU64,
    purged: AtomicU64,
}

impl OverlayMetrics {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }
}

/// ETag overlay on top of a partitioned [`CacheStore`].
pub struct CacheOverlay {
    store: Arc<dyn CacheStore>,
    namespace: String,
    partition: String,
    metrics: OverlayMetrics,
}

impl std::fmt::Debug for CacheOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOverlay")
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

impl CacheOverlay {
    /// Creates an overlay writing to partition `{namespace}-{version_tag}`.
    pub fn new(
        store: Arc<dyn CacheStore>,
        namespace: impl Into<String>,
        version_tag: impl AsRef<str>,
    ) -> Self {
        let namespace = namespace.into();
        let partition = format!("{namespace}-{}", version_tag.as_ref());
        Self {
            store,
            namespace,
            partition,
            metrics: OverlayMetrics::default(),
        }
    }

    /// Returns the partition this overlay reads and writes.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Returns a snapshot of the overlay statistics.
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    fn key(&self, signature: &str) -> CacheKey {
        CacheKey::new(self.partition.clone(), signature)
    }

    /// Looks up the record for one request. Non-GET requests never match.
    pub fn lookup(&self, request: &LogicalRequest) -> Option<CacheRecord> {
        let signature = request.signature()?;
        match self.store.get(&self.key(&signature)) {
            Ok(Some(record)) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                Some(record)
            }
            Ok(None) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                warn!(signature = %signature, error = %e, "Cache lookup failed, sending unconditionally");
                None
            }
        }
    }

    /// Attaches `If-None-Match` to every GET with a stored record.
    pub fn prepare(&self, requests: Vec<LogicalRequest>) -> PreparedBatch {
        let mut hits = HashMap::new();
        let requests = requests
            .into_iter()
            .enumerate()
            .map(|(index, mut request)| {
                if let Some(record) = self.lookup(&request) {
                    request.insert_header(IF_NONE_MATCH_HEADER, record.etag.clone());
                    hits.insert(index, record);
                }
                request
            })
            .collect::<Vec<_>>();

        if !hits.is_empty() {
            debug!(
                batch_size = requests.len(),
                hits = hits.len(),
                "Attached conditional headers"
            );
        }

        PreparedBatch { requests, hits }
    }

    /// Stores every GET response below 300 that carries an entity tag.
    ///
    /// `responses[i]` must answer `requests[i]`; surplus entries on either
    /// side are ignored. Returns the number of records written.
    pub fn absorb(&self, requests: &[LogicalRequest], responses: &[BatchResponseItem]) -> usize {
        let mut written = 0;
        for (request, response) in requests.iter().zip(responses) {
            if response.status >= 300 {
                continue;
            }
            let Some(signature) = request.signature() else {
                continue;
            };
            let Some(record) = CacheRecord::from_response(signature.clone(), response) else {
                continue;
            };
            match self.store.put(self.key(&signature), record) {
                Ok(()) => {
                    self.metrics.writes.fetch_add(1, Ordering::Relaxed);
                    written += 1;
                }
                Err(e) => {
                    self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(signature = %signature, error = %e, "Failed to store cache record");
                }
            }
        }
        written
    }

    /// Deletes every partition of this namespace except the current one.
    ///
    /// A partition that fails to clear is logged and skipped. Returns the
    /// number of records removed; errors only when the partitions cannot be
    /// listed.
    pub fn purge_stale_partitions(&self) -> Result<usize, CacheError> {
        let removed = self.purge_matching(|partition| partition != self.partition)?;
        info!(namespace = %self.namespace, records = removed, "Purged stale cache partitions");
        Ok(removed)
    }

    /// Deletes every partition of this namespace, the current one included.
    ///
    /// Failures are handled as in [`Self::purge_stale_partitions`].
    pub fn purge_all(&self) -> Result<usize, CacheError> {
        let removed = self.purge_matching(|_| true)?;
        info!(namespace = %self.namespace, records = removed, "Purged cache namespace");
        Ok(removed)
    }

    fn purge_matching(&self, select: impl Fn(&str) -> bool) -> Result<usize, CacheError> {
        let prefix = format!("{}-", self.namespace);
        let mut removed = 0;
        for partition in self.store.partitions()? {
            if !partition.starts_with(&prefix) || !select(&partition) {
                continue;
            }
            match self.store.clear_partition(&partition) {
                Ok(count) => {
                    debug!(partition = %partition, records = count, "Cleared cache partition");
                    removed += count;
                }
                Err(e) => {
                    self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(partition = %partition, error = %e, "Failed to clear cache partition");
                }
            }
        }
        self.metrics
            .purged
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }
}

//! Debounced request collection.
//!
//! Every [`RequestCollector::enqueue`] pushes the request into the
//! accumulating window and restarts the window's timer. When the timer fires
//! after a quiet period, the window's entries are detached while the lock is
//! held and only then handed to a transmission task, so a request enqueued
//! during an in-flight send always starts a new window.
//!
//! ```text
//! IDLE ──enqueue──▶ ACCUMULATING ──quiet period──▶ FLUSHING ──settled──▶ IDLE
//!                    ▲    │ enqueue restarts timer     │
//!                    └────┘                            └── new enqueues open a new window
//! ```

use crate::demux::ResponseDemultiplexer;
use crate::error::BatchError;
use crate::handle::{CollectedEntry, CompletionHandle};
use crate::sender::BatchSender;
use batchway_cache::{CacheOverlay, PreparedBatch};
use batchway_types::{BulkMode, LogicalRequest};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default quiet period before a window is flushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Timing and concurrency settings of a collector.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Quiet period after the last enqueue before the window is flushed.
    pub debounce: Duration,
    /// Ceiling on how long a window may accumulate since its first entry.
    pub max_batch_age: Option<Duration>,
    /// Cap on concurrently transmitting batches.
    pub max_in_flight_batches: Option<usize>,
    /// Transmission mode of collected batches.
    pub mode: BulkMode,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_batch_age: None,
            max_in_flight_batches: None,
            mode: BulkMode::Simple,
        }
    }
}

/// Collector statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Requests enqueued.
    pub enqueued: u64,
    /// Batches handed to the transport.
    pub batches_sent: u64,
    /// Batches that failed as a whole.
    pub transport_failures: u64,
    /// Entries in the accumulating window.
    pub pending: usize,
    /// Batches detached but not yet settled.
    pub in_flight: usize,
}

impl CollectorStats {
    /// Returns true when nothing is accumulating or in flight.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }

    /// Returns the average number of requests per batch.
    pub fn coalescing_factor(&self) -> f64 {
        if self.batches_sent == 0 {
            0.0
        } else {
            self.enqueued as f64 / self.batches_sent as f64
        }
    }
}

#[derive(Default)]
struct DebounceWindow {
    entries: Vec<CollectedEntry>,
    timer: Option<JoinHandle<()>>,
    opened_at: Option<Instant>,
    generation: u64,
}

impl DebounceWindow {
    fn detach(&mut self) -> Vec<CollectedEntry> {
        self.opened_at = None;
        mem::take(&mut self.entries)
    }
}

#[derive(Default)]
struct CollectorMetrics {
    enqueued: AtomicU64,
    batches_sent: AtomicU64,
    transport_failures: AtomicU64,
    in_flight: AtomicUsize,
}

struct Inner {
    settings: CollectorSettings,
    sender: BatchSender,
    overlay: Option<Arc<CacheOverlay>>,
    demux: ResponseDemultiplexer,
    window: Mutex<DebounceWindow>,
    limiter: Option<Arc<Semaphore>>,
    metrics: CollectorMetrics,
}

struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.metrics.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Coalesces concurrently issued requests into debounced bulk batches.
///
/// Cloning yields another handle to the same window.
#[derive(Clone)]
pub struct RequestCollector {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RequestCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCollector")
            .field("settings", &self.inner.settings)
            .field("stats", &self.stats())
            .finish()
    }
}

impl RequestCollector {
    /// Creates a collector sending through `sender`.
    ///
    /// With an overlay, GETs are sent conditionally and fresh responses are
    /// cached.
    pub fn new(
        settings: CollectorSettings,
        sender: BatchSender,
        overlay: Option<Arc<CacheOverlay>>,
    ) -> Self {
        let limiter = settings
            .max_in_flight_batches
            .map(|permits| Arc::new(Semaphore::new(permits.max(1))));
        let demux = ResponseDemultiplexer::new(overlay.clone());

        Self {
            inner: Arc::new(Inner {
                settings,
                sender,
                overlay,
                demux,
                window: Mutex::new(DebounceWindow::default()),
                limiter,
                metrics: CollectorMetrics::default(),
            }),
        }
    }

    /// Adds a request to the accumulating window and restarts its timer.
    ///
    /// Returns immediately. The request is transmitted whether or not the
    /// handle is awaited.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn enqueue(&self, request: LogicalRequest) -> CompletionHandle {
        let (entry, handle) = CollectedEntry::new(request);
        let settings = &self.inner.settings;

        let mut window = self.inner.window.lock();
        let now = Instant::now();
        let opened_at = *window.opened_at.get_or_insert(now);
        window.entries.push(entry);
        window.generation = window.generation.wrapping_add(1);

        if let Some(timer) = window.timer.take() {
            timer.abort();
        }

        let mut deadline = now + settings.debounce;
        if let Some(max_age) = settings.max_batch_age {
            deadline = deadline.min(opened_at + max_age);
        }

        let generation = window.generation;
        let inner = Arc::clone(&self.inner);
        window.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            Inner::fire(&inner, generation);
        }));

        self.inner.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(pending = window.entries.len(), "Enqueued request");

        handle
    }

    /// Flushes the accumulating window without waiting for its timer.
    ///
    /// Returns the number of requests handed to transmission.
    pub fn flush_now(&self) -> usize {
        let entries = {
            let mut window = self.inner.window.lock();
            if let Some(timer) = window.timer.take() {
                timer.abort();
            }
            window.generation = window.generation.wrapping_add(1);
            window.detach()
        };

        let count = entries.len();
        if count > 0 {
            Inner::dispatch(&self.inner, entries);
        }
        count
    }

    /// Returns a snapshot of the collector statistics.
    pub fn stats(&self) -> CollectorStats {
        let pending = self.inner.window.lock().entries.len();
        let metrics = &self.inner.metrics;
        CollectorStats {
            enqueued: metrics.enqueued.load(Ordering::Relaxed),
            batches_sent: metrics.batches_sent.load(Ordering::Relaxed),
            transport_failures: metrics.transport_failures.load(Ordering::Relaxed),
            pending,
            in_flight: metrics.in_flight.load(Ordering::Acquire),
        }
    }

    /// Returns true when nothing is accumulating or in flight.
    pub fn is_idle(&self) -> bool {
        self.stats().is_idle()
    }
}

impl Inner {
    fn fire(inner: &Arc<Self>, generation: u64) {
        let entries = {
            let mut window = inner.window.lock();
            // A newer enqueue or an explicit flush superseded this timer.
            if window.generation != generation {
                return;
            }
            window.timer = None;
            window.detach()
        };

        if !entries.is_empty() {
            Self::dispatch(inner, entries);
        }
    }

    fn dispatch(inner: &Arc<Self>, entries: Vec<CollectedEntry>) {
        inner.metrics.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(Arc::clone(inner));
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let _guard = guard;
            inner.flush(entries).await;
        });
    }

    async fn flush(&self, entries: Vec<CollectedEntry>) {
        let _permit = match &self.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };

        let requests: Vec<LogicalRequest> = entries.iter().map(|e| e.request.clone()).collect();
        let prepared = match &self.overlay {
            Some(overlay) => overlay.prepare(requests),
            None => PreparedBatch {
                requests,
                hits: HashMap::new(),
            },
        };

        let batch_size = entries.len();
        let queued_ms = entries
            .iter()
            .map(|e| e.enqueued_at.elapsed().as_millis() as u64)
            .max()
            .unwrap_or_default();
        self.metrics.batches_sent.fetch_add(1, Ordering::Relaxed);
        debug!(
            batch_size,
            queued_ms,
            cache_hits = prepared.hits.len(),
            "Flushing window"
        );

        match self
            .sender
            .send(&prepared.requests, self.settings.mode, false)
            .await
        {
            Ok(responses) => {
                let summary =
                    self.demux
                        .settle(entries, &prepared.requests, responses, &prepared.hits);
                debug!(
                    batch_size,
                    resolved = summary.resolved,
                    rejected = summary.rejected,
                    substituted = summary.substituted,
                    "Batch settled"
                );
            }
            Err(e) => {
                self.metrics
                    .transport_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(batch_size, error = %e, "Bulk batch failed");
                let error = Arc::new(e);
                for entry in entries {
                    entry.reject(BatchError::Transport(Arc::clone(&error)));
                }
            }
        }
    }
}

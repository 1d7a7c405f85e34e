use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;

/// Unix timestamp in milliseconds.
#[must_use]
pub fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Integer counter shared across worker tasks.
#[derive(Debug, Default)]
pub struct Counter(AtomicI64);

impl Counter {
    /// Returns the value after the increment.
    pub fn increment(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the value after the decrement.
    pub fn decrement(&self) -> i64 {
        self.0.fetch_sub(1, Ordering::Relaxed) - 1
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

pub const PROGRESS_INTERVAL_MS: u64 = 5_000;

/// Per-run shared state: the four admission/outcome counters plus the
/// progress-log throttle. Created at run start, read at report time.
#[derive(Debug, Default)]
pub struct RunContext {
    pub processed: Counter,
    pub errors: Counter,
    pub pending: Counter,
    pub timing_errors: Counter,
    last_progress_ms: AtomicU64,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits a progress line at most once per [`PROGRESS_INTERVAL_MS`].
    /// Concurrent completions race on the throttle slot; exactly one wins.
    pub fn maybe_log_progress(&self, latency_ms: u64) {
        let now = unix_ms();
        let last = self.last_progress_ms.load(Ordering::Relaxed);
        if now < last.saturating_add(PROGRESS_INTERVAL_MS) {
            return;
        }

        if self
            .last_progress_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            tracing::info!(
                processed = self.processed.value(),
                pending = self.pending.value(),
                errors = self.errors.value(),
                latency_ms,
                "progress"
            );
        }
    }
}

/// Cooperative cancellation: checked before new submissions, awaitable during
/// deadline sleeps. `cancel` is idempotent.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only for the call that performed the transition.
    pub fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

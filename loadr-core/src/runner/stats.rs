use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;

use crate::results::{RequestOutcome, ResultLine};

use super::context::RunContext;

/// Final aggregate for one run (or one workload file in file-replay mode).
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Requests the run accounts for: submitted events, or the effective
    /// count at cancellation for a time-bounded run.
    pub total_requests: u64,
    /// Requests that completed an HTTP exchange.
    pub completed_requests: u64,
    pub error_requests: i64,
    pub timing_error_requests: i64,
    pub run_duration: Duration,
    /// 0.0 when no request completed.
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: Option<u64>,
    pub p99_latency_ms: Option<u64>,
    pub requests_per_sec: f64,
}

/// Accumulates one record per completed request. The log is append-only and
/// ordered by completion, not submission.
#[derive(Debug)]
pub struct StatsCollector {
    outcomes: Mutex<Vec<RequestOutcome>>,
    latency_ms: Mutex<Histogram<u64>>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        fn new_hist() -> Histogram<u64> {
            // Track up to one hour in milliseconds (with 3 sigfigs).
            Histogram::<u64>::new_with_bounds(1, 3_600_000, 3)
                .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
        }

        Self {
            outcomes: Mutex::new(Vec::new()),
            latency_ms: Mutex::new(new_hist()),
        }
    }
}

impl StatsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: RequestOutcome) {
        {
            let mut hist = self
                .latency_ms
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            hist.saturating_record(outcome.latency_ms.max(1));
        }

        let mut outcomes = self
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        outcomes.push(outcome);
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        let outcomes = self
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        outcomes.len() as u64
    }

    /// Snapshot of the persisted projection, in completion order.
    #[must_use]
    pub fn lines(&self) -> Vec<ResultLine> {
        let outcomes = self
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        outcomes.iter().map(RequestOutcome::to_line).collect()
    }

    #[must_use]
    pub fn summarize(
        &self,
        total_requests: u64,
        elapsed: Duration,
        ctx: &RunContext,
    ) -> RunReport {
        let hist = self
            .latency_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let completed = self.completed();
        let has_samples = hist.len() > 0;

        let avg_latency_ms = if has_samples { hist.mean() } else { 0.0 };
        let max_latency_ms = if has_samples { hist.max() } else { 0 };
        let p50_latency_ms = has_samples.then(|| hist.value_at_quantile(0.50));
        let p99_latency_ms = has_samples.then(|| hist.value_at_quantile(0.99));

        let secs = elapsed.as_secs_f64();
        let requests_per_sec = if secs > 0.0 {
            total_requests as f64 / secs
        } else {
            0.0
        };

        RunReport {
            total_requests,
            completed_requests: completed,
            error_requests: ctx.errors.value(),
            timing_error_requests: ctx.timing_errors.value(),
            run_duration: elapsed,
            avg_latency_ms,
            max_latency_ms,
            p50_latency_ms,
            p99_latency_ms,
            requests_per_sec,
        }
    }
}

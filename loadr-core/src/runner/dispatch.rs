use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use crate::workload::Event;

use super::context::{CancelFlag, RunContext};
use super::pool::{CompletionHook, Dispatched, WorkerPool};

/// Completion callback carrying the submission index of the finished task.
pub type IndexedHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Discrete-event driver: walks the event sequence, sleeps until each event's
/// wall-clock deadline, submits it to the pool, and performs admission
/// bookkeeping.
#[derive(Debug)]
pub struct Dispatcher {
    pool: WorkerPool,
    ctx: Arc<RunContext>,
    cancel: Arc<CancelFlag>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(pool: WorkerPool, ctx: Arc<RunContext>, cancel: Arc<CancelFlag>) -> Self {
        Self { pool, ctx, cancel }
    }

    /// Returns the submitted task handles in submission order. Stops early
    /// when the cancel flag fires; already-submitted tasks keep running.
    pub async fn dispatch<I>(
        &self,
        events: I,
        on_complete: Option<IndexedHook>,
    ) -> Vec<JoinHandle<super::pool::Result<Dispatched>>>
    where
        I: IntoIterator<Item = Event>,
    {
        let started = Instant::now();
        let mut handles = Vec::new();

        for event in events {
            if self.cancel.is_cancelled() {
                break;
            }

            let deadline = tokio::time::Instant::from_std(started + event.offset);
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {}
                () = self.cancel.cancelled() => break,
            }

            let index = handles.len() as u64;
            handles.push(self.submit_one(event, index, on_complete.clone()));
        }

        handles
    }

    fn submit_one(
        &self,
        event: Event,
        index: u64,
        on_complete: Option<IndexedHook>,
    ) -> JoinHandle<super::pool::Result<Dispatched>> {
        let offset_ms = event.offset.as_millis() as u64;

        let hook: Option<CompletionHook> =
            on_complete.map(|hook| Arc::new(move || hook(index)) as CompletionHook);

        self.ctx.processed.increment();
        // Counted before submission so a completing task cannot decrement
        // below zero in between; the captured value is what this event saw.
        let pending_now = self.ctx.pending.increment();
        let handle = self.pool.submit(event, hook);

        if pending_now > self.pool.pool_size() as i64 {
            self.ctx.timing_errors.increment();
            tracing::warn!(
                offset_ms,
                pending = pending_now,
                pool_size = self.pool.pool_size(),
                "scheduling deadline missed: no free worker slot"
            );
        }

        handle
    }
}

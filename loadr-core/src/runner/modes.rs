use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::config::{RunMode, RunnerConfig};
use crate::results::ResultLine;
use crate::workload::WorkloadSource;

use super::context::{CancelFlag, RunContext};
use super::dispatch::{Dispatcher, IndexedHook};
use super::error::Result;
use super::pool::{Dispatched, WorkerPool};
use super::stats::{RunReport, StatsCollector};

/// One finished run: file-replay produces one per workload file, the other
/// modes exactly one.
#[derive(Debug)]
pub struct ModeRun {
    /// Workload-file stem for file-replay runs; used to name the result file.
    pub label: Option<String>,
    pub report: RunReport,
    pub lines: Vec<ResultLine>,
}

/// Drives the configured run mode to completion (or cancellation) and
/// returns the collected runs.
pub async fn run(config: &RunnerConfig, cancel: Arc<CancelFlag>) -> Result<Vec<ModeRun>> {
    match &config.mode {
        RunMode::FileReplay { files, rounds } => {
            file_replay(config, files, *rounds, cancel).await
        }
        RunMode::Periodic { events, rate } => {
            let source = WorkloadSource::periodic(*events, *rate, config.ingress_target.clone());
            let run = closed_run(config, &source, cancel).await;
            Ok(vec![run])
        }
        RunMode::Greedy { events } => {
            let source = WorkloadSource::burst(*events, config.ingress_target.clone());
            let run = closed_run(config, &source, cancel).await;
            Ok(vec![run])
        }
        RunMode::TimelyGreedy { events, budget } => {
            let run = timely_greedy(config, *events, *budget, cancel).await;
            Ok(vec![run])
        }
    }
}

fn build_dispatcher(
    config: &RunnerConfig,
    ctx: &Arc<RunContext>,
    stats: &Arc<StatsCollector>,
    cancel: &Arc<CancelFlag>,
) -> Dispatcher {
    let pool = WorkerPool::new(
        &config.gateway,
        config.pool_size,
        config.header_chain.clone(),
        config.selector.clone(),
        ctx.clone(),
        stats.clone(),
    );
    Dispatcher::new(pool, ctx.clone(), cancel.clone())
}

/// Periodic and greedy runs: schedule everything, wait for the pool to drain.
async fn closed_run(
    config: &RunnerConfig,
    source: &WorkloadSource,
    cancel: Arc<CancelFlag>,
) -> ModeRun {
    let ctx = Arc::new(RunContext::new());
    let stats = Arc::new(StatsCollector::new());
    let dispatcher = build_dispatcher(config, &ctx, &stats, &cancel);

    let started = Instant::now();
    let handles = dispatcher.dispatch(source.events(), None).await;
    let submitted = handles.len() as u64;
    drain(handles, &cancel).await;

    let report = stats.summarize(submitted, started.elapsed(), &ctx);
    ModeRun {
        label: None,
        report,
        lines: stats.lines(),
    }
}

async fn file_replay(
    config: &RunnerConfig,
    files: &[std::path::PathBuf],
    rounds: u32,
    cancel: Arc<CancelFlag>,
) -> Result<Vec<ModeRun>> {
    let mut runs = Vec::with_capacity(files.len());

    for path in files {
        let ctx = Arc::new(RunContext::new());
        let stats = Arc::new(StatsCollector::new());
        let mut submitted = 0u64;

        let started = Instant::now();
        for round in 1..=rounds {
            if cancel.is_cancelled() {
                break;
            }

            tracing::info!(round, workload = %path.display(), "starting workload round");
            let source = WorkloadSource::from_trace_file(path)?;
            let dispatcher = build_dispatcher(config, &ctx, &stats, &cancel);
            let handles = dispatcher.dispatch(source.events(), None).await;
            submitted += handles.len() as u64;
            drain(handles, &cancel).await;
        }

        let report = stats.summarize(submitted, started.elapsed(), &ctx);
        runs.push(ModeRun {
            label: Some(workload_stem(path)),
            report,
            lines: stats.lines(),
        });
    }

    Ok(runs)
}

/// Greedy submission under a wall-clock budget. The completion hook performs
/// the overrun check; the first overrun cancels the run, every task not yet
/// complete is aborted, and the index of the first such task becomes the
/// effective request count.
async fn timely_greedy(
    config: &RunnerConfig,
    events: u64,
    budget: Duration,
    cancel: Arc<CancelFlag>,
) -> ModeRun {
    let ctx = Arc::new(RunContext::new());
    let stats = Arc::new(StatsCollector::new());
    let dispatcher = build_dispatcher(config, &ctx, &stats, &cancel);
    let source = WorkloadSource::burst(events, config.ingress_target.clone());

    let started = Instant::now();
    let time_exceeded = Arc::new(AtomicBool::new(false));
    let done: Arc<[AtomicBool]> = (0..events).map(|_| AtomicBool::new(false)).collect();
    let hook: IndexedHook = {
        let cancel = cancel.clone();
        let time_exceeded = time_exceeded.clone();
        let done = done.clone();
        Arc::new(move |index: u64| {
            if let Some(flag) = done.get(index as usize) {
                flag.store(true, Ordering::Release);
            }

            // The swap keeps the overrun transition single-shot; later checks
            // after cancellation are no-ops.
            if started.elapsed() >= budget && !time_exceeded.swap(true, Ordering::AcqRel) {
                tracing::info!(
                    budget_secs = budget.as_secs_f64(),
                    "time budget exceeded; cancelling remaining work"
                );
                cancel.cancel();
            }
        })
    };

    let handles = dispatcher.dispatch(source.events(), Some(hook)).await;
    let submitted = handles.len() as u64;

    // Once the overrun cancels the flag, the drain aborts every task that
    // has not completed instead of waiting for it.
    drain(handles, &cancel).await;

    // Effective request count: the index of the first task that was still
    // pending when the run was cut short (cancelled tasks never mark done).
    let mut effective = submitted;
    if time_exceeded.load(Ordering::Acquire) {
        for idx in 0..submitted as usize {
            let task_done = done
                .get(idx)
                .is_some_and(|flag| flag.load(Ordering::Acquire));
            if !task_done {
                effective = idx as u64;
                break;
            }
        }
    }

    let elapsed = started.elapsed();
    if !time_exceeded.load(Ordering::Acquire) {
        let ran_minutes = elapsed.as_secs_f64() / 60.0;
        let budget_minutes = budget.as_secs_f64() / 60.0;
        if ran_minutes > 0.0 && !cancel.is_cancelled() {
            let recommended = ((events as f64) * (budget_minutes / ran_minutes)).ceil() as u64;
            tracing::warn!(
                ran_minutes = format!("{ran_minutes:.1}"),
                budget_minutes,
                recommended_workload_events = recommended,
                "event budget exhausted before the time budget; raise `workload_events`"
            );
        }
    }

    let report = stats.summarize(effective, elapsed, &ctx);
    ModeRun {
        label: None,
        report,
        lines: stats.lines(),
    }
}

/// Awaits every handle; once the cancel flag fires, remaining handles are
/// aborted instead of awaited. Returns the number of successful completions.
pub async fn drain(
    handles: Vec<JoinHandle<super::pool::Result<Dispatched>>>,
    cancel: &CancelFlag,
) -> u64 {
    let mut completed = 0u64;

    for mut handle in handles {
        let finished = if cancel.is_cancelled() {
            None
        } else {
            tokio::select! {
                res = &mut handle => Some(res),
                () = cancel.cancelled() => None,
            }
        };

        let res = match finished {
            Some(res) => res,
            None => {
                handle.abort();
                handle.await
            }
        };

        match res {
            Ok(Ok(_)) => completed += 1,
            // Per-request failures were logged and counted by the task.
            Ok(Err(_)) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => tracing::error!(error = %err, "worker task panicked"),
        }
    }

    completed
}

fn workload_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("workload")
        .to_string()
}

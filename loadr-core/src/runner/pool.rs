use std::sync::Arc;
use std::time::{Duration, Instant};

use loadr_http::{GatewayClient, GatewayRequest};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::headers::{self, HeaderChain, HeaderSet};
use crate::results::RequestOutcome;
use crate::route::{self, EndpointSelector};
use crate::workload::Event;

use super::context::{RunContext, unix_ms};
use super::stats::StatsCollector;

pub type Result<T> = std::result::Result<T, TaskError>;

/// Per-task failure. Propagated through the task's `JoinHandle`; never stops
/// the run.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("header chain failed: {0}")]
    Headers(#[from] headers::Error),

    #[error("routing failed: {0}")]
    Route(#[from] route::Error),

    #[error("transport failure: {0}")]
    Transport(#[from] loadr_http::Error),

    #[error("worker pool closed")]
    PoolClosed,
}

/// Invoked after a task's completion bookkeeping, success or failure.
pub type CompletionHook = Arc<dyn Fn() + Send + Sync>;

/// Returned through the task handle on a completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub scheduled_offset: Duration,
    pub latency: Duration,
}

struct Exchange {
    headers: HeaderSet,
    status: u16,
    success: bool,
    observed_unix_ms: u64,
    latency: Duration,
}

/// Fixed-size pool of concurrent request slots. `submit` returns immediately;
/// the task waits for a free slot, performs one GET against the gateway, and
/// runs the completion bookkeeping.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    client: Arc<GatewayClient>,
    gateway: Arc<str>,
    chain: Arc<HeaderChain>,
    selector: Arc<EndpointSelector>,
    ctx: Arc<RunContext>,
    stats: Arc<StatsCollector>,
    slots: Arc<Semaphore>,
    pool_size: usize,
}

impl WorkerPool {
    #[must_use]
    pub fn new(
        gateway: &str,
        pool_size: usize,
        chain: HeaderChain,
        selector: EndpointSelector,
        ctx: Arc<RunContext>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            client: Arc::new(GatewayClient::default()),
            gateway: Arc::from(gateway.trim_end_matches('/')),
            chain: Arc::new(chain),
            selector: Arc::new(selector),
            ctx,
            stats,
            slots: Arc::new(Semaphore::new(pool_size)),
            pool_size,
        }
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn submit(
        &self,
        event: Event,
        on_complete: Option<CompletionHook>,
    ) -> JoinHandle<Result<Dispatched>> {
        let client = self.client.clone();
        let gateway = self.gateway.clone();
        let chain = self.chain.clone();
        let selector = self.selector.clone();
        let ctx = self.ctx.clone();
        let stats = self.stats.clone();
        let slots = self.slots.clone();

        tokio::spawn(async move {
            let permit = slots.acquire_owned().await;
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => return Err(TaskError::PoolClosed),
            };

            let scheduled_offset = event.offset;
            let result = execute(&client, &gateway, &chain, &selector, &event).await;

            ctx.pending.decrement();

            let result = match result {
                Ok(exchange) => {
                    if !exchange.success {
                        ctx.errors.increment();
                        tracing::warn!(status = exchange.status, "request failed");
                    }

                    let latency_ms = exchange.latency.as_millis() as u64;
                    stats.record(RequestOutcome {
                        scheduled_offset,
                        observed_unix_ms: exchange.observed_unix_ms,
                        latency_ms,
                        status: exchange.status,
                        processed_at_completion: ctx.processed.value(),
                        pending_at_completion: ctx.pending.value(),
                        headers: exchange.headers.into_entries(),
                    });
                    ctx.maybe_log_progress(latency_ms);

                    Ok(Dispatched {
                        scheduled_offset,
                        latency: exchange.latency,
                    })
                }
                Err(err) => {
                    match &err {
                        TaskError::Transport(cause) => {
                            ctx.errors.increment();
                            tracing::warn!(
                                kind = %cause.transport_error_kind(),
                                error = %cause,
                                "transport failure"
                            );
                        }
                        TaskError::Route(cause) => {
                            tracing::warn!(error = %cause, "routing failed for event");
                        }
                        TaskError::Headers(cause) => {
                            tracing::warn!(error = %cause, "header chain failed for event");
                        }
                        TaskError::PoolClosed => {}
                    }
                    Err(err)
                }
            };

            if let Some(hook) = on_complete {
                hook();
            }

            result
        })
    }
}

async fn execute(
    client: &GatewayClient,
    gateway: &str,
    chain: &HeaderChain,
    selector: &EndpointSelector,
    event: &Event,
) -> Result<Exchange> {
    let headers = chain.build_headers(&mut rand::rng())?;
    let endpoint = selector.route(&event.target, &headers)?;
    let url = format!("{gateway}/{endpoint}");

    let observed_unix_ms = unix_ms();
    let started = Instant::now();
    let response = client
        .request(GatewayRequest::get_owned(url).with_headers(headers.entries().to_vec()))
        .await?;
    let latency = started.elapsed();

    Ok(Exchange {
        headers,
        status: response.status,
        success: response.is_success(),
        observed_unix_ms,
        latency,
    })
}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_S0: &str = "/s0";
pub const PATH_S1: &str = "/s1";
pub const PATH_S3: &str = "/s3";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_FLAKY: &str = "/flaky";

/// Behavior knobs for a started server.
#[derive(Debug, Clone, Copy)]
pub struct TestServerOptions {
    /// Added to every `/slow` response.
    pub slow_delay: Duration,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            slow_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    slow_requests_total: Arc<AtomicU64>,
    flaky_requests_total: Arc<AtomicU64>,
    saw_request_type: Arc<AtomicU64>,
    saw_base_endpoint: Arc<AtomicU64>,
    last_request_type: Arc<Mutex<Option<String>>>,
}

impl TestServerStats {
    fn observe(&self, headers: &HeaderMap) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if let Some(value) = headers
            .get("x-requesttype")
            .and_then(|v| v.to_str().ok())
        {
            self.saw_request_type.fetch_add(1, Ordering::Relaxed);
            let mut last = self
                .last_request_type
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *last = Some(value.to_string());
        }

        if headers.get("x-baseendpoint").is_some() {
            self.saw_base_endpoint.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn slow_requests_total(&self) -> u64 {
        self.slow_requests_total.load(Ordering::Relaxed)
    }

    pub fn flaky_requests_total(&self) -> u64 {
        self.flaky_requests_total.load(Ordering::Relaxed)
    }

    pub fn saw_request_type(&self) -> u64 {
        self.saw_request_type.load(Ordering::Relaxed)
    }

    pub fn saw_base_endpoint(&self) -> u64 {
        self.saw_base_endpoint.load(Ordering::Relaxed)
    }

    pub fn last_request_type(&self) -> Option<String> {
        self.last_request_type
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[derive(Debug, Clone)]
struct ServerState {
    stats: TestServerStats,
    options: TestServerOptions,
}

async fn handle_fast(State(state): State<ServerState>, headers: HeaderMap) -> &'static str {
    state.stats.observe(&headers);
    "ok"
}

async fn handle_slow(State(state): State<ServerState>, headers: HeaderMap) -> &'static str {
    state.stats.observe(&headers);
    state
        .stats
        .slow_requests_total
        .fetch_add(1, Ordering::Relaxed);
    sleep(state.options.slow_delay).await;
    "slow"
}

async fn handle_flaky(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> (StatusCode, &'static str) {
    state.stats.observe(&headers);
    state
        .stats
        .flaky_requests_total
        .fetch_add(1, Ordering::Relaxed);
    (StatusCode::INTERNAL_SERVER_ERROR, "flaky")
}

pub fn router(stats: TestServerStats, options: TestServerOptions) -> Router {
    let state = ServerState { stats, options };
    Router::new()
        .route(PATH_S0, get(handle_fast))
        .route(PATH_S1, get(handle_fast))
        .route(PATH_S3, get(handle_fast))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_FLAKY, get(handle_flaky))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(options: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone(), options);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}

//! Main server loop: acceptors, worker pool, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use uwire_config::ServerConfig;
use uwire_core::{ObjectPool, DEFAULT_WORKER_POOL_FLOOR, READ_SCRATCH_SIZE};
use uwire_metrics::{record_connection_accepted, record_connection_closed};
use uwire_proto::RpcHandler;

use crate::admission::TokenBucket;
use crate::conn::handle_conn;
use crate::error::ServerError;
use crate::metrics::ServerMetrics;
use crate::util::{create_listener, ConnectionGuard, ConnectionTracker};
use crate::worker::{worker_loop, SharedReceiver, WorkItem};

/// Listener backlog for the accept queue.
const LISTEN_BACKLOG: u32 = 1024;
/// Scratch buffers kept idle for connection readers.
const SCRATCH_POOL_SIZE: usize = 256;

/// Runtime limits resolved from the configuration.
pub(crate) struct Settings {
    pub handler_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_buffer_size: usize,
    pub max_concurrent_requests: usize,
}

/// State shared by acceptors, connection readers, and workers.
pub(crate) struct Shared {
    pub settings: Settings,
    pub bucket: TokenBucket,
    pub metrics: Arc<ServerMetrics>,
    pub queue: mpsc::Sender<WorkItem>,
    pub scratch: ObjectPool<Vec<u8>>,
}

fn logical_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run the server with a cancellation token for graceful shutdown.
pub async fn run_with_shutdown<H>(
    config: &ServerConfig,
    handler: H,
    shutdown: CancellationToken,
) -> Result<(), ServerError>
where
    H: RpcHandler + 'static,
{
    let listen: SocketAddr = config
        .listen
        .parse()
        .map_err(|_| ServerError::Config("invalid listen address".into()))?;

    let worker_count = config
        .worker_pool_size
        .unwrap_or_else(|| DEFAULT_WORKER_POOL_FLOOR.max(2 * logical_cpus()));

    let (queue_tx, queue_rx) = mpsc::channel::<WorkItem>(config.message_queue_size);
    let metrics = Arc::new(ServerMetrics::new());
    let shared = Arc::new(Shared {
        settings: Settings {
            handler_timeout: Duration::from_secs(config.handler_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            write_timeout: Duration::from_secs(config.write_timeout_secs),
            max_buffer_size: config.max_buffer_size,
            max_concurrent_requests: config.max_concurrent_requests,
        },
        bucket: TokenBucket::new(config.rate_limit_requests, config.rate_limit_burst),
        metrics: metrics.clone(),
        queue: queue_tx,
        scratch: ObjectPool::byte_buffers(SCRATCH_POOL_SIZE, READ_SCRATCH_SIZE),
    });

    let handler = Arc::new(handler);
    let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(queue_rx));
    let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        workers.push(tokio::spawn(worker_loop(
            rx.clone(),
            handler.clone(),
            shared.clone(),
            shutdown.clone(),
        )));
    }

    let listener = Arc::new(create_listener(listen, LISTEN_BACKLOG)?);
    let conn_limit = Arc::new(Semaphore::new(config.connection_pool_size));
    let tracker = ConnectionTracker::new();

    // One acceptor per logical CPU for high connection churn.
    let acceptor_count = logical_cpus();
    info!(
        address = %listen,
        workers = worker_count,
        acceptors = acceptor_count,
        queue = config.message_queue_size,
        "listening"
    );

    let mut acceptors: Vec<JoinHandle<()>> = Vec::with_capacity(acceptor_count);
    for _ in 0..acceptor_count {
        let listener = listener.clone();
        let conn_limit = conn_limit.clone();
        let tracker = tracker.clone();
        let shared = shared.clone();
        let shutdown = shutdown.clone();
        acceptors.push(tokio::spawn(async move {
            accept_loop(listener, conn_limit, tracker, shared, shutdown).await;
        }));
    }

    shutdown.cancelled().await;
    info!("shutdown signal received, stopping accept loops");

    for acceptor in acceptors {
        let _ = acceptor.await;
    }
    // Closing the listener rejects new connections from here on.
    drop(listener);

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    let active = tracker.count();
    if active > 0 {
        info!("waiting for {} active connections to drain", active);
        if tracker.wait_for_zero(grace).await {
            info!("all connections drained");
        } else {
            warn!(
                "shutdown timeout, {} connections still active",
                tracker.count()
            );
        }
    }

    // Workers drain the remaining queue with a bounded grace period.
    let drain = async {
        for worker in workers {
            let _ = worker.await;
        }
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!("worker pool did not drain within grace period");
    }

    let snapshot = metrics.snapshot(0);
    info!(
        total = snapshot.total_requests,
        failed = snapshot.failed_requests,
        avg_latency_ms = snapshot.avg_latency_ms,
        "server stopped"
    );
    Ok(())
}

/// Run the server (blocking until error, no graceful shutdown).
pub async fn run<H>(config: &ServerConfig, handler: H) -> Result<(), ServerError>
where
    H: RpcHandler + 'static,
{
    run_with_shutdown(config, handler, CancellationToken::new()).await
}

async fn accept_loop(
    listener: Arc<tokio::net::TcpListener>,
    conn_limit: Arc<Semaphore>,
    tracker: ConnectionTracker,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    loop {
        // Accept is gated on a connection slot; the slot is released when the
        // per-connection reader exits.
        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            permit = conn_limit.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => return,
            },
        };

        let (stream, peer) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            res = listener.accept() => match res {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "error accepting connection");
                    drop(permit);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            },
        };

        debug!(peer = %peer, "new connection");
        record_connection_accepted();
        tracker.increment();
        let guard = ConnectionGuard::new(tracker.clone());
        let shared = shared.clone();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            let _permit = permit; // hold slot until the reader exits
            let _guard = guard;
            handle_conn(stream, peer, shared, shutdown).await;
            record_connection_closed();
            debug!(peer = %peer, "connection closed");
        });
    }
}

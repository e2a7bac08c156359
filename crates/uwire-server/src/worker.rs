//! Worker pool draining the message queue.
//!
//! Each worker parses its frame a second time to recover the request id and
//! method, dispatches on the method name under the per-request deadline, and
//! writes the framed response back on the originating connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use uwire_core::{ERROR_PROTOCOL, ERROR_TIMEOUT};
use uwire_metrics::{record_error, record_handler_latency, record_request_failed};
use uwire_proto::{encode_response, error_frame, parse_frame, ParseResult, RpcHandler};

use crate::server::Shared;

/// Serialized writer for one connection; responses from many workers must
/// not interleave partial frames.
pub(crate) type ConnWriter = Arc<Mutex<OwnedWriteHalf>>;

/// A frame admitted to the queue, paired with its connection writer.
pub(crate) struct WorkItem {
    pub frame: Vec<u8>,
    pub writer: ConnWriter,
    pub received_at: Instant,
    pub peer: SocketAddr,
}

pub(crate) type SharedReceiver = Arc<Mutex<mpsc::Receiver<WorkItem>>>;

/// Write a complete frame under the connection's write lock and deadline.
pub(crate) async fn write_frame(
    writer: &ConnWriter,
    bytes: &[u8],
    deadline: std::time::Duration,
    peer: SocketAddr,
) {
    let write = async {
        let mut guard = writer.lock().await;
        guard.write_all(bytes).await
    };
    match tokio::time::timeout(deadline, write).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(peer = %peer, error = %err, "error writing response"),
        Err(_) => warn!(peer = %peer, "write deadline exceeded"),
    }
}

pub(crate) async fn worker_loop<H: RpcHandler + 'static>(
    rx: SharedReceiver,
    handler: Arc<H>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    loop {
        let item = {
            let mut guard = rx.lock().await;
            tokio::select! {
                item = guard.recv() => item,
                // After shutdown the queue is drained without waiting for
                // new arrivals, then the worker exits.
                _ = shutdown.cancelled() => guard.try_recv().ok(),
            }
        };
        let Some(item) = item else {
            break;
        };
        process(item, &handler, &shared).await;
    }
}

async fn process<H: RpcHandler>(item: WorkItem, handler: &Arc<H>, shared: &Arc<Shared>) {
    shared.metrics.request_started();
    let started = Instant::now();
    let queued = started.duration_since(item.received_at);
    if queued > shared.settings.handler_timeout {
        warn!(peer = %item.peer, queued_ms = queued.as_millis() as u64, "request sat in queue past the handler deadline");
    }

    let (request_id, response) = run_handler(&item, handler, shared).await;

    match response {
        Ok(bytes) => {
            shared.metrics.request_succeeded(started.elapsed());
            record_handler_latency(started.elapsed().as_secs_f64());
            write_frame(&item.writer, &bytes, shared.settings.write_timeout, item.peer).await;
        }
        Err(message) => {
            shared.metrics.request_failed();
            record_request_failed();
            let frame = error_frame(request_id, &message);
            write_frame(&item.writer, &frame, shared.settings.write_timeout, item.peer).await;
        }
    }

    shared.metrics.request_finished();
}

/// Dispatch one frame; returns the response frame bytes or an error message.
async fn run_handler<H: RpcHandler>(
    item: &WorkItem,
    handler: &Arc<H>,
    shared: &Arc<Shared>,
) -> (Uuid, Result<Vec<u8>, String>) {
    let frame = match parse_frame(&item.frame) {
        ParseResult::Complete(f) => f,
        ParseResult::Incomplete(_) => {
            record_error(ERROR_PROTOCOL);
            let id = uwire_proto::peek_request_id(&item.frame).unwrap_or_else(Uuid::nil);
            return (id, Err("message too short".to_string()));
        }
        ParseResult::Invalid(e) => {
            record_error(ERROR_PROTOCOL);
            let id = uwire_proto::peek_request_id(&item.frame).unwrap_or_else(Uuid::nil);
            return (id, Err(e.to_string()));
        }
    };
    let request_id = frame.request_id;

    if frame.method.is_empty() {
        record_error(ERROR_PROTOCOL);
        return (request_id, Err("missing method name".to_string()));
    }

    // Fast path for ping: no dependencies, no handler deadline.
    if frame.method == "ping" {
        let pong = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let body = serde_json::json!({ "status": "success", "pong": pong });
        return (request_id, encode_body(request_id, &body));
    }

    let dispatched = tokio::time::timeout(
        shared.settings.handler_timeout,
        handler.dispatch(frame.method, frame.payload),
    )
    .await;

    match dispatched {
        Ok(Ok(value)) => (request_id, encode_body(request_id, &value)),
        Ok(Err(err)) => {
            record_error(err.kind);
            debug!(peer = %item.peer, method = frame.method, error = %err, "handler error");
            (request_id, Err(err.message))
        }
        Err(_) => {
            record_error(ERROR_TIMEOUT);
            warn!(peer = %item.peer, method = frame.method, "handler timed out");
            (request_id, Err("handler timed out".to_string()))
        }
    }
}

fn encode_body(request_id: Uuid, body: &serde_json::Value) -> Result<Vec<u8>, String> {
    let payload = match serde_json::to_vec(body) {
        Ok(p) => p,
        Err(_) => return Err("error generating response".to_string()),
    };
    encode_response(request_id, &payload).map_err(|_| "error generating response".to_string())
}

//! Per-connection reader: framing, admission control, enqueueing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use uwire_core::CircularBuffer;
use uwire_metrics::{
    record_request_admitted, record_request_rejected, record_resync, set_request_queue_depth,
};
use uwire_proto::{error_frame, next_event, peek_request_id, FrameEvent};

use crate::server::Shared;
use crate::worker::{write_frame, ConnWriter, WorkItem};

pub(crate) async fn handle_conn(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %err, "failed to set TCP_NODELAY");
    }

    let (mut read_half, write_half) = stream.into_split();
    let writer: ConnWriter = Arc::new(tokio::sync::Mutex::new(write_half));
    let mut acc = CircularBuffer::new(
        uwire_core::READ_SCRATCH_SIZE,
        shared.settings.max_buffer_size,
    );
    let mut scratch = shared.scratch.get();

    'conn: loop {
        // The read deadline is refreshed for every read attempt.
        let n = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break 'conn,
            res = tokio::time::timeout(
                shared.settings.read_timeout,
                read_half.read(&mut scratch),
            ) => match res {
                Err(_) => {
                    debug!(peer = %peer, "read deadline exceeded");
                    break 'conn;
                }
                Ok(Ok(0)) => break 'conn,
                Ok(Ok(n)) => n,
                Ok(Err(err)) => {
                    if err.kind() != std::io::ErrorKind::UnexpectedEof {
                        debug!(peer = %peer, error = %err, "error reading from connection");
                    }
                    break 'conn;
                }
            },
        };

        if acc.write(&scratch[..n]).is_err() {
            warn!(peer = %peer, "buffer size exceeded, dropping connection");
            break 'conn;
        }

        loop {
            match next_event(&mut acc) {
                Ok(None) => break,
                Ok(Some(FrameEvent::Resync { skipped })) => {
                    warn!(peer = %peer, skipped, "resynchronized after corrupt bytes");
                    record_resync(skipped as u64);
                }
                Ok(Some(FrameEvent::Frame(frame))) => {
                    admit(frame, &writer, peer, &shared).await;
                }
                Err(err) => {
                    warn!(peer = %peer, error = %err, "protocol violation, dropping connection");
                    break 'conn;
                }
            }
        }
    }

    shared.scratch.release(scratch);
}

/// Apply admission control to one complete frame and enqueue it.
///
/// Denials are answered synchronously on the connection so the request id
/// still gets exactly one response.
async fn admit(frame: Vec<u8>, writer: &ConnWriter, peer: SocketAddr, shared: &Arc<Shared>) {
    let request_id = peek_request_id(&frame).unwrap_or_else(Uuid::nil);

    if !shared.bucket.allow() {
        record_request_rejected("rate_limit");
        send_error(writer, request_id, "Rate limit exceeded", peer, shared).await;
        return;
    }

    if shared.metrics.active_requests() >= shared.settings.max_concurrent_requests as i64 {
        record_request_rejected("overloaded");
        send_error(writer, request_id, "Server overloaded", peer, shared).await;
        return;
    }

    let item = WorkItem {
        frame,
        writer: writer.clone(),
        received_at: Instant::now(),
        peer,
    };
    match shared.queue.try_send(item) {
        Ok(()) => {
            record_request_admitted();
            let depth = shared.queue.max_capacity() - shared.queue.capacity();
            set_request_queue_depth(depth as f64);
        }
        Err(TrySendError::Full(_)) => {
            record_request_rejected("queue_full");
            send_error(writer, request_id, "Server busy, try again later", peer, shared).await;
        }
        Err(TrySendError::Closed(_)) => {
            debug!(peer = %peer, "queue closed during shutdown");
        }
    }
}

async fn send_error(
    writer: &ConnWriter,
    request_id: Uuid,
    message: &str,
    peer: SocketAddr,
    shared: &Arc<Shared>,
) {
    let frame = error_frame(request_id, message);
    write_frame(writer, &frame, shared.settings.write_timeout, peer).await;
}

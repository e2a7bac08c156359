//! A single pooled connection and its reader task.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use uwire_core::{CircularBuffer, READ_SCRATCH_SIZE};
use uwire_proto::{next_event, parse_frame, FrameEvent, ParseResult};

use crate::error::ClientError;
use crate::pending::PendingMap;

/// One pooled TCP connection, exclusively read by its reader task. Writes
/// come from many request-originating tasks and are serialized by a mutex
/// around the write half.
pub(crate) struct PoolConnection {
    pub id: u64,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    available: AtomicBool,
    retired: AtomicBool,
    last_used: Mutex<Instant>,
    last_probe: Mutex<Instant>,
    pub requests: AtomicU64,
    closed: CancellationToken,
}

impl PoolConnection {
    /// Establish the TCP connection and split it; the read half goes to the
    /// reader task, the write half stays here behind the mutex.
    pub async fn connect(
        id: u64,
        addr: &str,
        connect_timeout: Duration,
    ) -> std::io::Result<(Arc<Self>, OwnedReadHalf)> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
            })??;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        let now = Instant::now();
        let conn = Arc::new(Self {
            id,
            writer: tokio::sync::Mutex::new(write_half),
            available: AtomicBool::new(true),
            retired: AtomicBool::new(false),
            last_used: Mutex::new(now),
            last_probe: Mutex::new(now),
            requests: AtomicU64::new(0),
            closed: CancellationToken::new(),
        });
        Ok((conn, read_half))
    }

    /// Write one frame. The connection is held in-use for the duration of
    /// the write syscall; multiplexed responses keep it selectable
    /// otherwise.
    pub async fn send(&self, frame: &[u8]) -> std::io::Result<()> {
        self.available.store(false, Ordering::Release);
        let result = {
            let mut writer = self.writer.lock().await;
            writer.write_all(frame).await
        };
        if result.is_ok() && !self.retired.load(Ordering::Acquire) {
            self.available.store(true, Ordering::Release);
        }
        result
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire) && !self.closed.is_cancelled()
    }

    pub fn mark_unavailable(&self) {
        self.available.store(false, Ordering::Release);
    }

    /// Retire the connection: no reconnect is scheduled when it closes.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.available.store(false, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }

    pub fn mark_probed(&self) {
        *self.last_probe.lock() = Instant::now();
    }

    /// Reader task: accumulate socket bytes, extract frames, resolve the
    /// matching pending requests. Exits on socket close, protocol
    /// violation, or deliberate close.
    pub async fn read_loop(
        self: Arc<Self>,
        mut read_half: OwnedReadHalf,
        pending: Arc<PendingMap>,
        max_buffer: usize,
    ) {
        let mut scratch = vec![0u8; READ_SCRATCH_SIZE];
        let mut acc = CircularBuffer::new(READ_SCRATCH_SIZE, max_buffer);

        'read: loop {
            let n = tokio::select! {
                biased;
                _ = self.closed.cancelled() => break 'read,
                res = read_half.read(&mut scratch) => match res {
                    Ok(0) => break 'read,
                    Ok(n) => n,
                    Err(err) => {
                        debug!(conn = self.id, error = %err, "connection read error");
                        break 'read;
                    }
                },
            };

            if acc.write(&scratch[..n]).is_err() {
                warn!(conn = self.id, "response accumulator overflow, closing connection");
                break 'read;
            }

            loop {
                match next_event(&mut acc) {
                    Ok(None) => break,
                    Ok(Some(FrameEvent::Resync { skipped })) => {
                        warn!(conn = self.id, skipped, "resynchronized response stream");
                    }
                    Ok(Some(FrameEvent::Frame(bytes))) => {
                        dispatch_response(&bytes, &pending, self.id);
                    }
                    Err(err) => {
                        warn!(conn = self.id, error = %err, "protocol violation on response stream");
                        break 'read;
                    }
                }
            }
        }

        self.mark_unavailable();
        self.closed.cancel();
    }
}

/// Locate the pending request for one response frame and resolve it.
fn dispatch_response(bytes: &[u8], pending: &PendingMap, conn_id: u64) {
    let frame = match parse_frame(bytes) {
        ParseResult::Complete(frame) => frame,
        other => {
            debug!(conn = conn_id, result = ?other, "discarding unparseable response frame");
            return;
        }
    };
    let request_id: Uuid = frame.request_id;
    let result = serde_json::from_slice::<serde_json::Value>(frame.payload)
        .map_err(|e| ClientError::Decode(e.to_string()));
    if !pending.resolve(request_id, result) {
        // Either the request timed out or this is a duplicate: drop silently.
        debug!(conn = conn_id, request_id = %request_id, "late response dropped");
    }
}

impl std::fmt::Debug for PoolConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConnection")
            .field("id", &self.id)
            .field("available", &self.is_available())
            .field("requests", &self.requests.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

//! Process-wide pending-request map.
//!
//! Requests are keyed by request id across every connection to every
//! service; a response arriving on any socket resolves its request. The
//! take-and-remove discipline guarantees each request resolves exactly
//! once: whoever removes the entry owns the resolution, and a late
//! response that finds nothing is dropped silently.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::ClientError;

pub(crate) type ResponseResult = Result<serde_json::Value, ClientError>;

pub(crate) struct PendingRequest {
    tx: oneshot::Sender<ResponseResult>,
    pub started: Instant,
}

#[derive(Default)]
pub(crate) struct PendingMap {
    inner: Mutex<HashMap<Uuid, PendingRequest>>,
}

impl PendingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and hand back the receiver its caller awaits.
    pub fn register(&self, id: Uuid) -> oneshot::Receiver<ResponseResult> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(
            id,
            PendingRequest {
                tx,
                started: Instant::now(),
            },
        );
        rx
    }

    /// Remove the entry for `id`; the caller owns the resolution.
    pub fn take(&self, id: Uuid) -> Option<PendingRequest> {
        self.inner.lock().remove(&id)
    }

    /// Resolve `id` with a decoded response. Returns false when the request
    /// already timed out or resolved (late responses are dropped).
    pub fn resolve(&self, id: Uuid, result: ResponseResult) -> bool {
        match self.take(id) {
            Some(pending) => pending.tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Reject every outstanding request, e.g. on shutdown.
    pub fn fail_all(&self, err: ClientError) {
        let drained: Vec<PendingRequest> = {
            let mut map = self.inner.lock();
            map.drain().map(|(_, pending)| pending).collect()
        };
        for pending in drained {
            let _ = pending.tx.send(Err(err.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

//! Service-side uwire peer.
//!
//! Terminates TCP, parses frames, applies admission control, dispatches to
//! the configured [`RpcHandler`](uwire_proto::RpcHandler) through a fixed
//! worker pool, and writes framed responses back on the same connection.

mod admission;
mod conn;
mod error;
mod metrics;
mod server;
mod util;
mod worker;

pub use admission::TokenBucket;
pub use error::ServerError;
pub use metrics::{ServerMetrics, TransportMetrics};
pub use server::{run, run_with_shutdown};
pub use tokio_util::sync::CancellationToken;
pub use util::{ConnectionGuard, ConnectionTracker};

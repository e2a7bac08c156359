//! uwire frame parsing and serialization.
//!
//! Every frame, request and response, shares one layout: a two-byte magic,
//! a protocol version, a 16-byte request id, a length-prefixed method name
//! (empty on responses), and a little-endian length-prefixed JSON payload.
//! Parsers are incremental and never panic on hostile input.

mod extract;
mod frame;
mod handler;

pub use extract::{next_event, FrameEvent};
pub use frame::{
    encode_request, encode_response, error_body, error_frame, frame_size, parse_frame,
    peek_request_id, EncodeError, Frame, FrameRef, ParseError, ParseResult, CONTENT_LEN_SIZE,
    MAGIC, MAX_FRAME_LEN, MIN_FRAME_LEN, PROTOCOL_VERSION, REQUEST_ID_LEN,
};
pub use handler::{RpcError, RpcHandler};

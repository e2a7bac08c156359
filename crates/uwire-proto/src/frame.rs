//! Frame layout constants, incremental parser, and encoder.

use uuid::Uuid;

/// Frame magic bytes (`0x55 0x57`).
pub const MAGIC: [u8; 2] = [0x55, 0x57];
/// Wire protocol version.
pub const PROTOCOL_VERSION: u8 = 0x01;
/// Request id length in bytes (RFC-4122 UUID, as-is).
pub const REQUEST_ID_LEN: usize = 16;
/// Content length field size (little-endian u32).
pub const CONTENT_LEN_SIZE: usize = 4;
/// Fixed header bytes before the method name: magic + version + id + method-len.
pub const MIN_FRAME_LEN: usize = 2 + 1 + REQUEST_ID_LEN + 1;
/// Hard cap on a single frame (10 MiB). Larger frames drop the connection.
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

const ID_OFFSET: usize = 3;
const METHOD_LEN_OFFSET: usize = MIN_FRAME_LEN - 1;

/// Protocol violations detected while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// First two bytes are not the magic pair.
    InvalidMagic,
    /// Version byte differs from [`PROTOCOL_VERSION`].
    UnsupportedVersion(u8),
    /// Declared frame size exceeds [`MAX_FRAME_LEN`].
    FrameTooLarge(usize),
    /// Method name bytes are not valid UTF-8.
    InvalidMethod,
    /// Buffer is shorter than the fixed header.
    MessageTooShort,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidMagic => write!(f, "invalid magic bytes"),
            ParseError::UnsupportedVersion(v) => {
                write!(f, "unsupported protocol version: {v}")
            }
            ParseError::FrameTooLarge(n) => write!(f, "frame too large: {n} bytes"),
            ParseError::InvalidMethod => write!(f, "method name is not valid UTF-8"),
            ParseError::MessageTooShort => write!(f, "message too short"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors that can occur when building a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Method name exceeds 255 bytes.
    MethodTooLong,
    /// Total frame would exceed [`MAX_FRAME_LEN`].
    FrameTooLarge(usize),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::MethodTooLong => write!(f, "method name too long"),
            EncodeError::FrameTooLarge(n) => write!(f, "frame too large: {n} bytes"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Parse result for incremental parsing.
///
/// - `Complete(T)` - parsing succeeded, contains the parsed value.
/// - `Incomplete(n)` - buffer too small; `n` is the **minimum total bytes**
///   needed. Caller should accumulate more data and retry.
/// - `Invalid(e)` - protocol violation; caller resynchronizes or drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<T> {
    Complete(T),
    Incomplete(usize),
    Invalid(ParseError),
}

/// Borrowed view of a parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef<'a> {
    pub request_id: Uuid,
    /// Empty on responses that omit the method name.
    pub method: &'a str,
    pub payload: &'a [u8],
    /// Total encoded length of this frame.
    pub frame_len: usize,
}

/// Owned frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub request_id: Uuid,
    pub method: String,
    pub payload: Vec<u8>,
}

impl FrameRef<'_> {
    pub fn to_owned(&self) -> Frame {
        Frame {
            request_id: self.request_id,
            method: self.method.to_owned(),
            payload: self.payload.to_vec(),
        }
    }
}

/// Determine the total size of the frame at the start of `buf`.
#[inline]
pub fn frame_size(buf: &[u8]) -> ParseResult<usize> {
    if buf.len() < MIN_FRAME_LEN {
        return ParseResult::Incomplete(MIN_FRAME_LEN);
    }
    if buf[0] != MAGIC[0] || buf[1] != MAGIC[1] {
        return ParseResult::Invalid(ParseError::InvalidMagic);
    }
    if buf[2] != PROTOCOL_VERSION {
        return ParseResult::Invalid(ParseError::UnsupportedVersion(buf[2]));
    }

    let method_len = buf[METHOD_LEN_OFFSET] as usize;
    let content_len_at = MIN_FRAME_LEN + method_len;
    if buf.len() < content_len_at + CONTENT_LEN_SIZE {
        return ParseResult::Incomplete(content_len_at + CONTENT_LEN_SIZE);
    }

    let content_len = u32::from_le_bytes([
        buf[content_len_at],
        buf[content_len_at + 1],
        buf[content_len_at + 2],
        buf[content_len_at + 3],
    ]) as usize;

    let total = content_len_at + CONTENT_LEN_SIZE + content_len;
    if total > MAX_FRAME_LEN {
        return ParseResult::Invalid(ParseError::FrameTooLarge(total));
    }
    if buf.len() < total {
        return ParseResult::Incomplete(total);
    }
    ParseResult::Complete(total)
}

/// Parse a complete frame from the start of `buf`.
#[inline]
pub fn parse_frame(buf: &[u8]) -> ParseResult<FrameRef<'_>> {
    let total = match frame_size(buf) {
        ParseResult::Complete(n) => n,
        ParseResult::Incomplete(n) => return ParseResult::Incomplete(n),
        ParseResult::Invalid(e) => return ParseResult::Invalid(e),
    };

    let mut id = [0u8; REQUEST_ID_LEN];
    id.copy_from_slice(&buf[ID_OFFSET..ID_OFFSET + REQUEST_ID_LEN]);
    let request_id = Uuid::from_bytes(id);

    let method_len = buf[METHOD_LEN_OFFSET] as usize;
    let method = match std::str::from_utf8(&buf[MIN_FRAME_LEN..MIN_FRAME_LEN + method_len]) {
        Ok(m) => m,
        Err(_) => return ParseResult::Invalid(ParseError::InvalidMethod),
    };

    let payload_at = MIN_FRAME_LEN + method_len + CONTENT_LEN_SIZE;
    ParseResult::Complete(FrameRef {
        request_id,
        method,
        payload: &buf[payload_at..total],
        frame_len: total,
    })
}

/// Extract only the request id, for error responses to unparseable requests.
#[inline]
pub fn peek_request_id(buf: &[u8]) -> Option<Uuid> {
    if buf.len() < ID_OFFSET + REQUEST_ID_LEN {
        return None;
    }
    let mut id = [0u8; REQUEST_ID_LEN];
    id.copy_from_slice(&buf[ID_OFFSET..ID_OFFSET + REQUEST_ID_LEN]);
    Some(Uuid::from_bytes(id))
}

fn encode(request_id: Uuid, method: &str, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if method.len() > u8::MAX as usize {
        return Err(EncodeError::MethodTooLong);
    }
    let total = MIN_FRAME_LEN + method.len() + CONTENT_LEN_SIZE + payload.len();
    if total > MAX_FRAME_LEN {
        return Err(EncodeError::FrameTooLarge(total));
    }

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&MAGIC);
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(request_id.as_bytes());
    out.push(method.len() as u8);
    out.extend_from_slice(method.as_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Encode a request frame. The method name is mandatory.
pub fn encode_request(
    request_id: Uuid,
    method: &str,
    payload: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    encode(request_id, method, payload)
}

/// Encode a response frame. The method name is omitted (length 0).
pub fn encode_response(request_id: Uuid, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    encode(request_id, "", payload)
}

/// JSON body of an error response: `{"status":"error","message":...}`.
pub fn error_body(message: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "status": "error",
        "message": message,
    }))
    .unwrap_or_else(|_| br#"{"status":"error","message":"internal_error"}"#.to_vec())
}

/// Build a complete error response frame echoing `request_id`.
pub fn error_frame(request_id: Uuid, message: &str) -> Vec<u8> {
    let body = error_body(message);
    // An error body is always far below the frame cap.
    let total = MIN_FRAME_LEN + CONTENT_LEN_SIZE + body.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&MAGIC);
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(request_id.as_bytes());
    out.push(0);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(buf: &[u8]) -> FrameRef<'_> {
        match parse_frame(buf) {
            ParseResult::Complete(f) => f,
            other => panic!("expected complete frame, got {other:?}"),
        }
    }

    #[test]
    fn request_round_trip() {
        let id = Uuid::new_v4();
        let encoded = encode_request(id, "send_otp", br#"{"email":"a@x"}"#).unwrap();
        let frame = decode(&encoded);
        assert_eq!(frame.request_id, id);
        assert_eq!(frame.method, "send_otp");
        assert_eq!(frame.payload, br#"{"email":"a@x"}"#);
        assert_eq!(frame.frame_len, encoded.len());
    }

    #[test]
    fn response_omits_method() {
        let id = Uuid::new_v4();
        let encoded = encode_response(id, b"{}").unwrap();
        let frame = decode(&encoded);
        assert_eq!(frame.request_id, id);
        assert_eq!(frame.method, "");
        assert_eq!(frame.payload, b"{}");
    }

    #[test]
    fn reencoding_a_decoded_frame_is_identity() {
        let id = Uuid::new_v4();
        let encoded = encode_request(id, "login_user", br#"{"username":"alice"}"#).unwrap();
        let frame = decode(&encoded);
        let again = encode_request(frame.request_id, frame.method, frame.payload).unwrap();
        assert_eq!(again, encoded);
    }

    #[test]
    fn incomplete_header_reports_needed_bytes() {
        assert_eq!(
            frame_size(&[0x55]),
            ParseResult::Incomplete(MIN_FRAME_LEN)
        );
    }

    #[test]
    fn incomplete_body_reports_total() {
        let id = Uuid::new_v4();
        let encoded = encode_request(id, "ping", b"{}").unwrap();
        let total = encoded.len();
        match frame_size(&encoded[..total - 1]) {
            ParseResult::Incomplete(n) => assert_eq!(n, total),
            other => panic!("expected incomplete, got {other:?}"),
        }
    }

    #[test]
    fn invalid_magic_detected() {
        let mut encoded = encode_request(Uuid::new_v4(), "ping", b"{}").unwrap();
        encoded[0] = 0xAA;
        assert_eq!(
            frame_size(&encoded),
            ParseResult::Invalid(ParseError::InvalidMagic)
        );
    }

    #[test]
    fn unsupported_version_detected() {
        let mut encoded = encode_request(Uuid::new_v4(), "ping", b"{}").unwrap();
        encoded[2] = 0x02;
        assert_eq!(
            frame_size(&encoded),
            ParseResult::Invalid(ParseError::UnsupportedVersion(0x02))
        );
    }

    #[test]
    fn oversized_declared_length_rejected_without_body() {
        // Header that claims a content length far past the cap; no body needed
        // to detect the violation.
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(PROTOCOL_VERSION);
        buf.extend_from_slice(Uuid::new_v4().as_bytes());
        buf.push(0);
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        match frame_size(&buf) {
            ParseResult::Invalid(ParseError::FrameTooLarge(_)) => {}
            other => panic!("expected too-large, got {other:?}"),
        }
    }

    #[test]
    fn frame_of_exactly_max_len_is_accepted() {
        let overhead = MIN_FRAME_LEN + CONTENT_LEN_SIZE;
        let payload = vec![b'x'; MAX_FRAME_LEN - overhead];
        let encoded = encode_response(Uuid::new_v4(), &payload).unwrap();
        assert_eq!(encoded.len(), MAX_FRAME_LEN);
        assert_eq!(frame_size(&encoded), ParseResult::Complete(MAX_FRAME_LEN));
    }

    #[test]
    fn frame_one_byte_past_max_is_rejected() {
        let overhead = MIN_FRAME_LEN + CONTENT_LEN_SIZE;
        let payload = vec![b'x'; MAX_FRAME_LEN - overhead + 1];
        assert_eq!(
            encode_response(Uuid::new_v4(), &payload),
            Err(EncodeError::FrameTooLarge(MAX_FRAME_LEN + 1))
        );
    }

    #[test]
    fn method_name_longer_than_255_rejected() {
        let method = "m".repeat(256);
        assert_eq!(
            encode_request(Uuid::new_v4(), &method, b"{}"),
            Err(EncodeError::MethodTooLong)
        );
    }

    #[test]
    fn non_utf8_method_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(PROTOCOL_VERSION);
        buf.extend_from_slice(Uuid::new_v4().as_bytes());
        buf.push(2);
        buf.extend_from_slice(&[0xFF, 0xFE]);
        buf.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            parse_frame(&buf),
            ParseResult::Invalid(ParseError::InvalidMethod)
        );
    }

    #[test]
    fn error_frame_carries_status_and_message() {
        let id = Uuid::new_v4();
        let encoded = error_frame(id, "Rate limit exceeded");
        let frame = decode(&encoded);
        assert_eq!(frame.request_id, id);
        assert_eq!(frame.method, "");
        let body: serde_json::Value = serde_json::from_slice(frame.payload).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Rate limit exceeded");
    }

    #[test]
    fn peek_request_id_matches_parse() {
        let id = Uuid::new_v4();
        let encoded = encode_request(id, "ping", b"{}").unwrap();
        assert_eq!(peek_request_id(&encoded), Some(id));
        assert_eq!(peek_request_id(&encoded[..10]), None);
    }
}

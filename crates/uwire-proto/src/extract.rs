//! Frame extraction from a connection accumulator.
//!
//! Both peers append raw socket reads into a [`CircularBuffer`] and drain
//! complete frames from it. On a magic or version mismatch the stream is
//! resynchronized by scanning forward to the next magic pair; when none is
//! found the accumulator is cleared.

use uwire_core::CircularBuffer;

use crate::frame::{frame_size, ParseError, ParseResult, MAGIC, MIN_FRAME_LEN};

/// Largest possible header: fixed part + 255 method bytes + content length.
const MAX_HEADER_LEN: usize = MIN_FRAME_LEN + u8::MAX as usize + 4;

/// One step of draining the accumulator.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameEvent {
    /// A complete frame, copied out of the accumulator.
    Frame(Vec<u8>),
    /// Corrupt bytes were skipped while hunting for the next magic pair.
    Resync { skipped: usize },
}

/// Drain the next event from the accumulator.
///
/// Returns `Ok(None)` when more bytes are needed. A [`ParseError`] is only
/// returned for violations that must drop the connection (oversized frames);
/// magic/version mismatches surface as [`FrameEvent::Resync`] instead.
pub fn next_event(acc: &mut CircularBuffer) -> Result<Option<FrameEvent>, ParseError> {
    if acc.len() < MIN_FRAME_LEN {
        return Ok(None);
    }

    let header = acc
        .peek(acc.len().min(MAX_HEADER_LEN))
        .unwrap_or_default();

    match frame_size(&header) {
        ParseResult::Complete(total) => match acc.read(total) {
            Some(bytes) => Ok(Some(FrameEvent::Frame(bytes))),
            None => Ok(None),
        },
        // `needed` is the total frame size whenever the peeked window held
        // the whole header; a body longer than the window lands here.
        ParseResult::Incomplete(needed) if acc.len() >= needed => match acc.read(needed) {
            Some(bytes) => Ok(Some(FrameEvent::Frame(bytes))),
            None => Ok(None),
        },
        ParseResult::Incomplete(_) => Ok(None),
        ParseResult::Invalid(e) => handle_invalid(acc, e),
    }
}

fn handle_invalid(
    acc: &mut CircularBuffer,
    err: ParseError,
) -> Result<Option<FrameEvent>, ParseError> {
    match err {
        ParseError::FrameTooLarge(_) => Err(err),
        _ => {
            // Scan forward for the next magic pair and resume there.
            acc.skip(1);
            match acc.find_pattern(&MAGIC) {
                Some(offset) => {
                    acc.skip(offset);
                    Ok(Some(FrameEvent::Resync {
                        skipped: 1 + offset,
                    }))
                }
                None => {
                    let skipped = 1 + acc.len();
                    acc.clear();
                    Ok(Some(FrameEvent::Resync { skipped }))
                }
            }
        }
    }
}

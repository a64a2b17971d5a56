//! Byte-level decoder driving a [`FrameExtractor`].
//!
//! Wraps an extractor so it can be used as the codec parameter for
//! [`tokio_util::codec::FramedRead`]. Network chunk boundaries are
//! arbitrary, so the codec:
//!
//! - decodes UTF-8 incrementally, holding back a multi-byte character that
//!   is split across chunks until its remaining bytes arrive;
//! - queues every frame extracted from a chunk and yields them one by one;
//! - caps the retained partial frame at `max_frame_bytes`, discarding it
//!   with a warning so a runaway frame cannot exhaust memory.
//!
//! The codec never returns a framing error: `FramedRead` ends the stream
//! after the first decoder error, and one bad frame must not abort the turn.
//!
//! # Examples
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use agent_stream::framing::{FrameCodec, FramingMode};
//!
//! let frames = FramedRead::new(body, FrameCodec::new(FramingMode::Lines, 1 << 20));
//! ```

use std::collections::VecDeque;
use std::mem;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use super::{Extraction, FrameExtractor, FramingMode};
use crate::{AppError, Result};

/// Decoder yielding complete frames as strings.
#[derive(Debug)]
pub struct FrameCodec {
    extractor: Box<dyn FrameExtractor>,
    buffer: String,
    ready: VecDeque<String>,
    max_frame_bytes: usize,
    truncated: bool,
}

impl FrameCodec {
    /// Create a codec for `mode` with the given partial-frame cap.
    #[must_use]
    pub fn new(mode: FramingMode, max_frame_bytes: usize) -> Self {
        Self::with_extractor(mode.extractor(), max_frame_bytes)
    }

    /// Create a codec around an arbitrary extractor.
    #[must_use]
    pub fn with_extractor(extractor: Box<dyn FrameExtractor>, max_frame_bytes: usize) -> Self {
        Self {
            extractor,
            buffer: String::new(),
            ready: VecDeque::new(),
            max_frame_bytes,
            truncated: false,
        }
    }

    /// Text currently retained as an incomplete frame.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Whether the stream ended inside an incomplete frame.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    fn absorb(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }

        let Extraction { frames, remainder } = self.extractor.extract(&self.buffer, chunk);
        self.buffer = remainder;
        self.ready.extend(frames);

        if self.buffer.len() > self.max_frame_bytes {
            warn!(
                retained_bytes = self.buffer.len(),
                max_frame_bytes = self.max_frame_bytes,
                "frame codec: partial frame exceeds limit, discarding"
            );
            self.buffer.clear();
        }
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = AppError;

    /// Return the next complete frame, or `Ok(None)` while buffering.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.ready.pop_front() {
            return Ok(Some(frame));
        }

        let chunk = take_utf8(src);
        self.absorb(&chunk);
        Ok(self.ready.pop_front())
    }

    /// Drain queued frames, then flush the retained buffer at EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if !src.is_empty() {
            // Only an incomplete multi-byte sequence can remain here.
            let tail = String::from_utf8_lossy(&src.split()).into_owned();
            self.absorb(&tail);
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
        }

        if !self.buffer.is_empty() {
            let buffer = mem::take(&mut self.buffer);
            match self.extractor.finish(&buffer) {
                Some(frame) => self.ready.push_back(frame),
                None if !buffer.trim().is_empty() => {
                    self.truncated = true;
                    debug!(
                        retained_bytes = buffer.len(),
                        "frame codec: discarding incomplete frame at end of stream"
                    );
                }
                None => {}
            }
        }

        Ok(self.ready.pop_front())
    }
}

/// Split the longest decodable UTF-8 prefix off `src`.
///
/// Invalid sequences are replaced with U+FFFD; a trailing incomplete
/// sequence stays in `src` for the next read.
fn take_utf8(src: &mut BytesMut) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(&src[..]) {
            Ok(text) => {
                out.push_str(text);
                src.clear();
                return out;
            }
            Err(err) => {
                let valid = err.valid_up_to();
                out.push_str(std::str::from_utf8(&src[..valid]).unwrap_or_default());
                match err.error_len() {
                    None => {
                        src.advance(valid);
                        return out;
                    }
                    Some(invalid) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        src.advance(valid + invalid);
                    }
                }
            }
        }
    }
}

//! Framing of streamed response bodies into complete JSON values.
//!
//! Two protocols are supported, selected by [`FramingMode`]:
//! - [`LineExtractor`]: newline-delimited JSON, one value per line.
//! - [`BraceExtractor`]: concatenated JSON objects delimited by brace depth.
//!
//! Both implement [`FrameExtractor`], a pure `(buffer, chunk) -> (frames,
//! remainder)` function. [`FrameCodec`] adapts either one to
//! [`tokio_util::codec::Decoder`] so it can drive a
//! [`FramedRead`](tokio_util::codec::FramedRead) over network bytes.

pub mod brace;
pub mod codec;
pub mod lines;

use std::fmt::Debug;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use brace::BraceExtractor;
pub use codec::FrameCodec;
pub use lines::LineExtractor;

/// Output of one extraction step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Complete candidate values, in stream order.
    pub frames: Vec<String>,
    /// Text to retain as the buffer for the next chunk.
    pub remainder: String,
}

/// Capability shared by the framing protocols.
pub trait FrameExtractor: Debug + Send + Sync {
    /// Split `buffer` followed by `chunk` into complete frames and the
    /// retained remainder.
    ///
    /// Must be pure: the result depends only on the two inputs.
    fn extract(&self, buffer: &str, chunk: &str) -> Extraction;

    /// Flush the retained buffer at end of stream.
    ///
    /// Returns a final frame when the protocol allows an unterminated one.
    fn finish(&self, buffer: &str) -> Option<String>;
}

/// Framing protocol of the streaming endpoint.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Newline-delimited JSON with token deltas and node highlights.
    #[default]
    Lines,
    /// Concatenated JSON objects carrying quasi-JSON domain events.
    Concatenated,
}

impl FramingMode {
    /// Extractor implementing this protocol.
    #[must_use]
    pub fn extractor(self) -> Box<dyn FrameExtractor> {
        match self {
            Self::Lines => Box::new(LineExtractor),
            Self::Concatenated => Box::new(BraceExtractor),
        }
    }
}

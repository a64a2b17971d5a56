//! Brace-counted framing for concatenated JSON objects.
//!
//! Depth counting does not special-case braces inside quoted strings: a
//! string value containing an unbalanced `{` or `}` desynchronizes framing.
//! Balanced braces inside strings (such as an embedded quasi-JSON object)
//! frame correctly.

use super::{Extraction, FrameExtractor};

/// Emits each top-level `{ ... }` span once its depth returns to zero.
///
/// The remainder is either empty or starts at the opener of an unclosed
/// object, so a non-empty buffer at end of stream means a truncated frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct BraceExtractor;

impl FrameExtractor for BraceExtractor {
    fn extract(&self, buffer: &str, chunk: &str) -> Extraction {
        let mut text = String::with_capacity(buffer.len() + chunk.len());
        text.push_str(buffer);
        text.push_str(chunk);

        let mut frames = Vec::new();
        let mut depth: usize = 0;
        let mut start: Option<usize> = None;

        for (idx, byte) in text.bytes().enumerate() {
            match byte {
                b'{' => {
                    if depth == 0 {
                        start = Some(idx);
                    }
                    depth += 1;
                }
                b'}' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(open) = start.take() {
                            frames.push(text[open..=idx].to_owned());
                        }
                    }
                }
                _ => {}
            }
        }

        // Only an unclosed object is worth keeping; text outside one is noise.
        let remainder = start.map_or_else(String::new, |open| text.split_off(open));

        Extraction { frames, remainder }
    }

    fn finish(&self, _buffer: &str) -> Option<String> {
        None
    }
}

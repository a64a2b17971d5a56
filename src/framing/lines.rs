//! Newline-delimited framing.

use super::{Extraction, FrameExtractor};

/// Splits the stream on line terminators.
///
/// Each complete line is one frame. The trailing, possibly incomplete line
/// is retained. `\r\n` terminators are accepted and whitespace-only lines
/// are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineExtractor;

impl FrameExtractor for LineExtractor {
    fn extract(&self, buffer: &str, chunk: &str) -> Extraction {
        let mut text = String::with_capacity(buffer.len() + chunk.len());
        text.push_str(buffer);
        text.push_str(chunk);

        let Some(last_newline) = text.rfind('\n') else {
            return Extraction {
                frames: Vec::new(),
                remainder: text,
            };
        };

        let remainder = text.split_off(last_newline + 1);
        let frames = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect();

        Extraction { frames, remainder }
    }

    fn finish(&self, buffer: &str) -> Option<String> {
        let line = buffer.strip_suffix('\r').unwrap_or(buffer);
        (!line.trim().is_empty()).then(|| line.to_owned())
    }
}

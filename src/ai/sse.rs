use serde::Deserialize;

use super::StreamDelta;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Accumulates raw body bytes and hands back complete lines.
///
/// Reads may split a line anywhere, including inside a multi-byte UTF-8
/// sequence, so bytes are only decoded once their terminating `\n` arrived.
/// The trailing partial line stays buffered for the next read.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Whatever is left once the body ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }

    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let line = String::from_utf8_lossy(bytes);
    line.trim_end_matches('\r').to_string()
}

/// Payload of a `data: ` line, `None` for comments, blanks and other fields.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(StreamDelta),
    Done,
    /// Not an event, or an event with nothing to append.
    Skip,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

/// Decode one line of an OpenAI-compatible chat-completion stream.
///
/// Unparseable payloads are skipped rather than failing the stream.
pub fn parse_event(line: &str) -> SseEvent {
    let Some(payload) = data_payload(line) else {
        return SseEvent::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return SseEvent::Done;
    }

    let chunk: CompletionChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            log::debug!("Skipping undecodable stream line ({}): {}", e, payload);
            return SseEvent::Skip;
        }
    };

    let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) else {
        return SseEvent::Skip;
    };

    let delta = StreamDelta {
        content: delta.content.filter(|s| !s.is_empty()),
        reasoning: delta.reasoning_content.filter(|s| !s.is_empty()),
    };
    if delta.is_empty() {
        SseEvent::Skip
    } else {
        SseEvent::Delta(delta)
    }
}

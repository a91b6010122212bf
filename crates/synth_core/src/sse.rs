//! Incremental Server-Sent-Events framing.
//!
//! The decoder is fed raw body chunks in arrival order and yields complete
//! events. Lines are only decoded once their terminating newline has arrived,
//! so chunk boundaries (including ones that split a UTF-8 sequence) never
//! change the output.

use crate::StreamEvent;

pub const DEFAULT_EVENT_NAME: &str = "message";

#[derive(Debug, Clone)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event_name: String,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            event_name: DEFAULT_EVENT_NAME.to_string(),
        }
    }

    /// Name applied to the next `data:` line. Persists across blank lines
    /// until another `event:` line replaces it.
    pub fn current_event(&self) -> &str {
        &self.event_name
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..start);
        events
    }

    /// Flushes a final line left without a trailing newline at end of stream.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).into_owned();
        self.process_line(&line).into_iter().collect()
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(name) = line.strip_prefix("event:") {
            self.event_name = name.trim().to_string();
            return None;
        }
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() {
            return None;
        }
        Some(StreamEvent::from_data(&self.event_name, data))
    }
}

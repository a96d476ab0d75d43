// Incremental decoder for `text/event-stream` bodies
//
// Only `data` fields are collected; `event`, `id`, `retry` and comment lines
// are accepted and dropped. Chunks may split lines (and UTF-8 sequences)
// anywhere. A line longer than the cap is discarded up to its newline,
// together with the event it belonged to.

use tracing::warn;

/// Longest line kept while waiting for its newline
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Turns raw body chunks into the data payload of each complete event
#[derive(Debug)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
    max_line_len: usize,
    discarding: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line_len(MAX_LINE_LEN)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            data: Vec::new(),
            max_line_len,
            discarding: false,
        }
    }

    /// Bytes held for an incomplete line
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one body chunk; returns the payloads of every event it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        if self.pending.len() > self.max_line_len {
            warn!(
                "Discarding event-stream line longer than {} bytes",
                self.max_line_len
            );
            self.pending.clear();
            self.data.clear();
            self.discarding = true;
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            return Some(payload);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}

//! Server-sent event decoding for provider token streams.
//!
//! DESIGN
//! ======
//! Both providers deliver generation streams as `text/event-stream` bodies.
//! `SseDecoder` is a pure incremental decoder: feed it raw byte chunks in
//! arrival order and it yields the `data:` payload of each completed event.
//! Chunk boundaries never align with event boundaries, so the decoder buffers
//! partial lines between pushes. Event names, ids, retry hints, and comment
//! lines are dropped — the payloads carry everything the engine needs.

/// Incremental `text/event-stream` decoder.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes; returns the data payloads of every event
    /// completed by this chunk, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    events.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
            // "event:", "id:", "retry:", and ":" comment lines carry no payload.
        }
        events
    }
}

#[cfg(test)]
#[path = "sse_test.rs"]
mod tests;

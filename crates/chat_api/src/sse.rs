use crate::events::{StreamEvent, StreamFrame};

/// Incremental parser for SSE byte streams.
///
/// Bytes are buffered until a blank line closes a frame, so multi-byte
/// characters split across network reads are decoded intact.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.contains(&b'\r') {
            self.buffer = normalize_newlines(&self.buffer);
        }
        let mut events = Vec::new();

        while let Some(split) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..split + 2).collect();

            let frame = match std::str::from_utf8(&frame[..split]) {
                Ok(frame) => frame,
                Err(error) => {
                    tracing::trace!(%error, "dropping stream frame with invalid UTF-8");
                    continue;
                }
            };

            if let Some(payload) = extract_data_payload(frame) {
                if let Some(event) = decode_payload(&payload) {
                    events.push(event);
                }
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<StreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

/// Collapse `\r\n` to `\n`. A trailing lone `\r` is kept until its pair arrives.
fn normalize_newlines(buffer: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buffer.len());
    let mut bytes = buffer.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte == b'\r' && bytes.peek() == Some(&b'\n') {
            continue;
        }
        out.push(byte);
    }
    out
}

/// Decode one `data:` payload into a [`StreamEvent`].
///
/// Returns `None` for anything that is not a JSON object carrying one of the
/// known fields; such frames are transport noise.
pub fn decode_payload(payload: &str) -> Option<StreamEvent> {
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamFrame>(payload) {
        Ok(frame) => frame.into_event(),
        Err(error) => {
            tracing::trace!(%error, "dropping malformed stream frame");
            None
        }
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

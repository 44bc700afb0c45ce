use serde_json::Value;

use crate::events::StreamEvent;

/// Payload that signals end-of-stream without emitting a final event.
pub const END_OF_STREAM_SENTINEL: &str = "[DONE]";

/// Incremental decoder for the SSE-framed event stream.
///
/// Frames are separated by a blank line; each frame may span multiple
/// `data:` lines, which are joined with `\n` before being treated as one
/// payload. Partial chunks are buffered until a complete frame is
/// available, so chunk boundaries may fall anywhere, including mid-line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    done: bool,
}

impl SseDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }

        // Carriage returns are normalized away before framing so a CRLF
        // split across two chunks cannot corrupt the frame boundary.
        let chunk = String::from_utf8_lossy(bytes);
        self.buffer.extend(chunk.chars().filter(|ch| *ch != '\r'));

        let mut events = Vec::new();
        while !self.done {
            let Some(split) = self.buffer.find("\n\n") else {
                break;
            };
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);
            self.decode_frame(&frame, &mut events);
        }

        if self.done {
            self.buffer.clear();
        }

        events
    }

    /// Flushes a buffered partial frame on stream end. Further input is
    /// ignored afterwards.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        let frame = std::mem::take(&mut self.buffer);
        if !frame.trim().is_empty() {
            self.decode_frame(&frame, &mut events);
        }
        self.done = true;
        events
    }

    /// Decode a complete stream in one shot, including the trailing flush.
    pub fn decode_all(input: &str) -> Vec<StreamEvent> {
        let mut decoder = Self::default();
        let mut events = decoder.feed(input.as_bytes());
        events.extend(decoder.finish());
        events
    }

    /// True once the end sentinel has been observed or the stream flushed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }

    fn decode_frame(&mut self, frame: &str, events: &mut Vec<StreamEvent>) {
        let Some(payload) = extract_data_payload(frame) else {
            return;
        };

        if payload == END_OF_STREAM_SENTINEL {
            self.done = true;
            return;
        }

        match serde_json::from_str::<Value>(&payload) {
            Ok(value) => match StreamEvent::from_value(value) {
                Some(event) => events.push(event),
                None => log::warn!("dropping stream payload with missing fields: {payload}"),
            },
            Err(error) => log::warn!("dropping malformed stream payload: {error}"),
        }
    }
}

/// Joins the `data:` lines of one frame into a payload. Comment and
/// heartbeat lines (leading `:`) never carry a `data:` prefix and fall out
/// here.
fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::SseDecoder;

    #[test]
    fn feed_decodes_frames_incrementally() {
        let mut decoder = SseDecoder::default();
        let mut events = Vec::new();

        events.extend(decoder.feed(b"data: {\"type\":\"text-delta\",\"id\":\"b1\",\"delta\":\"Hello\"}\n\n"));
        assert_eq!(events.len(), 1);

        events.extend(decoder.feed(b"data: [DONE]\n\n"));
        assert_eq!(events.len(), 1);
        assert!(decoder.is_done());
        assert!(decoder.is_empty_buffer());
    }
}

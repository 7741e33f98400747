//! Incremental server-sent-events decoding

/// One decoded `data:` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    /// `data: [DONE]`
    Done,
}

/// Splits a byte stream into SSE data lines across chunk boundaries
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every complete data line it finished
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else if !data.is_empty() {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\n\n"), vec![SseEvent::Data("{\"a\":1}".into())]);
    }

    #[test]
    fn test_done_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\ndata: x\n\ndata: [DONE]\n");
        assert_eq!(events, vec![SseEvent::Data("x".into()), SseEvent::Done]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: é\n".as_bytes();
        assert!(decoder.push(&bytes[..7]).is_empty());
        assert_eq!(decoder.push(&bytes[7..]), vec![SseEvent::Data("é".into())]);
    }
}

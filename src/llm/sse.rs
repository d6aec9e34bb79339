/// Reassembles server-sent-event lines across network chunk boundaries.
///
/// Providers push raw byte chunks as they arrive and receive back the payloads of
/// every complete `data:` line. A line split over two chunks is held until its
/// newline shows up.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Payload of a trailing line that never got its newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut buf = SseBuffer::new();
        assert!(buf.push(b"data: {\"a\":").is_empty());
        assert_eq!(buf.push(b"1}\n\ndata: {\"b\":2}\n"), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn skips_non_data_lines_and_done() {
        let mut buf = SseBuffer::new();
        let out = buf.push(b": keep-alive\nevent: message\ndata: [DONE]\n\n");
        assert!(out.is_empty());
    }

    #[test]
    fn keeps_multibyte_characters_split_between_chunks() {
        let text = "data: ñ\n".as_bytes();
        let (head, tail) = text.split_at(7); // splits the two bytes of 'ñ'
        let mut buf = SseBuffer::new();
        assert!(buf.push(head).is_empty());
        assert_eq!(buf.push(tail), vec!["ñ"]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut buf = SseBuffer::new();
        assert!(buf.push(b"data: tail").is_empty());
        assert_eq!(buf.finish().as_deref(), Some("tail"));
        assert_eq!(buf.finish(), None);
    }
}

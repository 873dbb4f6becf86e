//! Incremental UTF-8 decoding of a chunked byte stream

const REPLACEMENT: char = '\u{FFFD}';

/// Decodes chunks that may split a multi-byte character across boundaries.
///
/// An incomplete trailing sequence is held back and prefixed to the next
/// chunk. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let joined;
        let mut rest: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            let mut buf = std::mem::take(&mut self.pending);
            buf.extend_from_slice(chunk);
            joined = buf;
            &joined
        };

        let mut out = String::with_capacity(rest.len());
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match err.error_len() {
                        Some(bad) => {
                            out.push(REPLACEMENT);
                            rest = &tail[bad..];
                        }
                        None => {
                            // incomplete sequence at the end, wait for more bytes
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream. A dangling partial character becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_multibyte_character_is_carried_over() {
        let bytes = "scan → done".as_bytes();
        // '→' is three bytes starting at index 5
        let mut decoder = Utf8ChunkDecoder::new();
        let first = decoder.decode(&bytes[..6]);
        assert_eq!(first, "scan ");

        let second = decoder.decode(&bytes[6..7]);
        assert_eq!(second, "");

        let third = decoder.decode(&bytes[7..]);
        assert_eq!(third, "→ done");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn invalid_bytes_become_replacement() {
        let mut decoder = Utf8ChunkDecoder::new();
        assert_eq!(decoder.decode(b"ok\xffok"), "ok\u{FFFD}ok");
    }

    #[test]
    fn truncated_tail_flushes_as_replacement() {
        let mut decoder = Utf8ChunkDecoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xE2, 0x86]), "a");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        // flushing clears the carried bytes
        assert_eq!(decoder.decode(b"b"), "b");
        assert_eq!(decoder.finish(), "");
    }
}

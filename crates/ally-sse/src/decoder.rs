/// Replacement character emitted for invalid or truncated sequences
const REPLACEMENT: char = '\u{FFFD}';

/// Stateful UTF-8 decoder for text that arrives in arbitrary byte chunks
///
/// A multi-byte character split across two network reads is held back until the
/// rest of it arrives instead of being mangled into replacement characters.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, carrying an incomplete trailing sequence over to the next call
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.partial);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));

                    if let Some(len) = e.error_len() {
                        out.push(REPLACEMENT);
                        rest = &after[len..];
                    } else {
                        // Truncated sequence at the end of the chunk
                        self.partial = after.to_vec();
                        break;
                    }
                }
            }
        }

        out
    }

    /// Flush a sequence left dangling when the stream ends
    pub fn finish(&mut self) -> String {
        if self.partial.is_empty() {
            String::new()
        } else {
            self.partial.clear();
            REPLACEMENT.to_string()
        }
    }

    /// Whether bytes are waiting for the rest of their character
    pub fn has_pending(&self) -> bool {
        !self.partial.is_empty()
    }
}

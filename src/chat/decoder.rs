// Incremental UTF-8 decoding for streamed response bodies
//
// Network chunks can split a multi-byte character anywhere. The decoder
// keeps the undecodable tail of each chunk and prepends it to the next,
// so fragments always come out as whole characters in arrival order.

/// Streaming UTF-8 decoder with partial-code-point carry-over.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, returning every whole character available so far.
    /// Invalid sequences decode to U+FFFD instead of failing the stream.
    pub fn decode(&mut self, input: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(input);

        let mut out = String::new();
        let mut pos = 0;

        while pos < buf.len() {
            match std::str::from_utf8(&buf[pos..]) {
                Ok(s) => {
                    out.push_str(s);
                    pos = buf.len();
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if valid > 0 {
                        if let Ok(s) = std::str::from_utf8(&buf[pos..pos + valid]) {
                            out.push_str(s);
                        }
                        pos += valid;
                    }

                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            pos += bad;
                        }
                        None => {
                            // Incomplete code point at the end of the chunk;
                            // hold it for the next one
                            self.pending = buf[pos..].to_vec();
                            return out;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush at end of stream. A leftover partial code point (truncated
    /// stream) decodes to a single U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

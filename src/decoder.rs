//! Incremental UTF-8 decoding for chunked response bodies.
//!
//! Network chunks do not respect character boundaries: a three-byte character
//! can arrive as one byte at the end of one chunk and two at the start of the
//! next. [`Utf8ChunkDecoder`] holds the incomplete tail between calls so every
//! emitted string contains only whole characters.

/// Stateful decoder. Feed chunks in arrival order with [`decode`](Self::decode)
/// and call [`finish`](Self::finish) once the body ends.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of an incomplete character carried over from the last chunk.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Decode `chunk`, prefixed by whatever was pending.
    ///
    /// Invalid sequences are replaced with U+FFFD. A truncated sequence at the
    /// end of the input is held back rather than replaced, since the rest of
    /// it may be in the next chunk.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush the decoder at end of input. Any incomplete trailing sequence
    /// becomes a single U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

//! Incremental UTF-8 decoding for chunked byte streams.
//!
//! Network chunks split wherever the transport pleases, including in the middle
//! of a multi-byte character. Decoding each chunk independently with
//! `from_utf8_lossy` would turn both halves into replacement glyphs, so the
//! decoder keeps the incomplete tail and retries it with the next chunk.

/// The replacement character substituted for malformed input.
pub const REPLACEMENT: char = '\u{FFFD}';

/// Stateful chunk-to-text decoder.
///
/// Output concatenated across all chunks is identical to decoding the whole
/// byte sequence at once with `String::from_utf8_lossy`.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    /// Undecoded tail of a multi-byte character (at most 3 bytes).
    pending: Vec<u8>,
    /// Number of malformed sequences replaced since the last reset.
    malformed: usize,
    /// Set once a final chunk has been decoded.
    finished: bool,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one chunk.
    ///
    /// With `is_final = false`, a trailing incomplete sequence is held back and
    /// prefixed to the next call. With `is_final = true`, it is emitted as a
    /// single U+FFFD instead of being dropped.
    pub fn decode(&mut self, chunk: &[u8], is_final: bool) -> String {
        let pending = std::mem::take(&mut self.pending);
        let joined;
        let input: &[u8] = if pending.is_empty() {
            chunk
        } else {
            joined = [pending.as_slice(), chunk].concat();
            &joined
        };

        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        out.push_str(valid);
                    }

                    match err.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            self.malformed += 1;
                            rest = &after[len..];
                        }
                        None if is_final => {
                            out.push(REPLACEMENT);
                            self.malformed += 1;
                            break;
                        }
                        None => {
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }

        if is_final {
            self.finished = true;
        }

        out
    }

    /// Flushes any held-back bytes as the end of the stream.
    pub fn finish(&mut self) -> String {
        self.decode(&[], true)
    }

    /// Number of bytes waiting for the rest of their character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of malformed sequences replaced since the last reset.
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drops any carried-over bytes and clears counters for a new stream.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.malformed = 0;
        self.finished = false;
    }
}

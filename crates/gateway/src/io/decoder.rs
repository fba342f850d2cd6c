use std::mem;

const REPLACEMENT_CHARACTER: char = char::REPLACEMENT_CHARACTER;

/// A stateful UTF-8 decoder.
///
/// Network chunks can end in the middle of a multi-byte character, so the
/// incomplete tail of one chunk is held back and prefixed to the next.
/// Invalid sequences are replaced with U+FFFD instead of failing the
/// stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decodes `bytes` and appends the text to `out`.
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) {
        let joined;
        let input: &[u8] = if self.pending.is_empty() {
            bytes
        } else {
            self.pending.extend_from_slice(bytes);
            joined = mem::take(&mut self.pending);
            &joined
        };

        let mut chunks = input.utf8_chunks().peekable();
        while let Some(chunk) = chunks.next() {
            out.push_str(chunk.valid());
            let invalid = chunk.invalid();
            if invalid.is_empty() {
                continue;
            }
            if chunks.peek().is_none() && is_truncated(invalid) {
                // Incomplete sequence at the end, wait for the next chunk.
                self.pending.extend_from_slice(invalid);
            } else {
                out.push(REPLACEMENT_CHARACTER);
            }
        }
    }

    /// Flushes a dangling incomplete sequence at end of input.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            self.pending.clear();
            out.push(REPLACEMENT_CHARACTER);
        }
    }
}

/// Returns `true` if `bytes` is the start of a valid sequence that was cut
/// short.
#[inline]
fn is_truncated(bytes: &[u8]) -> bool {
    matches!(std::str::from_utf8(bytes), Err(err) if err.error_len().is_none())
}

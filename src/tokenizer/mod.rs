
use anyhow::{Context, Result, anyhow};
use tiktoken_rs::{CoreBPE, cl100k_base};

/// Token id produced by the encoder.
pub type Token = u32;

/// How many tokens may be dropped from a window edge while searching for a
/// decodable slice. A UTF-8 scalar spans at most four bytes, and cl100k
/// never splits one scalar across more than four tokens.
const MAX_EDGE_TRIM: usize = 4;

/// Byte-pair encoder used for all token accounting in the pipeline.
///
/// Wraps the `cl100k_base` encoding so that chunk sizes line up with the
/// token accounting of the target vector store. Token counts from this
/// type are the only authoritative measure of text size; character and
/// byte lengths are never used for chunk boundaries.
pub struct Bpe {
    inner: CoreBPE,
}

impl Bpe {
    /// Load the `cl100k_base` encoding.
    #[inline]
    pub fn new() -> Result<Self> {
        let inner = cl100k_base().context("Failed to load cl100k_base encoding")?;
        Ok(Self { inner })
    }

    /// Encode text into token ids.
    #[inline]
    pub fn encode(&self, text: &str) -> Vec<Token> {
        self.inner.encode_with_special_tokens(text)
    }

    /// Number of tokens in `text`.
    #[inline]
    pub fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Decode a full token sequence back into text.
    #[inline]
    pub fn decode(&self, tokens: &[Token]) -> Result<String> {
        self.inner
            .decode(tokens.to_vec())
            .map_err(|e| anyhow!("Token decode failed: {e}"))
    }

    /// Decode a window sliced out of a longer token sequence.
    ///
    /// A slice boundary can land inside a multi-byte character, in which
    /// case a straight decode produces invalid UTF-8. Rather than emitting
    /// replacement characters, trim up to [`MAX_EDGE_TRIM`] tokens from the
    /// trailing and then the leading edge until the window decodes cleanly.
    #[inline]
    pub fn decode_window(&self, window: &[Token]) -> Result<String> {
        for total in 0..=(2 * MAX_EDGE_TRIM) {
            for from_end in 0..=total.min(MAX_EDGE_TRIM) {
                let from_start = total - from_end;
                if from_start > MAX_EDGE_TRIM || from_start + from_end >= window.len() {
                    continue;
                }
                let slice = &window[from_start..window.len() - from_end];
                if let Ok(text) = self.inner.decode(slice.to_vec()) {
                    return Ok(text);
                }
            }
        }
        Err(anyhow!(
            "Token window of {} tokens could not be decoded to valid UTF-8",
            window.len()
        ))
    }
}

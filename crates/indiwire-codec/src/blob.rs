//! BLOB framing: base64 content wrapped into fixed-width lines.

use bytes::Bytes;

use crate::base64;
use crate::error::{CodecError, Result};

/// Column width used when BLOB content is written.
pub const BLOB_LINE_WIDTH: usize = 72;

/// Suffix marking a compressed BLOB format (e.g. `.fits.z`).
pub const COMPRESSED_SUFFIX: &str = ".z";

/// True when the format names a compressed payload.
pub fn is_compressed(format: &str) -> bool {
    format.ends_with(COMPRESSED_SUFFIX)
}

/// Insert a newline after every `width` characters and after a final partial line.
///
/// An empty input stays empty.
pub fn wrap(encoded: &str, width: usize) -> String {
    if width == 0 {
        return encoded.to_string();
    }
    let bytes = encoded.as_bytes();
    let mut out = String::with_capacity(bytes.len() + bytes.len() / width + 1);
    for line in bytes.chunks(width) {
        out.extend(line.iter().copied().map(char::from));
        out.push('\n');
    }
    out
}

/// A BLOB as it travels on the wire.
///
/// `size` is the payload size after decompression (for `.z` formats) while
/// `enclen` always counts the encoded characters actually sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobFrame {
    pub format: String,
    pub size: usize,
    pub enclen: usize,
    pub encoded: String,
}

impl BlobFrame {
    /// Encode a payload. For uncompressed formats `size` is normally
    /// `payload.len()`; compressed payloads carry their inflated size.
    pub fn encode(format: impl Into<String>, size: usize, payload: &[u8]) -> Self {
        let encoded = base64::encode(payload);
        Self {
            format: format.into(),
            size,
            enclen: encoded.len(),
            encoded,
        }
    }

    /// Encoded content wrapped at `width` columns.
    pub fn wrapped(&self, width: usize) -> String {
        wrap(&self.encoded, width)
    }

    /// Decode wire text into the raw payload.
    ///
    /// When `enclen` is declared it must match the number of encoded
    /// characters received (line breaks and surrounding whitespace excluded).
    pub fn decode(text: &str, enclen: Option<usize>) -> Result<Bytes> {
        let trimmed = text.trim();
        if let Some(declared) = enclen {
            let actual = trimmed
                .bytes()
                .filter(|b| *b != b'\n' && *b != b'\r')
                .count();
            if declared != actual {
                return Err(CodecError::EnclenMismatch { declared, actual });
            }
        }
        let payload = base64::decode(trimmed)?;
        tracing::trace!(encoded = trimmed.len(), decoded = payload.len(), "decoded BLOB");
        Ok(Bytes::from(payload))
    }

    pub fn is_compressed(&self) -> bool {
        is_compressed(&self.format)
    }
}

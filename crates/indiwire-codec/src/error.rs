/// Errors that can occur while encoding or decoding wire data.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Base64 input length (newlines excluded) is not a multiple of 4.
    #[error("invalid base64 length {len} (must be a multiple of 4)")]
    InvalidLength { len: usize },

    /// Base64 input contains a byte outside the alphabet, or misplaced padding.
    #[error("invalid base64 byte 0x{byte:02x} at offset {offset}")]
    InvalidCharacter { byte: u8, offset: usize },

    /// The declared `enclen` does not match the encoded text actually received.
    #[error("BLOB enclen mismatch (declared {declared}, received {actual})")]
    EnclenMismatch { declared: usize, actual: usize },

    /// The element could not be tokenized.
    #[error("malformed XML: {0}")]
    MalformedXml(String),

    /// A single element grew past the configured maximum before it closed.
    #[error("element too large ({size} bytes, max {max})")]
    ElementTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing the stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, CodecError>;

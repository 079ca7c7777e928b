use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use bytes::BytesMut;

use crate::codec::{CodecConfig, ElementDecoder};
use crate::element::XmlElement;
use crate::error::{CodecError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete top-level elements from any `Read` stream.
///
/// Partial reads are buffered, so callers always get complete elements.
pub struct ElementReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: ElementDecoder,
    config: CodecConfig,
}

impl<T: Read> ElementReader<T> {
    /// Create a new element reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, CodecConfig::default())
    }

    /// Create a new element reader with explicit configuration.
    pub fn with_config(inner: T, config: CodecConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: ElementDecoder::new(config.max_element_size),
            config,
        }
    }

    /// Read the next complete element (blocking).
    ///
    /// Returns `Err(CodecError::ConnectionClosed)` when EOF is reached. A
    /// `MalformedXml` error leaves the reader positioned after the bad element.
    pub fn read_element(&mut self) -> Result<XmlElement> {
        loop {
            if let Some(element) = self.decoder.decode(&mut self.buf)? {
                return Ok(element);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CodecError::Io(err)),
            };

            if read == 0 {
                if self.buf.iter().any(|b| !b.is_ascii_whitespace()) {
                    tracing::debug!(pending = self.buf.len(), "stream ended inside an element");
                }
                return Err(CodecError::ConnectionClosed);
            }

            tracing::trace!(bytes = read, "read");
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum element size for subsequent decoding.
    pub fn set_max_element_size(&mut self, max_element_size: usize) {
        self.config.max_element_size = max_element_size;
        self.decoder.set_max_element_size(max_element_size);
    }

    /// Current reader configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}

impl<T: Read> Iterator for ElementReader<T> {
    type Item = Result<XmlElement>;

    /// Yields elements until the stream closes.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_element() {
            Err(CodecError::ConnectionClosed) => None,
            other => Some(other),
        }
    }
}

impl ElementReader<TcpStream> {
    /// Create an element reader for a `TcpStream` and apply read timeout from config.
    pub fn with_config_tcp(inner: TcpStream, config: CodecConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

use std::io::{ErrorKind, Write};
use std::net::TcpStream;

use bytes::BytesMut;

use crate::codec::CodecConfig;
use crate::error::{CodecError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete protocol messages to any `Write` stream.
///
/// Each message is written in full and flushed before the call returns, so
/// messages from one writer never interleave.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: CodecConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, CodecConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: CodecConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Send bytes that already hold one or more complete messages.
    pub fn send(&mut self, message: &[u8]) -> Result<()> {
        write_all(&mut self.inner, message)?;
        self.flush()
    }

    /// Build a message into the writer's reusable buffer, then send it.
    pub fn send_with<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&mut BytesMut),
    {
        self.buf.clear();
        build(&mut self.buf);
        tracing::trace!(bytes = self.buf.len(), "write");
        write_all(&mut self.inner, &self.buf)?;
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(CodecError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}

impl MessageWriter<TcpStream> {
    /// Create a message writer for a `TcpStream` and apply write timeout from config.
    pub fn with_config_tcp(inner: TcpStream, config: CodecConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

fn write_all<T: Write>(inner: &mut T, bytes: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        match inner.write(&bytes[offset..]) {
            Ok(0) => return Err(CodecError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(CodecError::Io(err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::BufMut;

    use super::*;

    #[test]
    fn send_writes_bytes() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(b"<a/>\n").unwrap();
        writer.send(b"<b/>\n").unwrap();
        assert_eq!(writer.into_inner().into_inner(), b"<a/>\n<b/>\n");
    }

    #[test]
    fn send_with_reuses_buffer() {
        let mut writer = MessageWriter::new(Vec::<u8>::new());
        writer
            .send_with(|buf| buf.put_slice(b"<first/>\n"))
            .unwrap();
        writer.send_with(|buf| buf.put_slice(b"<second/>\n")).unwrap();
        assert_eq!(writer.get_ref().as_slice(), b"<first/>\n<second/>\n");
    }

    #[test]
    fn zero_write_is_connection_closed() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut writer = MessageWriter::new(Closed);
        assert!(matches!(
            writer.send(b"<a/>").unwrap_err(),
            CodecError::ConnectionClosed
        ));
    }

    #[test]
    fn interrupted_writes_are_retried() {
        struct Flaky {
            interrupted: Arc<AtomicBool>,
            out: Vec<u8>,
        }
        impl Write for Flaky {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if !self.interrupted.swap(true, Ordering::SeqCst) {
                    return Err(std::io::Error::from(ErrorKind::Interrupted));
                }
                let n = buf.len().min(3);
                self.out.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let flag = Arc::new(AtomicBool::new(false));
        let mut writer = MessageWriter::new(Flaky {
            interrupted: Arc::clone(&flag),
            out: Vec::new(),
        });
        writer.send(b"<message/>").unwrap();
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(writer.get_ref().out, b"<message/>");
    }
}

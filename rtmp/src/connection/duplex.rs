use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_BUFFER_CAPACITY: usize = 4096;

/// A framed reader/writer over a byte-stream connection.
///
/// Reads are exact-size against an internal buffer, with non-consuming
/// `peek` and explicit `discard` so the chunk decoder can disambiguate
/// optional extended-timestamp bytes.  Writes accumulate into a buffer that
/// is flushed explicitly once per fully emitted message, so a multi-chunk
/// message crosses the wire as a single syscall batch when possible.
pub struct BufDuplex<S> {
    io: S,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> BufDuplex<S> {
    pub fn new(io: S) -> BufDuplex<S> {
        BufDuplex {
            io,
            read_buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            write_buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    /// Reads exactly `count` bytes, consuming them
    pub async fn read_exact(&mut self, count: usize) -> io::Result<Bytes> {
        self.fill(count).await?;
        Ok(self.read_buffer.split_to(count).freeze())
    }

    pub async fn read_u8(&mut self) -> io::Result<u8> {
        self.fill(1).await?;
        Ok(self.read_buffer.split_to(1)[0])
    }

    /// Returns the next `count` bytes without consuming them
    pub async fn peek(&mut self, count: usize) -> io::Result<&[u8]> {
        self.fill(count).await?;
        Ok(&self.read_buffer[..count])
    }

    /// Drops `count` already-buffered bytes.  Only valid after a `peek` of at
    /// least the same size.
    pub fn discard(&mut self, count: usize) {
        debug_assert!(count <= self.read_buffer.len());
        let available = count.min(self.read_buffer.len());
        let _ = self.read_buffer.split_to(available);
    }

    /// Completes once at least one byte is buffered, without consuming
    /// anything.  Cancellation safe: a cancelled call leaves every byte it
    /// read in the buffer.
    pub async fn readable(&mut self) -> io::Result<()> {
        self.fill(1).await
    }

    /// Appends bytes to the write buffer without touching the socket
    pub fn write(&mut self, bytes: &[u8]) {
        self.write_buffer.extend_from_slice(bytes);
    }

    /// Writes the buffered bytes out and flushes the underlying stream
    pub async fn flush(&mut self) -> io::Result<()> {
        if !self.write_buffer.is_empty() {
            let bytes = self.write_buffer.split().freeze();
            self.io.write_all(&bytes).await?;
        }

        self.io.flush().await
    }

    async fn fill(&mut self, count: usize) -> io::Result<()> {
        if self.read_buffer.len() >= count {
            return Ok(());
        }

        self.read_buffer.reserve(count - self.read_buffer.len());
        while self.read_buffer.len() < count {
            let bytes_read = self.io.read_buf(&mut self.read_buffer).await?;
            if bytes_read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
        }

        Ok(())
    }
}

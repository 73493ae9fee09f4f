use std::io;
use thiserror::Error;

/// Errors raised while reassembling RTMP chunks into messages
#[derive(Debug, Error)]
pub enum ChunkDecodeError {
    /// Non-fmt-0 chunks borrow header fields from the previous chunk on the
    /// same chunk stream, so one arriving before any fmt-0 chunk on that
    /// stream cannot be decoded
    #[error("Received chunk with format {fmt} on csid {csid} before any format 0 chunk")]
    NoPreviousChunk { csid: u32, fmt: u8 },

    /// A header-bearing chunk arrived while a message on the same chunk
    /// stream still had body bytes outstanding
    #[error("Received a new message header on csid {csid} while {remaining} body bytes were still outstanding")]
    InterruptedMessage { csid: u32, remaining: u32 },

    /// The SetChunkSize value is encoded in 31 bits, bounding what a peer
    /// may request
    #[error("Requested an invalid max chunk size of {chunk_size}")]
    InvalidMaxChunkSize { chunk_size: u32 },

    /// An I/O error occurred while reading from the connection
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Errors raised while splitting RTMP messages into chunks
#[derive(Debug, Error)]
pub enum ChunkEncodeError {
    /// Message bodies cannot exceed the 3 byte length field, 16,777,215
    /// bytes, even when split across many chunks
    #[error("The message has a length of {size} bytes, over the allowed 16777215")]
    MessageTooLong { size: usize },

    /// An I/O error occurred while writing to the connection
    #[error("{0}")]
    Io(#[from] io::Error),
}

use std::io;
use thiserror::Error;

/// Errors raised during the handshake.  All of them are fatal for the
/// connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// C0 announced a protocol version other than plain RTMP's 3
    #[error("Peer requested unsupported RTMP version {version}")]
    UnsupportedVersion { version: u8 },

    /// The peer disconnected or the socket failed mid-exchange
    #[error("{0}")]
    Io(#[from] io::Error),
}

use rivulet_amf0::{Amf0DeserializationError, Amf0SerializationError};
use std::io;
use thiserror::Error;

/// Errors raised while turning a message payload into a typed RTMP message
#[derive(Debug, Error)]
pub enum MessageDecodeError {
    /// The bytes in the message were not laid out the way the message type
    /// requires
    #[error("The message was not encoded in an expected format")]
    InvalidMessageFormat,

    /// The message bytes that should have been AMF0 values could not be read
    #[error("The message did not contain valid AMF0 encoded values: {0}")]
    Amf0(#[from] Amf0DeserializationError),

    /// Failed to read the values from the input buffer
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Errors raised while turning a typed RTMP message into a message payload
#[derive(Debug, Error)]
pub enum MessageEncodeError {
    /// A value could not be encoded as AMF0
    #[error("Failed to encode AMF0 values: {0}")]
    Amf0(#[from] Amf0SerializationError),

    /// Failed to write the message to the output buffer
    #[error("{0}")]
    Io(#[from] io::Error),
}

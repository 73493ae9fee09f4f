use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Errors raised while decoding AMF0 encoded bytes into values
#[derive(Debug, Error)]
pub enum Amf0DeserializationError {
    /// Encountered a type marker byte this implementation does not know about
    #[error("Encountered unknown marker: {marker}")]
    UnknownMarker { marker: u8 },

    /// An object property had a zero length name but was not followed by the
    /// object end marker
    #[error("Unexpected empty object property name")]
    UnexpectedEmptyObjectPropertyName,

    /// The byte stream ended in the middle of a value
    #[error("Hit end of the byte buffer but was expecting more data")]
    UnexpectedEof,

    /// Failed to read from the input buffer
    #[error("{0}")]
    Io(#[from] io::Error),

    /// A string value contained bytes that are not valid UTF-8
    #[error("String value contained invalid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

/// Errors raised while encoding AMF0 values into bytes
#[derive(Debug, Error)]
pub enum Amf0SerializationError {
    /// AMF0 normal strings cannot be longer than a u16 length prefix allows
    #[error("String length greater than 65,535")]
    NormalStringTooLong,

    /// Failed to write to the output buffer
    #[error("{0}")]
    Io(#[from] io::Error),
}

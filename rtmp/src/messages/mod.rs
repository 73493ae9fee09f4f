//! Typed views over RTMP message payloads.
//!
//! The chunk codec deals in opaque [`MessagePayload`]s; this module classifies
//! them into the protocol-control, user-control, command, data, audio and
//! video messages the session logic acts on, and serializes the reverse
//! direction.

mod errors;
mod payload;
mod types;

pub use self::errors::{MessageDecodeError, MessageEncodeError};
pub use self::payload::MessagePayload;

use crate::time::Timestamp;
use bytes::Bytes;
use rivulet_amf0::Amf0Value;

/// RTMP message type ids as they appear in chunk message headers
pub mod type_ids {
    pub const SET_CHUNK_SIZE: u8 = 0x01;
    pub const ABORT: u8 = 0x02;
    pub const ACKNOWLEDGEMENT: u8 = 0x03;
    pub const USER_CONTROL: u8 = 0x04;
    pub const WINDOW_ACK_SIZE: u8 = 0x05;
    pub const SET_PEER_BANDWIDTH: u8 = 0x06;
    pub const AUDIO: u8 = 0x08;
    pub const VIDEO: u8 = 0x09;
    pub const AMF3_DATA: u8 = 0x0f;
    pub const AMF3_COMMAND: u8 = 0x11;
    pub const AMF0_DATA: u8 = 0x12;
    pub const AMF0_COMMAND: u8 = 0x14;
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum PeerBandwidthLimitType {
    Hard,
    Soft,
    Dynamic,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum UserControlEventType {
    StreamBegin,
    StreamEof,
    StreamDry,
    SetBufferLength,
    StreamIsRecorded,
    PingRequest,
    PingResponse,
}

#[derive(PartialEq, Debug, Clone)]
pub enum RtmpMessage {
    Unknown {
        type_id: u8,
        data: Bytes,
    },

    Abort {
        stream_id: u32,
    },

    Acknowledgement {
        sequence_number: u32,
    },

    Amf0Command {
        command_name: String,
        transaction_id: f64,
        command_object: Amf0Value,
        additional_arguments: Vec<Amf0Value>,
    },

    Amf0Data {
        values: Vec<Amf0Value>,
    },

    AudioData {
        data: Bytes,
    },

    SetChunkSize {
        size: u32,
    },

    SetPeerBandwidth {
        size: u32,
        limit_type: PeerBandwidthLimitType,
    },

    UserControl {
        event_type: UserControlEventType,
        stream_id: Option<u32>,
        buffer_length: Option<u32>,
        timestamp: Option<Timestamp>,
    },

    VideoData {
        data: Bytes,
    },

    WindowAcknowledgement {
        size: u32,
    },
}

use super::{types, type_ids};
use super::{MessageDecodeError, MessageEncodeError, RtmpMessage};
use crate::time::Timestamp;
use bytes::Bytes;

/// A raw RTMP message: the reassembled body of 1..N chunks plus the header
/// fields that survive chunking
#[derive(PartialEq, Debug, Clone)]
pub struct MessagePayload {
    pub timestamp: Timestamp,
    pub type_id: u8,
    pub message_stream_id: u32,
    pub data: Bytes,
}

impl MessagePayload {
    pub fn new() -> MessagePayload {
        MessagePayload {
            timestamp: Timestamp::new(0),
            type_id: 0,
            message_stream_id: 0,
            data: Bytes::new(),
        }
    }

    /// Classifies the payload into a typed message.
    ///
    /// AMF3 command and data messages are AMF0 batches behind a one byte
    /// format prefix, so they are decoded by skipping that byte.
    pub fn to_rtmp_message(&self) -> Result<RtmpMessage, MessageDecodeError> {
        match self.type_id {
            type_ids::SET_CHUNK_SIZE => types::set_chunk_size::deserialize(&self.data[..]),
            type_ids::ABORT => types::abort::deserialize(&self.data[..]),
            type_ids::ACKNOWLEDGEMENT => types::acknowledgement::deserialize(&self.data[..]),
            type_ids::USER_CONTROL => types::user_control::deserialize(&self.data[..]),
            type_ids::WINDOW_ACK_SIZE => {
                types::window_acknowledgement_size::deserialize(&self.data[..])
            }
            type_ids::SET_PEER_BANDWIDTH => types::set_peer_bandwidth::deserialize(&self.data[..]),
            type_ids::AUDIO => types::audio_data::deserialize(self.data.clone()),
            type_ids::VIDEO => types::video_data::deserialize(self.data.clone()),
            type_ids::AMF0_DATA => types::amf0_data::deserialize(&self.data[..]),
            type_ids::AMF0_COMMAND => types::amf0_command::deserialize(&self.data[..]),
            type_ids::AMF3_DATA if !self.data.is_empty() => {
                types::amf0_data::deserialize(&self.data[1..])
            }
            type_ids::AMF3_COMMAND if !self.data.is_empty() => {
                types::amf0_command::deserialize(&self.data[1..])
            }
            _ => Ok(RtmpMessage::Unknown {
                type_id: self.type_id,
                data: self.data.clone(),
            }),
        }
    }

    pub fn from_rtmp_message(
        message: RtmpMessage,
        timestamp: Timestamp,
        message_stream_id: u32,
    ) -> Result<MessagePayload, MessageEncodeError> {
        let type_id = message_type_id(&message);

        let data = match message {
            RtmpMessage::Unknown { type_id: _, data } => data,

            RtmpMessage::Abort { stream_id } => Bytes::from(types::abort::serialize(stream_id)?),

            RtmpMessage::Acknowledgement { sequence_number } => {
                Bytes::from(types::acknowledgement::serialize(sequence_number)?)
            }

            RtmpMessage::Amf0Command {
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            } => Bytes::from(types::amf0_command::serialize(
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            )?),

            RtmpMessage::Amf0Data { values } => Bytes::from(types::amf0_data::serialize(values)?),

            RtmpMessage::AudioData { data } => data,

            RtmpMessage::SetChunkSize { size } => {
                Bytes::from(types::set_chunk_size::serialize(size)?)
            }

            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                Bytes::from(types::set_peer_bandwidth::serialize(size, limit_type)?)
            }

            RtmpMessage::UserControl {
                event_type,
                stream_id,
                buffer_length,
                timestamp,
            } => Bytes::from(types::user_control::serialize(
                event_type,
                stream_id,
                buffer_length,
                timestamp,
            )?),

            RtmpMessage::VideoData { data } => data,

            RtmpMessage::WindowAcknowledgement { size } => {
                Bytes::from(types::window_acknowledgement_size::serialize(size)?)
            }
        };

        Ok(MessagePayload {
            timestamp,
            type_id,
            message_stream_id,
            data,
        })
    }
}

impl Default for MessagePayload {
    fn default() -> Self {
        MessagePayload::new()
    }
}

fn message_type_id(message: &RtmpMessage) -> u8 {
    match message {
        RtmpMessage::Unknown { type_id, .. } => *type_id,
        RtmpMessage::Abort { .. } => type_ids::ABORT,
        RtmpMessage::Acknowledgement { .. } => type_ids::ACKNOWLEDGEMENT,
        RtmpMessage::Amf0Command { .. } => type_ids::AMF0_COMMAND,
        RtmpMessage::Amf0Data { .. } => type_ids::AMF0_DATA,
        RtmpMessage::AudioData { .. } => type_ids::AUDIO,
        RtmpMessage::SetChunkSize { .. } => type_ids::SET_CHUNK_SIZE,
        RtmpMessage::SetPeerBandwidth { .. } => type_ids::SET_PEER_BANDWIDTH,
        RtmpMessage::UserControl { .. } => type_ids::USER_CONTROL,
        RtmpMessage::VideoData { .. } => type_ids::VIDEO,
        RtmpMessage::WindowAcknowledgement { .. } => type_ids::WINDOW_ACK_SIZE,
    }
}

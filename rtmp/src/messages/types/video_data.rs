use crate::messages::{MessageDecodeError, RtmpMessage};
use bytes::Bytes;

pub fn deserialize(data: Bytes) -> Result<RtmpMessage, MessageDecodeError> {
    Ok(RtmpMessage::VideoData { data })
}

use crate::messages::{MessageDecodeError, MessageEncodeError, RtmpMessage};
use rivulet_amf0::Amf0Value;
use std::io::Cursor;

pub fn serialize(values: Vec<Amf0Value>) -> Result<Vec<u8>, MessageEncodeError> {
    Ok(rivulet_amf0::serialize(&values)?)
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDecodeError> {
    let mut cursor = Cursor::new(data);
    let values = rivulet_amf0::deserialize(&mut cursor)?;
    Ok(RtmpMessage::Amf0Data { values })
}

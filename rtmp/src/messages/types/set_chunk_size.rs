use crate::messages::{MessageDecodeError, MessageEncodeError, RtmpMessage};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

pub fn serialize(size: u32) -> Result<Vec<u8>, MessageEncodeError> {
    let mut cursor = Cursor::new(Vec::new());
    cursor.write_u32::<BigEndian>(size)?;
    Ok(cursor.into_inner())
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDecodeError> {
    let mut cursor = Cursor::new(data);
    // The high bit is reserved and must not contribute to the size
    let size = cursor.read_u32::<BigEndian>()? & 0x7fffffff;
    Ok(RtmpMessage::SetChunkSize { size })
}

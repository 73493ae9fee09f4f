use crate::messages::{MessageDecodeError, MessageEncodeError, RtmpMessage};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

pub fn serialize(sequence_number: u32) -> Result<Vec<u8>, MessageEncodeError> {
    let mut cursor = Cursor::new(Vec::new());
    cursor.write_u32::<BigEndian>(sequence_number)?;
    Ok(cursor.into_inner())
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDecodeError> {
    let mut cursor = Cursor::new(data);
    let sequence_number = cursor.read_u32::<BigEndian>()?;
    Ok(RtmpMessage::Acknowledgement { sequence_number })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_round_trip_message() {
        let bytes = serialize(523).unwrap();
        let result = deserialize(&bytes).unwrap();
        assert_eq!(
            result,
            RtmpMessage::Acknowledgement {
                sequence_number: 523
            }
        );
    }
}

use crate::messages::{MessageDecodeError, MessageEncodeError, PeerBandwidthLimitType, RtmpMessage};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

pub fn serialize(
    size: u32,
    limit_type: PeerBandwidthLimitType,
) -> Result<Vec<u8>, MessageEncodeError> {
    let type_id = match limit_type {
        PeerBandwidthLimitType::Hard => 0,
        PeerBandwidthLimitType::Soft => 1,
        PeerBandwidthLimitType::Dynamic => 2,
    };

    let mut cursor = Cursor::new(Vec::new());
    cursor.write_u32::<BigEndian>(size)?;
    cursor.write_u8(type_id)?;
    Ok(cursor.into_inner())
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDecodeError> {
    let mut cursor = Cursor::new(data);
    let size = cursor.read_u32::<BigEndian>()?;
    let limit_type = match cursor.read_u8()? {
        0 => PeerBandwidthLimitType::Hard,
        1 => PeerBandwidthLimitType::Soft,
        2 => PeerBandwidthLimitType::Dynamic,
        _ => return Err(MessageDecodeError::InvalidMessageFormat),
    };

    Ok(RtmpMessage::SetPeerBandwidth { size, limit_type })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_round_trip_message() {
        let bytes = serialize(2_500_000, PeerBandwidthLimitType::Dynamic).unwrap();
        let result = deserialize(&bytes).unwrap();
        assert_eq!(
            result,
            RtmpMessage::SetPeerBandwidth {
                size: 2_500_000,
                limit_type: PeerBandwidthLimitType::Dynamic
            }
        );
    }

    #[test]
    fn unknown_limit_type_is_rejected() {
        match deserialize(&[0, 0, 0, 1, 9]) {
            Err(MessageDecodeError::InvalidMessageFormat) => (),
            x => panic!("Expected InvalidMessageFormat, got {:?}", x),
        }
    }
}

use crate::messages::{MessageDecodeError, MessageEncodeError, RtmpMessage, UserControlEventType};
use crate::time::Timestamp;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

pub fn serialize(
    event_type: UserControlEventType,
    stream_id: Option<u32>,
    buffer_length: Option<u32>,
    timestamp: Option<Timestamp>,
) -> Result<Vec<u8>, MessageEncodeError> {
    let mut cursor = Cursor::new(Vec::new());
    match event_type {
        UserControlEventType::StreamBegin => write_stream_event(&mut cursor, 0, stream_id)?,
        UserControlEventType::StreamEof => write_stream_event(&mut cursor, 1, stream_id)?,
        UserControlEventType::StreamDry => write_stream_event(&mut cursor, 2, stream_id)?,
        UserControlEventType::SetBufferLength => {
            write_length_event(&mut cursor, 3, stream_id, buffer_length)?
        }
        UserControlEventType::StreamIsRecorded => write_stream_event(&mut cursor, 4, stream_id)?,
        UserControlEventType::PingRequest => write_timestamp_event(&mut cursor, 6, timestamp)?,
        UserControlEventType::PingResponse => write_timestamp_event(&mut cursor, 7, timestamp)?,
    };

    Ok(cursor.into_inner())
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDecodeError> {
    let mut cursor = Cursor::new(data);
    let event_type = match cursor.read_u16::<BigEndian>()? {
        0 => UserControlEventType::StreamBegin,
        1 => UserControlEventType::StreamEof,
        2 => UserControlEventType::StreamDry,
        3 => UserControlEventType::SetBufferLength,
        4 => UserControlEventType::StreamIsRecorded,
        6 => UserControlEventType::PingRequest,
        7 => UserControlEventType::PingResponse,
        _ => return Err(MessageDecodeError::InvalidMessageFormat),
    };

    let mut stream_id = None;
    let mut buffer_length = None;
    let mut timestamp = None;

    match event_type {
        UserControlEventType::StreamBegin
        | UserControlEventType::StreamEof
        | UserControlEventType::StreamDry
        | UserControlEventType::StreamIsRecorded => {
            stream_id = Some(cursor.read_u32::<BigEndian>()?)
        }

        UserControlEventType::PingRequest | UserControlEventType::PingResponse => {
            timestamp = Some(Timestamp::new(cursor.read_u32::<BigEndian>()?))
        }

        UserControlEventType::SetBufferLength => {
            stream_id = Some(cursor.read_u32::<BigEndian>()?);
            buffer_length = Some(cursor.read_u32::<BigEndian>()?);
        }
    }

    Ok(RtmpMessage::UserControl {
        event_type,
        stream_id,
        buffer_length,
        timestamp,
    })
}

fn write_stream_event<W: Write>(
    bytes: &mut W,
    event_id: u16,
    stream_id: Option<u32>,
) -> Result<(), MessageEncodeError> {
    debug_assert!(
        stream_id.is_some(),
        "Stream event attempted to be serialized with a None stream id!"
    );

    bytes.write_u16::<BigEndian>(event_id)?;
    bytes.write_u32::<BigEndian>(stream_id.unwrap_or(0))?;
    Ok(())
}

fn write_length_event<W: Write>(
    bytes: &mut W,
    event_id: u16,
    stream_id: Option<u32>,
    length: Option<u32>,
) -> Result<(), MessageEncodeError> {
    bytes.write_u16::<BigEndian>(event_id)?;
    bytes.write_u32::<BigEndian>(stream_id.unwrap_or(0))?;
    bytes.write_u32::<BigEndian>(length.unwrap_or(0))?;
    Ok(())
}

fn write_timestamp_event<W: Write>(
    bytes: &mut W,
    event_id: u16,
    timestamp: Option<Timestamp>,
) -> Result<(), MessageEncodeError> {
    bytes.write_u16::<BigEndian>(event_id)?;
    bytes.write_u32::<BigEndian>(timestamp.map(|x| x.value).unwrap_or(0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_serialize_stream_begin_message() {
        let bytes = serialize(UserControlEventType::StreamBegin, Some(555), None, None).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 2, 43]);
    }

    #[test]
    fn can_serialize_stream_is_recorded_message() {
        let bytes =
            serialize(UserControlEventType::StreamIsRecorded, Some(1), None, None).unwrap();
        assert_eq!(bytes, vec![0, 4, 0, 0, 0, 1]);
    }

    #[test]
    fn can_round_trip_set_buffer_length() {
        let bytes = serialize(
            UserControlEventType::SetBufferLength,
            Some(1),
            Some(3000),
            None,
        )
        .unwrap();

        let result = deserialize(&bytes).unwrap();
        assert_eq!(
            result,
            RtmpMessage::UserControl {
                event_type: UserControlEventType::SetBufferLength,
                stream_id: Some(1),
                buffer_length: Some(3000),
                timestamp: None,
            }
        );
    }

    #[test]
    fn can_round_trip_ping_request() {
        let bytes = serialize(
            UserControlEventType::PingRequest,
            None,
            None,
            Some(Timestamp::new(8877)),
        )
        .unwrap();

        let result = deserialize(&bytes).unwrap();
        assert_eq!(
            result,
            RtmpMessage::UserControl {
                event_type: UserControlEventType::PingRequest,
                stream_id: None,
                buffer_length: None,
                timestamp: Some(Timestamp::new(8877)),
            }
        );
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        match deserialize(&[0, 9, 0, 0, 0, 0]) {
            Err(MessageDecodeError::InvalidMessageFormat) => (),
            x => panic!("Expected InvalidMessageFormat, got {:?}", x),
        }
    }
}

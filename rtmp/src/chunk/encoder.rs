use super::{
    ChunkEncodeError, AUDIO_CSID, COMMAND_CSID, CONTROL_CSID, DEFAULT_CHUNK_SIZE,
    MAX_MESSAGE_LENGTH, MAX_TIMESTAMP_FIELD, VIDEO_DATA_CSID,
};
use crate::connection::BufDuplex;
use crate::messages::{type_ids, MessagePayload};
use std::cmp::min;
use tokio::io::{AsyncRead, AsyncWrite};

/// Splits outbound RTMP messages into chunks.
///
/// Every message starts with a fresh fmt 0 header and continues with fmt 3
/// chunks; no delta compression is attempted on the send path.  The whole
/// message is buffered and flushed in one batch.
pub struct ChunkEncoder {
    max_chunk_size: u32,
}

impl ChunkEncoder {
    pub fn new() -> ChunkEncoder {
        ChunkEncoder {
            max_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Applies a chunk size we have announced to the peer.  The SetChunkSize
    /// message itself must be written before calling this.
    pub fn set_max_chunk_size(&mut self, size: u32) {
        self.max_chunk_size = size.clamp(1, MAX_MESSAGE_LENGTH);
    }

    pub fn max_chunk_size(&self) -> u32 {
        self.max_chunk_size
    }

    /// Writes one message as a run of chunks and flushes the connection
    pub async fn write_message<S>(
        &mut self,
        io: &mut BufDuplex<S>,
        payload: &MessagePayload,
    ) -> Result<(), ChunkEncodeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if payload.data.len() > MAX_MESSAGE_LENGTH as usize {
            return Err(ChunkEncodeError::MessageTooLong {
                size: payload.data.len(),
            });
        }

        let csid = csid_for_message_type(payload.type_id);
        let timestamp = payload.timestamp.value;
        let extended = timestamp >= MAX_TIMESTAMP_FIELD;
        let length = payload.data.len();

        let mut offset = 0;
        let mut fmt = 0_u8;
        loop {
            write_basic_header(io, fmt, csid);

            if fmt == 0 {
                let field = min(timestamp, MAX_TIMESTAMP_FIELD);
                write_u24_be(io, field);
                write_u24_be(io, length as u32);
                io.write(&[payload.type_id]);
                io.write(&payload.message_stream_id.to_le_bytes());
            }

            // The extended timestamp tail is repeated on every continuation,
            // matching the encoders the decoder's peek rule exists for.
            if extended {
                io.write(&timestamp.to_be_bytes());
            }

            let chunk_length = min(self.max_chunk_size as usize, length - offset);
            io.write(&payload.data[offset..offset + chunk_length]);
            offset += chunk_length;
            fmt = 3;

            if offset >= length {
                break;
            }
        }

        io.flush().await?;
        Ok(())
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        ChunkEncoder::new()
    }
}

/// Outbound csid by message class: control messages on the reserved stream,
/// commands, audio, and video/data each on their own
fn csid_for_message_type(type_id: u8) -> u32 {
    match type_id {
        type_ids::SET_CHUNK_SIZE
        | type_ids::ABORT
        | type_ids::ACKNOWLEDGEMENT
        | type_ids::USER_CONTROL
        | type_ids::WINDOW_ACK_SIZE
        | type_ids::SET_PEER_BANDWIDTH => CONTROL_CSID,
        type_ids::AUDIO => AUDIO_CSID,
        type_ids::VIDEO | type_ids::AMF0_DATA | type_ids::AMF3_DATA => VIDEO_DATA_CSID,
        _ => COMMAND_CSID,
    }
}

fn write_basic_header<S>(io: &mut BufDuplex<S>, fmt: u8, csid: u32)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mask = fmt << 6;
    if csid < 64 {
        io.write(&[mask | csid as u8]);
    } else if csid < 320 {
        io.write(&[mask, (csid - 64) as u8]);
    } else {
        let id = (csid - 64) as u16;
        io.write(&[mask | 1, (id & 0xff) as u8, (id >> 8) as u8]);
    }
}

fn write_u24_be<S>(io: &mut BufDuplex<S>, value: u32)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    io.write(&[(value >> 16) as u8, (value >> 8) as u8, value as u8]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    async fn encode(payload: &MessagePayload, chunk_size: u32) -> Vec<u8> {
        let (client, mut server) = tokio::io::duplex(1 << 20);
        let mut io = BufDuplex::new(client);

        let mut encoder = ChunkEncoder::new();
        encoder.set_max_chunk_size(chunk_size);
        encoder.write_message(&mut io, payload).await.unwrap();
        drop(io);

        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    #[tokio::test]
    async fn small_timestamp_message_gets_full_type_0_header() {
        let payload = MessagePayload {
            timestamp: Timestamp::new(72),
            type_id: 20,
            message_stream_id: 12,
            data: Bytes::from(vec![1, 2, 3, 4]),
        };

        let bytes = encode(&payload, 128).await;

        assert_eq!(bytes[0], 3, "commands belong on csid 3");
        assert_eq!(&bytes[1..4], &[0, 0, 72], "timestamp field");
        assert_eq!(&bytes[4..7], &[0, 0, 4], "length field");
        assert_eq!(bytes[7], 20, "type id");
        assert_eq!(&bytes[8..12], &[12, 0, 0, 0], "little endian stream id");
        assert_eq!(&bytes[12..], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn extended_timestamp_is_written_after_the_header() {
        let payload = MessagePayload {
            timestamp: Timestamp::new(0x0100_0000),
            type_id: 9,
            message_stream_id: 1,
            data: Bytes::from(vec![9, 9]),
        };

        let bytes = encode(&payload, 128).await;

        assert_eq!(bytes[0], 6, "video belongs on csid 6");
        assert_eq!(&bytes[1..4], &[0xff, 0xff, 0xff], "sentinel field");
        assert_eq!(&bytes[12..16], &[0x01, 0x00, 0x00, 0x00], "extended tail");
        assert_eq!(&bytes[16..], &[9, 9]);
    }

    #[tokio::test]
    async fn large_message_continues_with_type_3_chunks() {
        let payload = MessagePayload {
            timestamp: Timestamp::new(72),
            type_id: 8,
            message_stream_id: 1,
            data: Bytes::from(vec![5_u8; 300]),
        };

        let bytes = encode(&payload, 128).await;

        // 12 byte first header + 128 body, then two continuations
        assert_eq!(bytes[0], 4, "audio belongs on csid 4");
        assert_eq!(bytes.len(), 12 + 128 + 1 + 128 + 1 + 44);
        assert_eq!(bytes[12 + 128], 0xc0 | 4, "first continuation header");
        assert_eq!(bytes[12 + 128 + 1 + 128], 0xc0 | 4, "second continuation");
    }

    #[tokio::test]
    async fn extended_timestamp_repeats_on_continuations() {
        let payload = MessagePayload {
            timestamp: Timestamp::new(0x0100_0000),
            type_id: 8,
            message_stream_id: 1,
            data: Bytes::from(vec![5_u8; 200]),
        };

        let bytes = encode(&payload, 128).await;

        let continuation_start = 16 + 128;
        assert_eq!(bytes[continuation_start], 0xc0 | 4);
        assert_eq!(
            &bytes[continuation_start + 1..continuation_start + 5],
            &[0x01, 0x00, 0x00, 0x00]
        );
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let payload = MessagePayload {
            timestamp: Timestamp::new(0),
            type_id: 9,
            message_stream_id: 1,
            data: Bytes::from(vec![0_u8; 0x100_0000]),
        };

        let (client, _server) = tokio::io::duplex(64);
        let mut io = BufDuplex::new(client);
        let mut encoder = ChunkEncoder::new();

        match encoder.write_message(&mut io, &payload).await {
            Err(ChunkEncodeError::MessageTooLong { size: 0x100_0000 }) => (),
            x => panic!("Expected MessageTooLong, got {:?}", x),
        }
    }
}

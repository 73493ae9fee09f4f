//! The RTMP chunk layer.
//!
//! One RTMP message crosses the wire as 1..N chunks, each carrying a basic
//! header (fmt + chunk stream id), a message header whose layout depends on
//! `fmt`, and at most one chunk-size worth of body bytes.  Chunk streams are
//! independent header-compression contexts: every non-fmt-0 header borrows
//! fields from the previous chunk on the same csid.

mod decoder;
mod encoder;
mod errors;
mod stream;

pub use self::decoder::ChunkDecoder;
pub use self::encoder::ChunkEncoder;
pub use self::errors::{ChunkDecodeError, ChunkEncodeError};
pub use self::stream::ChunkStream;

/// Chunk stream id reserved for protocol control messages
pub const CONTROL_CSID: u32 = 2;
pub const COMMAND_CSID: u32 = 3;
pub const AUDIO_CSID: u32 = 4;
pub const VIDEO_DATA_CSID: u32 = 6;

/// Both peers start with 128 byte chunks until a SetChunkSize says otherwise
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Largest value the 3 byte timestamp field can carry; the sentinel that an
/// extended timestamp follows
pub const MAX_TIMESTAMP_FIELD: u32 = 0xff_ffff;

/// RTMP messages cannot exceed the 3 byte length field even when split
/// across many chunks
pub const MAX_MESSAGE_LENGTH: u32 = 0xff_ffff;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::BufDuplex;
    use crate::messages::MessagePayload;
    use crate::time::Timestamp;
    use bytes::Bytes;

    async fn round_trip(input: MessagePayload, chunk_size: u32) -> MessagePayload {
        let (client, server) = tokio::io::duplex(1 << 20);

        let mut encoder = ChunkEncoder::new();
        encoder.set_max_chunk_size(chunk_size);
        let mut client_io = BufDuplex::new(client);
        encoder.write_message(&mut client_io, &input).await.unwrap();

        let mut decoder = ChunkDecoder::new();
        decoder.set_max_chunk_size(chunk_size).unwrap();
        let mut server_io = BufDuplex::new(server);
        decoder.read_message(&mut server_io).await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_small_timestamp_message() {
        let input = MessagePayload {
            timestamp: Timestamp::new(55),
            message_stream_id: 1,
            type_id: 15,
            data: Bytes::from(vec![1, 2, 3, 4, 5, 6]),
        };

        let output = round_trip(input.clone(), 128).await;
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn round_trips_extended_timestamp_message() {
        let input = MessagePayload {
            timestamp: Timestamp::new(0x0100_0000),
            message_stream_id: 1,
            type_id: 9,
            data: Bytes::from(vec![7; 50]),
        };

        let output = round_trip(input.clone(), 128).await;
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn round_trips_message_larger_than_chunk_size() {
        let input = MessagePayload {
            timestamp: Timestamp::new(90),
            message_stream_id: 1,
            type_id: 8,
            data: Bytes::from((0_u8..=255).cycle().take(1000).collect::<Vec<u8>>()),
        };

        let output = round_trip(input.clone(), 128).await;
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn round_trips_extended_timestamp_message_larger_than_chunk_size() {
        let input = MessagePayload {
            timestamp: Timestamp::new(0xdead_beef),
            message_stream_id: 5,
            type_id: 9,
            data: Bytes::from((0_u8..=255).cycle().take(300).collect::<Vec<u8>>()),
        };

        let output = round_trip(input.clone(), 128).await;
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn round_trips_consecutive_messages_on_one_chunk_stream() {
        let (client, server) = tokio::io::duplex(1 << 20);
        let mut client_io = BufDuplex::new(client);
        let mut server_io = BufDuplex::new(server);

        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        let inputs: Vec<MessagePayload> = (0..3)
            .map(|i| MessagePayload {
                timestamp: Timestamp::new(55 + i * 10),
                message_stream_id: 1,
                type_id: 15,
                data: Bytes::from(vec![i as u8; 6]),
            })
            .collect();

        for input in &inputs {
            encoder.write_message(&mut client_io, input).await.unwrap();
        }
        client_io.flush().await.unwrap();
        drop(client_io);

        for input in &inputs {
            let output = decoder.read_message(&mut server_io).await.unwrap();
            assert_eq!(&output, input);
        }
    }

    #[tokio::test]
    async fn chunk_streams_reassemble_independently() {
        // Audio and video land on csids 4 and 6, each with its own header
        // state on the shared connection.
        let (client, server) = tokio::io::duplex(1 << 20);
        let mut client_io = BufDuplex::new(client);
        let mut server_io = BufDuplex::new(server);

        let mut encoder = ChunkEncoder::new();
        let audio = MessagePayload {
            timestamp: Timestamp::new(100),
            message_stream_id: 1,
            type_id: 8,
            data: Bytes::from(vec![0xaa; 10]),
        };
        let video = MessagePayload {
            timestamp: Timestamp::new(101),
            message_stream_id: 1,
            type_id: 9,
            data: Bytes::from(vec![0xbb; 10]),
        };

        encoder.write_message(&mut client_io, &audio).await.unwrap();
        encoder.write_message(&mut client_io, &video).await.unwrap();
        client_io.flush().await.unwrap();

        let mut decoder = ChunkDecoder::new();
        let first = decoder.read_message(&mut server_io).await.unwrap();
        let second = decoder.read_message(&mut server_io).await.unwrap();

        assert_eq!(first, audio);
        assert_eq!(second, video);
    }
}

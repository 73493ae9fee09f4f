use super::stream::ChunkStream;
use super::{ChunkDecodeError, DEFAULT_CHUNK_SIZE, MAX_TIMESTAMP_FIELD};
use crate::connection::BufDuplex;
use crate::messages::MessagePayload;
use std::cmp::min;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncWrite};

const SMALL_CSID_SLOTS: usize = 64;

/// Reassembles the RTMP chunk stream of one connection back into messages.
///
/// Chunk headers compress against the previous chunk on the same csid, so
/// every byte arriving on a connection must flow through the same decoder
/// instance, in order.
pub struct ChunkDecoder {
    /// csids 2..=63 are overwhelmingly common, so they get a fixed slot
    /// array; the map only serves the 2 and 3 byte basic header forms.
    small_slots: [Option<ChunkStream>; SMALL_CSID_SLOTS],
    extended_slots: HashMap<u32, ChunkStream>,
    max_chunk_size: u32,
}

impl ChunkDecoder {
    pub fn new() -> ChunkDecoder {
        ChunkDecoder {
            small_slots: std::array::from_fn(|_| None),
            extended_slots: HashMap::new(),
            max_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Applies the peer's SetChunkSize.  Must happen between messages, which
    /// holds naturally because control messages are themselves messages: the
    /// in-flight chunk of any other csid was already consumed with the old
    /// size.
    pub fn set_max_chunk_size(&mut self, size: u32) -> Result<(), ChunkDecodeError> {
        if size == 0 || size > 0x7fff_ffff {
            return Err(ChunkDecodeError::InvalidMaxChunkSize { chunk_size: size });
        }

        self.max_chunk_size = size;
        Ok(())
    }

    pub fn max_chunk_size(&self) -> u32 {
        self.max_chunk_size
    }

    /// Reads chunks until one message completes and returns it
    pub async fn read_message<S>(
        &mut self,
        io: &mut BufDuplex<S>,
    ) -> Result<MessagePayload, ChunkDecodeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let (fmt, csid) = read_basic_header(io).await?;

            let max_chunk_size = self.max_chunk_size;
            let slot = self.slot_mut(fmt, csid)?;

            read_message_header(slot, fmt, io).await?;

            let size = min(slot.body_remain, max_chunk_size);
            let complete = if size > 0 {
                let bytes = io.read_exact(size as usize).await?;
                slot.append_body(&bytes)
            } else {
                slot.body_remain == 0
            };

            if complete {
                return Ok(slot.take_payload());
            }
        }
    }

    fn slot_mut(&mut self, fmt: u8, csid: u32) -> Result<&mut ChunkStream, ChunkDecodeError> {
        let slot = if (csid as usize) < SMALL_CSID_SLOTS {
            &mut self.small_slots[csid as usize]
        } else {
            match self.extended_slots.entry(csid) {
                std::collections::hash_map::Entry::Occupied(entry) => {
                    return Ok(entry.into_mut());
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    if fmt != 0 {
                        return Err(ChunkDecodeError::NoPreviousChunk { csid, fmt });
                    }

                    return Ok(entry.insert(ChunkStream::new(csid)));
                }
            }
        };

        if slot.is_none() && fmt != 0 {
            return Err(ChunkDecodeError::NoPreviousChunk { csid, fmt });
        }

        Ok(slot.get_or_insert_with(|| ChunkStream::new(csid)))
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        ChunkDecoder::new()
    }
}

async fn read_basic_header<S>(io: &mut BufDuplex<S>) -> Result<(u8, u32), ChunkDecodeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let first = io.read_u8().await?;
    let fmt = first >> 6;

    let csid = match first & 0x3f {
        0 => {
            // 2 byte form covers csids 64..=319
            io.read_u8().await? as u32 + 64
        }
        1 => {
            // 3 byte form covers csids 64..=65599, little endian
            let bytes = io.read_exact(2).await?;
            bytes[0] as u32 + bytes[1] as u32 * 256 + 64
        }
        value => value as u32,
    };

    Ok((fmt, csid))
}

async fn read_message_header<S>(
    slot: &mut ChunkStream,
    fmt: u8,
    io: &mut BufDuplex<S>,
) -> Result<(), ChunkDecodeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if fmt <= 2 && slot.body_remain > 0 {
        return Err(ChunkDecodeError::InterruptedMessage {
            csid: slot.csid,
            remaining: slot.body_remain,
        });
    }

    match fmt {
        0 => {
            let header = io.read_exact(11).await?;
            let field = u24_be(&header[0..3]);
            slot.message_length = u24_be(&header[3..6]);
            slot.message_type_id = header[6];
            slot.message_stream_id = u32_le(&header[7..11]);
            slot.time_extended = field >= MAX_TIMESTAMP_FIELD;

            let timestamp = if slot.time_extended {
                u32_be(&io.read_exact(4).await?)
            } else {
                field
            };

            slot.timestamp.set(timestamp);
            slot.timestamp_field = field;
            slot.last_fmt = 0;
            slot.begin_message();
        }

        1 | 2 => {
            let header = io.read_exact(if fmt == 1 { 7 } else { 3 }).await?;
            let field = u24_be(&header[0..3]);
            if fmt == 1 {
                slot.message_length = u24_be(&header[3..6]);
                slot.message_type_id = header[6];
            }

            slot.time_extended = field >= MAX_TIMESTAMP_FIELD;
            let delta = if slot.time_extended {
                u32_be(&io.read_exact(4).await?)
            } else {
                field
            };

            slot.timestamp = slot.timestamp + delta;
            slot.timestamp_field = field;
            slot.last_fmt = fmt;
            slot.begin_message();
        }

        _ => {
            if slot.body_remain == 0 {
                // A fmt 3 chunk opening a brand new message: every header
                // field repeats, and a delta-form previous header is applied
                // once more.
                match (slot.last_fmt, slot.time_extended) {
                    (0, true) => {
                        let timestamp = u32_be(&io.read_exact(4).await?);
                        slot.timestamp.set(timestamp);
                    }
                    (0, false) => {}
                    (_, true) => {
                        let delta = u32_be(&io.read_exact(4).await?);
                        slot.timestamp = slot.timestamp + delta;
                    }
                    (_, false) => {
                        slot.timestamp = slot.timestamp + slot.timestamp_field;
                    }
                }

                slot.begin_message();
            } else if slot.time_extended {
                // Mid-message continuation.  Some encoders repeat the 4
                // extended timestamp bytes on every fmt 3 chunk, others emit
                // payload immediately; consume them only when they match the
                // reassembly timestamp.
                let peeked = io.peek(4).await?;
                if u32_be(peeked) == slot.timestamp.value {
                    io.discard(4);
                }
            }
        }
    }

    Ok(())
}

fn u24_be(bytes: &[u8]) -> u32 {
    (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
}

fn u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;
    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
    use std::io::{Cursor, Write};

    async fn decoder_with_bytes(bytes: &[u8]) -> (ChunkDecoder, BufDuplex<tokio::io::DuplexStream>) {
        let (mut client, server) = tokio::io::duplex(1 << 20);
        tokio::io::AsyncWriteExt::write_all(&mut client, bytes).await.unwrap();
        // dropping the client leaves the buffered bytes readable, followed
        // by a clean EOF
        drop(client);

        (ChunkDecoder::new(), BufDuplex::new(server))
    }

    fn write_basic_header(cursor: &mut Cursor<Vec<u8>>, fmt: u8, csid: u32) {
        let mask = fmt << 6;
        if csid < 64 {
            cursor.write_u8(csid as u8 | mask).unwrap();
        } else if csid < 320 {
            cursor.write_u8(mask).unwrap();
            cursor.write_u8((csid - 64) as u8).unwrap();
        } else {
            cursor.write_u8(1 | mask).unwrap();
            cursor.write_u16::<LittleEndian>((csid - 64) as u16).unwrap();
        }
    }

    fn form_type_0_chunk(
        csid: u32,
        timestamp: u32,
        message_stream_id: u32,
        type_id: u8,
        payload: &[u8],
        max_chunk_size: usize,
    ) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_basic_header(&mut cursor, 0, csid);

        let field = min(timestamp, 0xffffff);
        cursor.write_u24::<BigEndian>(field).unwrap();
        cursor.write_u24::<BigEndian>(payload.len() as u32).unwrap();
        cursor.write_u8(type_id).unwrap();
        cursor.write_u32::<LittleEndian>(message_stream_id).unwrap();

        if field == 0xffffff {
            cursor.write_u32::<BigEndian>(timestamp).unwrap();
        }

        if payload.len() > max_chunk_size {
            cursor.write_all(&payload[..max_chunk_size]).unwrap();
            let rest = form_type_3_continuations(csid, &payload[max_chunk_size..], max_chunk_size);
            cursor.write_all(&rest).unwrap();
        } else {
            cursor.write_all(payload).unwrap();
        }

        cursor.into_inner()
    }

    fn form_type_1_chunk(csid: u32, delta: u32, type_id: u8, payload: &[u8]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_basic_header(&mut cursor, 1, csid);

        let field = min(delta, 0xffffff);
        cursor.write_u24::<BigEndian>(field).unwrap();
        cursor.write_u24::<BigEndian>(payload.len() as u32).unwrap();
        cursor.write_u8(type_id).unwrap();

        if field == 0xffffff {
            cursor.write_u32::<BigEndian>(delta).unwrap();
        }

        cursor.write_all(payload).unwrap();
        cursor.into_inner()
    }

    fn form_type_2_chunk(csid: u32, delta: u32, payload: &[u8]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_basic_header(&mut cursor, 2, csid);

        let field = min(delta, 0xffffff);
        cursor.write_u24::<BigEndian>(field).unwrap();
        if field == 0xffffff {
            cursor.write_u32::<BigEndian>(delta).unwrap();
        }

        cursor.write_all(payload).unwrap();
        cursor.into_inner()
    }

    fn form_type_3_continuations(csid: u32, payload: &[u8], max_chunk_size: usize) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        for slice in payload.chunks(max_chunk_size) {
            write_basic_header(&mut cursor, 3, csid);
            cursor.write_all(slice).unwrap();
        }

        cursor.into_inner()
    }

    #[tokio::test]
    async fn reads_type_0_chunk_with_small_timestamp() {
        let payload = [1_u8, 2, 3];
        let bytes = form_type_0_chunk(50, 25, 5, 3, &payload, 128);
        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;

        let result = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(result.type_id, 3);
        assert_eq!(result.timestamp, Timestamp::new(25));
        assert_eq!(result.message_stream_id, 5);
        assert_eq!(&result.data[..], &payload[..]);
    }

    #[tokio::test]
    async fn reads_type_0_chunk_with_two_byte_csid() {
        let payload = [1_u8, 2, 3];
        let bytes = form_type_0_chunk(300, 25, 5, 3, &payload, 128);
        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;

        let result = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(&result.data[..], &payload[..]);
    }

    #[tokio::test]
    async fn reads_type_0_chunk_with_three_byte_csid() {
        let payload = [1_u8, 2, 3];
        let bytes = form_type_0_chunk(50000, 25, 5, 3, &payload, 128);
        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;

        let result = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(&result.data[..], &payload[..]);
    }

    #[tokio::test]
    async fn reads_type_0_chunk_with_extended_timestamp() {
        let payload = [1_u8, 2, 3];
        let bytes = form_type_0_chunk(50, 16777216, 5, 3, &payload, 128);
        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;

        let result = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(result.timestamp, Timestamp::new(16777216));
        assert_eq!(&result.data[..], &payload[..]);
    }

    #[tokio::test]
    async fn type_1_and_2_chunks_accumulate_deltas() {
        let payload = [1_u8, 2, 3];
        let mut bytes = form_type_0_chunk(50, 25, 5, 3, &payload, 128);
        bytes.extend(form_type_1_chunk(50, 10, 4, &payload));
        bytes.extend(form_type_2_chunk(50, 11, &payload));
        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;

        let first = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(first.timestamp, Timestamp::new(25));

        let second = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(second.timestamp, Timestamp::new(35));
        assert_eq!(second.type_id, 4);

        let third = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(third.timestamp, Timestamp::new(46));
        assert_eq!(third.type_id, 4);
    }

    #[tokio::test]
    async fn type_3_chunk_opening_new_message_reapplies_delta() {
        let payload = [1_u8, 2, 3];
        let mut bytes = form_type_0_chunk(50, 25, 5, 3, &payload, 128);
        bytes.extend(form_type_2_chunk(50, 11, &payload));

        let mut cursor = Cursor::new(Vec::new());
        write_basic_header(&mut cursor, 3, 50);
        cursor.write_all(&payload).unwrap();
        bytes.extend(cursor.into_inner());

        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;
        let _ = decoder.read_message(&mut io).await.unwrap();
        let _ = decoder.read_message(&mut io).await.unwrap();
        let third = decoder.read_message(&mut io).await.unwrap();

        assert_eq!(third.timestamp, Timestamp::new(25 + 11 + 11));
        assert_eq!(&third.data[..], &payload[..]);
    }

    #[tokio::test]
    async fn reads_message_exceeding_max_chunk_size() {
        let payload = [100_u8; 500];
        let bytes = form_type_0_chunk(50, 25, 5, 3, &payload, 100);
        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;
        decoder.set_max_chunk_size(100).unwrap();

        let result = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(&result.data[..], &payload[..]);
        assert_eq!(result.timestamp, Timestamp::new(25));
    }

    #[tokio::test]
    async fn extended_timestamp_continuation_bytes_are_disambiguated() {
        // A 300 byte message with timestamp 0x01000000 on csid 4 with 128
        // byte chunks.  The second chunk repeats the extended timestamp
        // bytes; the third does not, and its first four body bytes happen to
        // look nothing like the timestamp.
        let mut payload = (0_u8..=255).cycle().take(300).collect::<Vec<u8>>();
        payload[256] = 0xde;
        payload[257] = 0xad;
        payload[258] = 0xbe;
        payload[259] = 0xef;

        let mut cursor = Cursor::new(Vec::new());
        write_basic_header(&mut cursor, 0, 4);
        cursor.write_u24::<BigEndian>(0xffffff).unwrap();
        cursor.write_u24::<BigEndian>(300).unwrap();
        cursor.write_u8(9).unwrap();
        cursor.write_u32::<LittleEndian>(1).unwrap();
        cursor.write_u32::<BigEndian>(0x0100_0000).unwrap();
        cursor.write_all(&payload[0..128]).unwrap();

        // chunk 2: extended timestamp bytes repeated before the body
        write_basic_header(&mut cursor, 3, 4);
        cursor.write_u32::<BigEndian>(0x0100_0000).unwrap();
        cursor.write_all(&payload[128..256]).unwrap();

        // chunk 3: body bytes immediately
        write_basic_header(&mut cursor, 3, 4);
        cursor.write_all(&payload[256..300]).unwrap();

        let bytes = cursor.into_inner();
        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;

        let result = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(result.timestamp, Timestamp::new(0x0100_0000));
        assert_eq!(result.data.len(), 300);
        assert_eq!(&result.data[..], &payload[..]);
    }

    #[tokio::test]
    async fn chunk_size_change_applies_from_next_chunk_boundary() {
        // The in-flight message keeps its old chunk boundary; new reads use
        // the updated size.
        let small_payload = [9_u8; 100];
        let large_payload = [7_u8; 600];

        let mut bytes = form_type_0_chunk(10, 25, 5, 3, &small_payload, 128);
        bytes.extend(form_type_0_chunk(11, 30, 5, 3, &large_payload, 512));

        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;

        let first = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(&first.data[..], &small_payload[..]);

        decoder.set_max_chunk_size(512).unwrap();
        let second = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(&second.data[..], &large_payload[..]);
    }

    #[tokio::test]
    async fn non_type_0_chunk_on_fresh_csid_is_rejected() {
        let bytes = form_type_1_chunk(50, 10, 4, &[1, 2, 3]);
        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;

        match decoder.read_message(&mut io).await {
            Err(ChunkDecodeError::NoPreviousChunk { csid: 50, fmt: 1 }) => (),
            x => panic!("Expected NoPreviousChunk, got {:?}", x),
        }
    }

    #[tokio::test]
    async fn header_bearing_chunk_mid_message_is_rejected() {
        let payload = [1_u8; 300];
        let full = form_type_0_chunk(10, 25, 5, 3, &payload, 128);

        // first chunk of the split message, then an unexpected fresh header
        let mut bytes = full[..(12 + 128)].to_vec();
        bytes.extend(form_type_0_chunk(10, 30, 5, 3, &[1, 2, 3], 128));

        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;
        match decoder.read_message(&mut io).await {
            Err(ChunkDecodeError::InterruptedMessage {
                csid: 10,
                remaining: 172,
            }) => (),
            x => panic!("Expected InterruptedMessage, got {:?}", x),
        }
    }

    #[tokio::test]
    async fn rejects_out_of_range_chunk_sizes() {
        let mut decoder = ChunkDecoder::new();
        match decoder.set_max_chunk_size(0x8000_0000) {
            Err(ChunkDecodeError::InvalidMaxChunkSize {
                chunk_size: 0x8000_0000,
            }) => (),
            x => panic!("Expected InvalidMaxChunkSize, got {:?}", x),
        }

        match decoder.set_max_chunk_size(0) {
            Err(ChunkDecodeError::InvalidMaxChunkSize { chunk_size: 0 }) => (),
            x => panic!("Expected InvalidMaxChunkSize, got {:?}", x),
        }
    }

    #[tokio::test]
    async fn obs_style_type_3_split_does_not_reapply_delta() {
        // OBS sends a type 1 chunk with a delta for a video message, then
        // continues that same message with type 3 chunks.  The delta must be
        // applied exactly once.
        let chunk1 = [
            0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x09, 0x01, 0x00, 0x00, 0x00, 0x01,
        ];
        let chunk2 = [
            0x44, 0x00, 0x00, 0x21, 0x00, 0x00, 0x05, 0x09, 0x01, 0x02, 0x03, 0x04, 0xc4, 0x05,
        ];

        let mut bytes = chunk1.to_vec();
        bytes.extend(chunk2);

        let (mut decoder, mut io) = decoder_with_bytes(&bytes).await;
        decoder.set_max_chunk_size(4).unwrap();

        let first = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(first.timestamp, Timestamp::new(0));
        assert_eq!(&first.data[..], &[0x01]);

        let second = decoder.read_message(&mut io).await.unwrap();
        assert_eq!(second.timestamp, Timestamp::new(0x21));
        assert_eq!(&second.data[..], &[0x01, 0x02, 0x03, 0x04, 0x05]);
    }
}

use crate::messages::MessagePayload;
use crate::time::Timestamp;
use bytes::BytesMut;

/// Per-csid reassembly state, one per chunk stream per direction.
///
/// Holds the last seen header fields (later chunks borrow from them) and the
/// partially reassembled body.  `body_index() + body_remain == message_length`
/// at all times while a message is in flight.
#[derive(Debug)]
pub struct ChunkStream {
    pub csid: u32,

    /// Format of the most recent header-bearing chunk (0..=2)
    pub last_fmt: u8,

    /// Absolute message timestamp, deltas already applied
    pub timestamp: Timestamp,

    /// Raw value of the last 3 byte timestamp field (absolute or delta)
    pub timestamp_field: u32,

    /// Whether the last header used the extended timestamp form
    pub time_extended: bool,

    pub message_length: u32,
    pub message_type_id: u8,
    pub message_stream_id: u32,

    pub body_remain: u32,
    body: BytesMut,
}

impl ChunkStream {
    pub fn new(csid: u32) -> ChunkStream {
        ChunkStream {
            csid,
            last_fmt: 0,
            timestamp: Timestamp::new(0),
            timestamp_field: 0,
            time_extended: false,
            message_length: 0,
            message_type_id: 0,
            message_stream_id: 0,
            body_remain: 0,
            body: BytesMut::new(),
        }
    }

    pub fn body_index(&self) -> u32 {
        self.body.len() as u32
    }

    /// Starts reassembly of a fresh message using the current header fields
    pub fn begin_message(&mut self) {
        self.body.clear();
        self.body.reserve(self.message_length as usize);
        self.body_remain = self.message_length;
    }

    /// Appends one chunk's worth of body bytes; returns true once the
    /// message is complete
    pub fn append_body(&mut self, bytes: &[u8]) -> bool {
        debug_assert!(bytes.len() as u32 <= self.body_remain);

        self.body.extend_from_slice(bytes);
        self.body_remain -= bytes.len() as u32;

        debug_assert_eq!(self.body_index() + self.body_remain, self.message_length);
        self.body_remain == 0
    }

    /// Hands the completed message upstream and leaves the slot ready for
    /// the next message on this csid
    pub fn take_payload(&mut self) -> MessagePayload {
        debug_assert_eq!(self.body_remain, 0);

        MessagePayload {
            timestamp: self.timestamp,
            type_id: self.message_type_id,
            message_stream_id: self.message_stream_id,
            data: self.body.split().freeze(),
        }
    }
}

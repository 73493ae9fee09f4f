//! The audio/video/metadata packet shape that flows from a publisher through
//! the router into subscriber queues.  A packet is immutable once built; the
//! router and every holding subscriber share it behind an `Arc`, and the
//! payload itself is a refcounted [`Bytes`] so fan-out never copies media.

use crate::flv::{SoundFormat, VideoCodec, VideoFrameType};
use bytes::Bytes;

/// Which of the three relayed message classes a packet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Audio,
    Video,
    Metadata,
}

/// Codec-level facts about a packet, produced by [`crate::flv::demux_header`]
/// from the first payload bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagHeader {
    Audio {
        sound_format: SoundFormat,
        is_sequence_header: bool,
    },

    Video {
        frame_type: VideoFrameType,
        codec: VideoCodec,
        is_sequence_header: bool,
        /// AVC/HEVC composition time offset in milliseconds
        composition_time: i32,
    },
}

/// One relayed audio, video or metadata message
#[derive(Debug, Clone)]
pub struct Packet {
    pub kind: PacketKind,
    pub stream_id: u32,
    /// Publisher-side timestamp in milliseconds
    pub timestamp: u32,
    pub data: Bytes,
    pub header: Option<TagHeader>,
}

impl Packet {
    pub fn new(kind: PacketKind, stream_id: u32, timestamp: u32, data: Bytes) -> Packet {
        Packet {
            kind,
            stream_id,
            timestamp,
            data,
            header: None,
        }
    }

    pub fn is_audio(&self) -> bool {
        self.kind == PacketKind::Audio
    }

    pub fn is_video(&self) -> bool {
        self.kind == PacketKind::Video
    }

    pub fn is_metadata(&self) -> bool {
        self.kind == PacketKind::Metadata
    }

    /// True for AAC `AudioSpecificConfig` and AVC/HEVC `SPS`/`PPS` packets
    pub fn is_sequence_header(&self) -> bool {
        match self.header {
            Some(TagHeader::Audio {
                is_sequence_header, ..
            }) => is_sequence_header,
            Some(TagHeader::Video {
                is_sequence_header, ..
            }) => is_sequence_header,
            None => false,
        }
    }

    /// True for video key frames that are not sequence headers
    pub fn is_key_frame(&self) -> bool {
        match self.header {
            Some(TagHeader::Video {
                frame_type,
                is_sequence_header,
                ..
            }) => frame_type.is_key_frame() && !is_sequence_header,
            _ => false,
        }
    }
}

//! FLV tag header inspection.
//!
//! RTMP audio and video messages are FLV tag bodies: the first byte (and for
//! AVC-family codecs the second) carries everything the relay needs to know
//! about a packet without touching the codec bitstream: frame type, codec,
//! and whether the packet is a sequence header.

use crate::av::{Packet, PacketKind, TagHeader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlvError {
    /// The payload was too short to carry a tag header
    #[error("AV packet of {length} bytes is too short to carry a tag header")]
    TagTooShort { length: usize },
}

/// Video frame type, upper nibble of the first video payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    KeyFrame,
    InterFrame,
    DisposableInterFrame,
    GeneratedKeyFrame,
    VideoInfoFrame,
    Unknown(u8),
}

impl VideoFrameType {
    fn from_nibble(value: u8) -> VideoFrameType {
        match value {
            1 => VideoFrameType::KeyFrame,
            2 => VideoFrameType::InterFrame,
            3 => VideoFrameType::DisposableInterFrame,
            4 => VideoFrameType::GeneratedKeyFrame,
            5 => VideoFrameType::VideoInfoFrame,
            x => VideoFrameType::Unknown(x),
        }
    }

    pub fn is_key_frame(&self) -> bool {
        matches!(
            self,
            VideoFrameType::KeyFrame | VideoFrameType::GeneratedKeyFrame
        )
    }
}

/// Video codec id, lower nibble of the first video payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    SorensonH263,
    ScreenVideo,
    Vp6,
    Vp6Alpha,
    ScreenVideoV2,
    Avc,
    Hevc,
    Av1,
    Unknown(u8),
}

impl VideoCodec {
    fn from_nibble(value: u8) -> VideoCodec {
        match value {
            2 => VideoCodec::SorensonH263,
            3 => VideoCodec::ScreenVideo,
            4 => VideoCodec::Vp6,
            5 => VideoCodec::Vp6Alpha,
            6 => VideoCodec::ScreenVideoV2,
            7 => VideoCodec::Avc,
            12 => VideoCodec::Hevc,
            13 => VideoCodec::Av1,
            x => VideoCodec::Unknown(x),
        }
    }

    /// Codecs that prefix the payload with an AVCPacketType byte and a
    /// 24 bit composition time offset
    fn has_avc_packet_header(&self) -> bool {
        matches!(self, VideoCodec::Avc | VideoCodec::Hevc)
    }
}

/// Audio encoding, upper nibble of the first audio payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundFormat {
    LinearPcm,
    Adpcm,
    Mp3,
    LinearPcmLe,
    Nellymoser16kHz,
    Nellymoser8kHz,
    Nellymoser,
    G711ALaw,
    G711MuLaw,
    Aac,
    Speex,
    Mp38kHz,
    DeviceSpecific,
    Unknown(u8),
}

impl SoundFormat {
    fn from_nibble(value: u8) -> SoundFormat {
        match value {
            0 => SoundFormat::LinearPcm,
            1 => SoundFormat::Adpcm,
            2 => SoundFormat::Mp3,
            3 => SoundFormat::LinearPcmLe,
            4 => SoundFormat::Nellymoser16kHz,
            5 => SoundFormat::Nellymoser8kHz,
            6 => SoundFormat::Nellymoser,
            7 => SoundFormat::G711ALaw,
            8 => SoundFormat::G711MuLaw,
            10 => SoundFormat::Aac,
            11 => SoundFormat::Speex,
            14 => SoundFormat::Mp38kHz,
            15 => SoundFormat::DeviceSpecific,
            x => SoundFormat::Unknown(x),
        }
    }
}

/// Inspects the first payload bytes of an audio or video packet and fills in
/// its [`TagHeader`].  Metadata packets carry no tag header and pass through
/// untouched.
pub fn demux_header(packet: &mut Packet) -> Result<(), FlvError> {
    match packet.kind {
        PacketKind::Audio => demux_audio(packet),
        PacketKind::Video => demux_video(packet),
        PacketKind::Metadata => Ok(()),
    }
}

fn demux_audio(packet: &mut Packet) -> Result<(), FlvError> {
    if packet.data.is_empty() {
        return Err(FlvError::TagTooShort { length: 0 });
    }

    let sound_format = SoundFormat::from_nibble(packet.data[0] >> 4);

    // AAC packets carry an AACPacketType byte: 0 marks the
    // AudioSpecificConfig sequence header, 1 marks raw frames.
    let is_sequence_header =
        sound_format == SoundFormat::Aac && packet.data.len() > 1 && packet.data[1] == 0;

    packet.header = Some(TagHeader::Audio {
        sound_format,
        is_sequence_header,
    });

    Ok(())
}

fn demux_video(packet: &mut Packet) -> Result<(), FlvError> {
    if packet.data.is_empty() {
        return Err(FlvError::TagTooShort { length: 0 });
    }

    let frame_type = VideoFrameType::from_nibble((packet.data[0] >> 4) & 0x0f);
    let codec = VideoCodec::from_nibble(packet.data[0] & 0x0f);

    let mut is_sequence_header = false;
    let mut composition_time = 0_i32;

    if codec.has_avc_packet_header() {
        if packet.data.len() < 5 {
            return Err(FlvError::TagTooShort {
                length: packet.data.len(),
            });
        }

        // AVCPacketType 0 is the SPS/PPS sequence header; the following
        // three bytes are a signed 24 bit composition time offset.
        is_sequence_header = packet.data[1] == 0;
        composition_time = ((packet.data[2] as i32) << 16
            | (packet.data[3] as i32) << 8
            | packet.data[4] as i32)
            << 8
            >> 8;
    }

    packet.header = Some(TagHeader::Video {
        frame_type,
        codec,
        is_sequence_header,
        composition_time,
    });

    Ok(())
}

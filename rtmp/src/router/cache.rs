use crate::av::{Packet, PacketKind};
use std::sync::Arc;

/// The decoder startup prologue retained per stream source.
///
/// A subscriber joining mid-stream needs, in order: the `onMetaData`
/// packet, the audio and video sequence headers, and every frame since the
/// last video key frame.  The cache always represents exactly that; a new
/// key frame resets the GOP and starts accumulating from itself.
pub struct GopCache {
    metadata: Option<Arc<Packet>>,
    audio_sequence_header: Option<Arc<Packet>>,
    video_sequence_header: Option<Arc<Packet>>,
    gop: Vec<Arc<Packet>>,
    gop_started: bool,
}

impl GopCache {
    pub fn new() -> GopCache {
        GopCache {
            metadata: None,
            audio_sequence_header: None,
            video_sequence_header: None,
            gop: Vec::new(),
            gop_started: false,
        }
    }

    /// Feeds one publisher packet through the cache
    pub fn write(&mut self, packet: &Arc<Packet>) {
        match packet.kind {
            PacketKind::Metadata => {
                self.metadata = Some(packet.clone());
            }

            PacketKind::Audio => {
                if packet.is_sequence_header() {
                    self.audio_sequence_header = Some(packet.clone());
                } else if self.gop_started {
                    self.gop.push(packet.clone());
                }
            }

            PacketKind::Video => {
                if packet.is_sequence_header() {
                    self.video_sequence_header = Some(packet.clone());
                } else if packet.is_key_frame() {
                    self.gop.clear();
                    self.gop.push(packet.clone());
                    self.gop_started = true;
                } else if self.gop_started {
                    self.gop.push(packet.clone());
                }
            }
        }
    }

    /// The warm-up sequence for a newly attached subscriber, in decoder
    /// prologue order
    pub fn snapshot(&self) -> Vec<Arc<Packet>> {
        let mut packets = Vec::with_capacity(self.gop.len() + 3);

        if let Some(metadata) = &self.metadata {
            packets.push(metadata.clone());
        }
        if let Some(header) = &self.audio_sequence_header {
            packets.push(header.clone());
        }
        if let Some(header) = &self.video_sequence_header {
            packets.push(header.clone());
        }
        packets.extend(self.gop.iter().cloned());

        packets
    }

    pub fn gop_len(&self) -> usize {
        self.gop.len()
    }
}

impl Default for GopCache {
    fn default() -> Self {
        GopCache::new()
    }
}

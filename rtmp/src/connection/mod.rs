//! Per-connection plumbing: the buffered duplex and the [`Conn`] wrapper
//! that pairs the chunk codec with RTMP flow control.

mod duplex;

pub use self::duplex::BufDuplex;

use crate::chunk::{
    ChunkDecodeError, ChunkDecoder, ChunkEncodeError, ChunkEncoder, MAX_MESSAGE_LENGTH,
};
use crate::config::RtmpConfig;
use crate::messages::{MessageEncodeError, MessagePayload, RtmpMessage};
use crate::time::Timestamp;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{trace, warn};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to decode inbound chunk stream: {0}")]
    ChunkDecode(#[from] ChunkDecodeError),

    #[error("Failed to encode outbound chunk stream: {0}")]
    ChunkEncode(#[from] ChunkEncodeError),

    #[error("Failed to encode outbound message: {0}")]
    MessageEncode(#[from] MessageEncodeError),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Identity a connection acquires during the `connect`/`publish`/`play`
/// dialogue
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub app: String,
    pub tc_url: String,
    pub domain: String,
    pub stream_name: String,
}

impl Identity {
    /// Canonical stream key binding publishers and subscribers
    pub fn stream_key(&self) -> String {
        format!("{}/{}/{}", self.domain, self.app, self.stream_name)
    }
}

/// One RTMP connection after the handshake: the buffered duplex, the chunk
/// codec state for both directions, and the flow-control counters.
pub struct Conn<S> {
    io: BufDuplex<S>,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
    peer_addr: String,
    started: Instant,

    local_chunk_size: u32,
    local_window_ack_size: u32,
    remote_window_ack_size: u32,

    bytes_received: u32,
    bytes_received_wraps: u32,
    ack_sequence: u32,

    pub identity: Identity,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Conn<S> {
    pub fn new(io: BufDuplex<S>, peer_addr: String, config: &RtmpConfig) -> Conn<S> {
        Conn {
            io,
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
            peer_addr,
            started: Instant::now(),
            local_chunk_size: config.local_chunk_size.clamp(1, MAX_MESSAGE_LENGTH),
            local_window_ack_size: config.local_window_ack_size,
            remote_window_ack_size: config.remote_window_ack_size,
            bytes_received: 0,
            bytes_received_wraps: 0,
            ack_sequence: 0,
            identity: Identity::default(),
        }
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn local_window_ack_size(&self) -> u32 {
        self.local_window_ack_size
    }

    pub fn local_chunk_size(&self) -> u32 {
        self.local_chunk_size
    }

    pub fn ack_sequence(&self) -> u32 {
        self.ack_sequence
    }

    pub fn bytes_received(&self) -> (u32, u32) {
        (self.bytes_received, self.bytes_received_wraps)
    }

    /// Milliseconds since this connection was accepted, as an RTMP timestamp
    pub fn epoch(&self) -> Timestamp {
        Timestamp::new(self.started.elapsed().as_millis() as u32)
    }

    /// Completes once inbound bytes are buffered.  Cancellation safe, unlike
    /// [`Conn::recv_message`], so it is the arm to select on while also
    /// draining a packet queue.
    pub async fn readable(&mut self) -> Result<(), ConnectionError> {
        self.io.readable().await?;
        Ok(())
    }

    /// Reads the next complete message, applies protocol-control side
    /// effects, and keeps the acknowledgement counters fed.
    ///
    /// A payload that fails typed decoding is surfaced as
    /// [`RtmpMessage::Unknown`] rather than tearing the connection down.
    pub async fn recv_message(&mut self) -> Result<(MessagePayload, RtmpMessage), ConnectionError> {
        let payload = self.decoder.read_message(&mut self.io).await?;

        let message = match payload.to_rtmp_message() {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    event = "decode message",
                    addr = %self.peer_addr,
                    type_id = payload.type_id,
                    %error,
                    "undecodable message treated as unknown"
                );

                RtmpMessage::Unknown {
                    type_id: payload.type_id,
                    data: payload.data.clone(),
                }
            }
        };

        self.handle_protocol_control(&message).await?;
        self.acknowledge(payload.data.len() as u32).await?;

        Ok((payload, message))
    }

    pub async fn send_message(
        &mut self,
        message: RtmpMessage,
        timestamp: Timestamp,
        stream_id: u32,
    ) -> Result<(), ConnectionError> {
        let payload = MessagePayload::from_rtmp_message(message, timestamp, stream_id)?;
        self.encoder.write_message(&mut self.io, &payload).await?;
        Ok(())
    }

    pub async fn send_payload(&mut self, payload: &MessagePayload) -> Result<(), ConnectionError> {
        self.encoder.write_message(&mut self.io, payload).await?;
        Ok(())
    }

    /// Announces our chunk size and switches the encoder over to it
    pub async fn send_local_chunk_size(&mut self) -> Result<(), ConnectionError> {
        let size = self.local_chunk_size;
        self.send_message(RtmpMessage::SetChunkSize { size }, self.epoch(), 0)
            .await?;
        self.encoder.set_max_chunk_size(size);
        Ok(())
    }

    async fn handle_protocol_control(
        &mut self,
        message: &RtmpMessage,
    ) -> Result<(), ConnectionError> {
        match message {
            RtmpMessage::SetChunkSize { size } => {
                let clamped = (*size).clamp(1, MAX_MESSAGE_LENGTH);
                if clamped != *size {
                    warn!(
                        event = "set chunk size",
                        addr = %self.peer_addr,
                        requested = size,
                        clamped,
                        "peer requested out of range chunk size"
                    );
                }

                self.decoder.set_max_chunk_size(clamped)?;
                trace!(event = "save remote chunk size", size = clamped);
            }

            RtmpMessage::WindowAcknowledgement { size } => {
                self.remote_window_ack_size = *size;
                trace!(event = "save remote window ack size", size);
            }

            RtmpMessage::SetPeerBandwidth { .. } => {
                // Acknowledged by announcing our own window
                let size = self.local_window_ack_size;
                self.send_message(RtmpMessage::WindowAcknowledgement { size }, self.epoch(), 0)
                    .await?;
            }

            // Informational only
            RtmpMessage::Acknowledgement { .. } | RtmpMessage::Abort { .. } => {}

            _ => {}
        }

        Ok(())
    }

    /// Feeds the received-bytes counters and emits an Acknowledgement once
    /// the peer's announced window is consumed
    async fn acknowledge(&mut self, size: u32) -> Result<(), ConnectionError> {
        let (value, wrapped) = self.bytes_received.overflowing_add(size);
        if wrapped {
            self.bytes_received = 0;
            self.bytes_received_wraps += 1;
        } else {
            self.bytes_received = value;
        }

        self.ack_sequence = self.ack_sequence.wrapping_add(size);
        if self.ack_sequence >= self.remote_window_ack_size {
            let sequence_number = self.ack_sequence;
            self.send_message(
                RtmpMessage::Acknowledgement { sequence_number },
                self.epoch(),
                0,
            )
            .await?;

            self.ack_sequence = 0;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkDecoder, ChunkEncoder};
    use bytes::Bytes;

    fn test_config() -> RtmpConfig {
        RtmpConfig::default()
    }

    async fn conn_pair() -> (
        Conn<tokio::io::DuplexStream>,
        BufDuplex<tokio::io::DuplexStream>,
    ) {
        let (client, server) = tokio::io::duplex(1 << 22);
        let conn = Conn::new(
            BufDuplex::new(server),
            "127.0.0.1:9999".to_string(),
            &test_config(),
        );
        (conn, BufDuplex::new(client))
    }

    #[tokio::test]
    async fn acknowledgement_emitted_after_window_is_consumed() {
        let (mut conn, mut client) = conn_pair().await;

        let mut client_encoder = ChunkEncoder::new();
        let payload = MessagePayload {
            timestamp: Timestamp::new(0),
            type_id: 8,
            message_stream_id: 1,
            data: Bytes::from(vec![0_u8; 60_000]),
        };

        // 60 KB per message against the default 250 KB remote window: the
        // fifth message crosses the threshold.
        for _ in 0..5 {
            client_encoder
                .write_message(&mut client, &payload)
                .await
                .unwrap();
        }

        for _ in 0..5 {
            let _ = conn.recv_message().await.unwrap();
        }

        assert_eq!(conn.ack_sequence(), 0, "counter resets after the ack");
        assert_eq!(conn.bytes_received(), (300_000, 0));

        let mut client_decoder = ChunkDecoder::new();
        let ack = client_decoder.read_message(&mut client).await.unwrap();
        match ack.to_rtmp_message().unwrap() {
            RtmpMessage::Acknowledgement { sequence_number } => {
                assert!(sequence_number >= 250_000);
                assert_eq!(sequence_number, 300_000);
            }
            x => panic!("Expected acknowledgement, got {:?}", x),
        }
    }

    #[tokio::test]
    async fn set_peer_bandwidth_is_answered_with_window_ack_size() {
        let (mut conn, mut client) = conn_pair().await;

        let mut client_encoder = ChunkEncoder::new();
        let message = RtmpMessage::SetPeerBandwidth {
            size: 5_000_000,
            limit_type: crate::messages::PeerBandwidthLimitType::Dynamic,
        };
        let payload = MessagePayload::from_rtmp_message(message, Timestamp::new(0), 0).unwrap();
        client_encoder
            .write_message(&mut client, &payload)
            .await
            .unwrap();

        let _ = conn.recv_message().await.unwrap();

        let mut client_decoder = ChunkDecoder::new();
        let reply = client_decoder.read_message(&mut client).await.unwrap();
        assert_eq!(
            reply.to_rtmp_message().unwrap(),
            RtmpMessage::WindowAcknowledgement { size: 2_500_000 }
        );
    }

    #[tokio::test]
    async fn peer_chunk_size_is_clamped_into_range() {
        let (mut conn, mut client) = conn_pair().await;

        let mut client_encoder = ChunkEncoder::new();
        let message = RtmpMessage::SetChunkSize { size: 0x7fff_ffff };
        let payload = MessagePayload::from_rtmp_message(message, Timestamp::new(0), 0).unwrap();
        client_encoder
            .write_message(&mut client, &payload)
            .await
            .unwrap();

        let (_, message) = conn.recv_message().await.unwrap();
        assert_eq!(message, RtmpMessage::SetChunkSize { size: 0x7fff_ffff });
        assert_eq!(conn.decoder.max_chunk_size(), 16_777_215);
    }

    #[tokio::test]
    async fn undecodable_message_surfaces_as_unknown() {
        let (mut conn, mut client) = conn_pair().await;

        let mut client_encoder = ChunkEncoder::new();
        // A user control message with a truncated body
        let payload = MessagePayload {
            timestamp: Timestamp::new(0),
            type_id: 4,
            message_stream_id: 0,
            data: Bytes::from(vec![0x00]),
        };
        client_encoder
            .write_message(&mut client, &payload)
            .await
            .unwrap();

        let (_, message) = conn.recv_message().await.unwrap();
        assert_eq!(
            message,
            RtmpMessage::Unknown {
                type_id: 4,
                data: Bytes::from(vec![0x00]),
            }
        );
    }

    #[test]
    fn stream_key_is_domain_app_name() {
        let identity = Identity {
            app: "live".to_string(),
            tc_url: "rtmp://example.com/live".to_string(),
            domain: "example.com".to_string(),
            stream_name: "cam1".to_string(),
        };

        assert_eq!(identity.stream_key(), "example.com/live/cam1");
    }
}

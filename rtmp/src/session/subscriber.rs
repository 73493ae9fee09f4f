//! The playing cycle: drains a subscriber's packet queue back onto the
//! wire, rebasing timestamps so the stream appears to start at zero.

use super::{ServerSession, SessionError};
use crate::av::{Packet, PacketKind};
use crate::messages::{type_ids, MessagePayload, RtmpMessage};
use crate::router::SubscriberHandle;
use crate::time::Timestamp;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

/// Maps publisher timestamps into the subscriber's timeline.
///
/// The first packet sent sets the base; every later packet carries its
/// offset from that base.  Audio and video are separately clamped to be
/// non-decreasing, so a subscriber never sees time move backwards within a
/// type.
struct TimestampRebase {
    base: Option<u32>,
    last_audio: Timestamp,
    last_video: Timestamp,
}

impl TimestampRebase {
    fn new() -> TimestampRebase {
        TimestampRebase {
            base: None,
            last_audio: Timestamp::new(0),
            last_video: Timestamp::new(0),
        }
    }

    fn rebase(&mut self, packet: &Packet) -> Timestamp {
        let base = *self.base.get_or_insert(packet.timestamp);
        let mut timestamp = Timestamp::new(packet.timestamp) - base;

        match packet.kind {
            PacketKind::Audio => {
                if timestamp < self.last_audio {
                    timestamp = self.last_audio;
                }
                self.last_audio = timestamp;
            }

            PacketKind::Video => {
                if timestamp < self.last_video {
                    timestamp = self.last_video;
                }
                self.last_video = timestamp;
            }

            PacketKind::Metadata => {}
        }

        timestamp
    }
}

/// Sends queued packets to the peer until the queue closes or the peer
/// tears the stream down.  Inbound messages are still serviced between
/// packets so `deleteStream` and protocol control keep working while
/// playing.
pub(super) async fn playing_cycle<S>(
    session: &mut ServerSession<S>,
    handle: &Arc<SubscriberHandle>,
    stream_id: u32,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut rebase = TimestampRebase::new();

    loop {
        tokio::select! {
            packet = handle.queue.pop() => {
                let packet = match packet {
                    Some(packet) => packet,
                    // Queue closed: the stream source went away
                    None => return Ok(()),
                };

                send_packet(session, &packet, &mut rebase, stream_id).await?;
            }

            readable = session.conn.readable() => {
                readable?;
                let (payload, message) = session.conn.recv_message().await?;

                if let RtmpMessage::Amf0Command { command_name, transaction_id, .. } = message {
                    match command_name.as_str() {
                        "deleteStream" | "closeStream" => {
                            info!(
                                event = "stop playing",
                                addr = session.conn.peer_addr(),
                                command = %command_name,
                            );
                            return Ok(());
                        }

                        _ => {
                            if transaction_id > 0.0 {
                                session
                                    .send_null_result(transaction_id, payload.message_stream_id)
                                    .await?;
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn send_packet<S>(
    session: &mut ServerSession<S>,
    packet: &Packet,
    rebase: &mut TimestampRebase,
    stream_id: u32,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let type_id = match packet.kind {
        PacketKind::Audio => type_ids::AUDIO,
        PacketKind::Video => type_ids::VIDEO,
        PacketKind::Metadata => type_ids::AMF0_DATA,
    };

    let payload = MessagePayload {
        timestamp: rebase.rebase(packet),
        type_id,
        message_stream_id: stream_id,
        data: packet.data.clone(),
    };

    session
        .conn
        .send_payload(&payload)
        .await
        .map_err(SessionError::Connection)
}

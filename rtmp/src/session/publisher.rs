//! The publishing cycle: the chunk-read loop of a connection that won the
//! publisher slot for its stream key.

use super::{ServerSession, SessionError};
use crate::av::{Packet, PacketKind};
use crate::flv;
use crate::messages::RtmpMessage;
use crate::router::StreamSource;
use bytes::Bytes;
use rivulet_amf0::Amf0Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Reads messages until the publisher disconnects or tears its stream down.
/// Audio, video and data messages become AV packets that feed the GOP cache
/// and fan out to subscribers; cache update strictly precedes dispatch so a
/// subscriber attached in between never misses prologue state.
pub(super) async fn publishing_cycle<S>(
    session: &mut ServerSession<S>,
    source: &Arc<StreamSource>,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let (payload, message) = session.conn.recv_message().await?;

        let packet = match message {
            RtmpMessage::AudioData { data } => Packet::new(
                PacketKind::Audio,
                payload.message_stream_id,
                payload.timestamp.value,
                data,
            ),

            RtmpMessage::VideoData { data } => Packet::new(
                PacketKind::Video,
                payload.message_stream_id,
                payload.timestamp.value,
                data,
            ),

            RtmpMessage::Amf0Data { values } => {
                match metadata_packet(values, &payload) {
                    Some(packet) => packet,
                    None => continue,
                }
            }

            RtmpMessage::Amf0Command {
                command_name,
                transaction_id,
                ..
            } => {
                match command_name.as_str() {
                    "deleteStream" | "closeStream" | "FCUnpublish" => {
                        if transaction_id > 0.0 {
                            session
                                .send_null_result(transaction_id, payload.message_stream_id)
                                .await?;
                        }

                        info!(
                            event = "unpublish",
                            stream_key = source.stream_key(),
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
                        continue;
                    }
                }
            }

            other => {
                debug!(
                    event = "publishing",
                    stream_key = source.stream_key(),
                    "ignoring message {:?}",
                    super::message_name(&other)
                );
                continue;
            }
        };

        let mut packet = packet;
        if let Err(error) = flv::demux_header(&mut packet) {
            warn!(
                event = "flv demux header",
                stream_key = source.stream_key(),
                addr = session.conn.peer_addr(),
                %error,
            );
        }

        let packet = Arc::new(packet);
        source.cache_av_packet(&packet);
        source.dispatch_av_packet(&packet);
    }
}

/// Turns an AMF0 data message into a metadata packet.
///
/// Encoders publish metadata as `@setDataFrame, onMetaData, {...}`; the
/// leading marker is stripped and the remainder re-encoded so subscribers
/// receive a clean `onMetaData` message.
fn metadata_packet(
    mut values: Vec<Amf0Value>,
    payload: &crate::messages::MessagePayload,
) -> Option<Packet> {
    match values.first() {
        Some(Amf0Value::Utf8String(marker)) if marker == "@setDataFrame" => {
            values.remove(0);
        }
        _ => {}
    }

    if values.is_empty() {
        return None;
    }

    let data = match rivulet_amf0::serialize(&values) {
        Ok(bytes) => Bytes::from(bytes),
        Err(error) => {
            warn!(event = "re-encode metadata", %error);
            return None;
        }
    };

    Some(Packet::new(
        PacketKind::Metadata,
        payload.message_stream_id,
        payload.timestamp.value,
        data,
    ))
}

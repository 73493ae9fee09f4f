//! The AMF0 command dialogue that turns a freshly handshaken connection
//! into a publisher or a subscriber.
//!
//! States advance `AwaitConnect -> AwaitCreateStream -> AwaitPublishOrPlay`
//! and resolve into `Publishing` or `Playing`, at which point the session
//! hands off to the matching cycle in [`publisher`] or [`subscriber`].

mod errors;
mod publisher;
mod subscriber;


pub use self::errors::SessionError;

use crate::config::RtmpConfig;
use crate::connection::Conn;
use crate::messages::{RtmpMessage, PeerBandwidthLimitType, UserControlEventType, type_ids};
use crate::router::{PublisherHandle, StreamRouter, StreamSource, SubscriberHandle};
use rivulet_amf0::Amf0Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    AwaitConnect,
    AwaitCreateStream,
    AwaitPublishOrPlay,
}

/// How the dialogue resolved
enum Role {
    Publisher {
        source: Arc<StreamSource>,
    },
    Subscriber {
        stream_key: String,
        handle: Arc<SubscriberHandle>,
        stream_id: u32,
    },
}

/// The server side of one RTMP connection, from `connect` to teardown
pub struct ServerSession<S> {
    conn: Conn<S>,
    router: Arc<StreamRouter>,
    state: SessionState,
    next_stream_id: u32,
    fms_version: String,
    peer_bandwidth: u32,
    subscriber_queue_capacity: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServerSession<S> {
    pub fn new(conn: Conn<S>, router: Arc<StreamRouter>, config: &RtmpConfig) -> ServerSession<S> {
        ServerSession {
            conn,
            router,
            state: SessionState::AwaitConnect,
            next_stream_id: 1,
            fms_version: config.fms_version.clone(),
            peer_bandwidth: config.peer_bandwidth,
            subscriber_queue_capacity: config.subscriber_queue_capacity,
        }
    }

    /// Drives the connection to completion: the command dialogue, then the
    /// publishing or playing cycle.  Registration with the router is undone
    /// on every exit path, including errors.
    pub async fn run(mut self) -> Result<(), SessionError> {
        match self.dialogue().await? {
            Role::Publisher { source } => {
                let stream_key = source.stream_key().to_string();
                let result = publisher::publishing_cycle(&mut self, &source).await;
                self.router.detach_publisher(&stream_key);
                result
            }

            Role::Subscriber {
                stream_key,
                handle,
                stream_id,
            } => {
                let result = subscriber::playing_cycle(&mut self, &handle, stream_id).await;
                self.router.detach_subscriber(&stream_key, &handle.peer_addr);
                result
            }
        }
    }

    async fn dialogue(&mut self) -> Result<Role, SessionError> {
        loop {
            let (payload, message) = self.conn.recv_message().await?;

            match message {
                RtmpMessage::Amf0Command {
                    command_name,
                    transaction_id,
                    command_object,
                    additional_arguments,
                } => {
                    if let Some(role) = self
                        .handle_command(
                            payload.message_stream_id,
                            command_name,
                            transaction_id,
                            command_object,
                            additional_arguments,
                        )
                        .await?
                    {
                        return Ok(role);
                    }
                }

                // A command that failed AMF decoding before the dialogue is
                // established leaves nothing to negotiate with
                RtmpMessage::Unknown { type_id, .. }
                    if self.state == SessionState::AwaitConnect
                        && (type_id == type_ids::AMF0_COMMAND
                            || type_id == type_ids::AMF3_COMMAND) =>
                {
                    return Err(SessionError::InvalidConnect);
                }

                other => {
                    debug!(
                        event = "dialogue",
                        addr = self.conn.peer_addr(),
                        "ignoring non-command message {:?} before role resolution",
                        message_name(&other)
                    );
                }
            }
        }
    }

    async fn handle_command(
        &mut self,
        stream_id: u32,
        name: String,
        transaction_id: f64,
        command_object: Amf0Value,
        additional_args: Vec<Amf0Value>,
    ) -> Result<Option<Role>, SessionError> {
        match name.as_str() {
            "connect" if self.state == SessionState::AwaitConnect => {
                self.handle_connect(transaction_id, command_object).await?;
                Ok(None)
            }

            "createStream" if self.state != SessionState::AwaitConnect => {
                self.handle_create_stream(transaction_id).await?;
                Ok(None)
            }

            "publish" if self.state == SessionState::AwaitPublishOrPlay => {
                self.handle_publish(stream_id, additional_args).await
            }

            "play" if self.state == SessionState::AwaitPublishOrPlay => {
                self.handle_play(stream_id, additional_args).await
            }

            // Idempotent no-ops various encoders emit around publish/play
            "releaseStream" | "FCPublish" | "FCUnpublish" | "FCSubscribe" => {
                self.send_null_result(transaction_id, stream_id).await?;
                Ok(None)
            }

            _ => {
                debug!(
                    event = "unhandled command",
                    addr = self.conn.peer_addr(),
                    command = %name,
                    state = ?self.state,
                );

                if transaction_id > 0.0 {
                    self.send_null_result(transaction_id, stream_id).await?;
                }

                Ok(None)
            }
        }
    }

    async fn handle_connect(
        &mut self,
        transaction_id: f64,
        command_object: Amf0Value,
    ) -> Result<(), SessionError> {
        let mut properties = command_object
            .get_object_properties()
            .ok_or(SessionError::InvalidConnect)?;

        let app = match properties.remove("app").and_then(Amf0Value::get_string) {
            Some(app) => app.trim_end_matches('/').to_string(),
            None => return Err(SessionError::InvalidConnect),
        };

        let tc_url = properties
            .remove("tcUrl")
            .and_then(Amf0Value::get_string)
            .unwrap_or_default();

        let object_encoding = properties
            .remove("objectEncoding")
            .and_then(Amf0Value::get_number)
            .unwrap_or(0.0);

        self.conn.identity.domain = parse_domain(&tc_url).unwrap_or_else(|| "localhost".to_string());
        self.conn.identity.app = app.clone();
        self.conn.identity.tc_url = tc_url;

        info!(
            event = "connect",
            addr = self.conn.peer_addr(),
            app = %app,
            tc_url = %self.conn.identity.tc_url,
        );

        let window_ack_size = self.conn.local_window_ack_size();
        let epoch = self.conn.epoch();
        self.conn
            .send_message(
                RtmpMessage::WindowAcknowledgement {
                    size: window_ack_size,
                },
                epoch,
                0,
            )
            .await
            .map_err(SessionError::Connection)?;

        let epoch = self.conn.epoch();
        self.conn
            .send_message(
                RtmpMessage::SetPeerBandwidth {
                    size: self.peer_bandwidth,
                    limit_type: PeerBandwidthLimitType::Dynamic,
                },
                epoch,
                0,
            )
            .await
            .map_err(SessionError::Connection)?;

        self.conn
            .send_local_chunk_size()
            .await
            .map_err(SessionError::Connection)?;

        let epoch = self.conn.epoch();
        self.conn
            .send_message(
                RtmpMessage::UserControl {
                    event_type: UserControlEventType::StreamBegin,
                    stream_id: Some(0),
                    buffer_length: None,
                    timestamp: None,
                },
                epoch,
                0,
            )
            .await
            .map_err(SessionError::Connection)?;

        let mut command_properties = HashMap::new();
        command_properties.insert(
            "fmsVer".to_string(),
            Amf0Value::Utf8String(self.fms_version.clone()),
        );
        command_properties.insert("capabilities".to_string(), Amf0Value::Number(31.0));

        let mut info = create_status_object(
            "status",
            "NetConnection.Connect.Success",
            "Connection succeeded.",
        );
        info.insert(
            "objectEncoding".to_string(),
            Amf0Value::Number(object_encoding),
        );

        let epoch = self.conn.epoch();
        self.conn
            .send_message(
                RtmpMessage::Amf0Command {
                    command_name: "_result".to_string(),
                    transaction_id,
                    command_object: Amf0Value::Object(command_properties),
                    additional_arguments: vec![Amf0Value::Object(info)],
                },
                epoch,
                0,
            )
            .await
            .map_err(SessionError::Connection)?;

        self.state = SessionState::AwaitCreateStream;
        Ok(())
    }

    async fn handle_create_stream(&mut self, transaction_id: f64) -> Result<(), SessionError> {
        let stream_id = self.next_stream_id;
        self.next_stream_id += 1;

        let epoch = self.conn.epoch();
        self.conn
            .send_message(
                RtmpMessage::Amf0Command {
                    command_name: "_result".to_string(),
                    transaction_id,
                    command_object: Amf0Value::Null,
                    additional_arguments: vec![Amf0Value::Number(stream_id as f64)],
                },
                epoch,
                0,
            )
            .await
            .map_err(SessionError::Connection)?;

        self.state = SessionState::AwaitPublishOrPlay;
        Ok(())
    }

    async fn handle_publish(
        &mut self,
        stream_id: u32,
        mut args: Vec<Amf0Value>,
    ) -> Result<Option<Role>, SessionError> {
        if args.is_empty() {
            warn!(
                event = "publish",
                addr = self.conn.peer_addr(),
                "publish command without a stream name"
            );
            return Ok(None);
        }

        let name = match args.remove(0) {
            Amf0Value::Utf8String(name) => name,
            _ => return Ok(None),
        };

        // Publishing type: live, record or append; only live relaying is
        // implemented and the value is informational
        let publish_type = if args.is_empty() {
            "live".to_string()
        } else {
            args.remove(0).get_string().unwrap_or_default()
        };

        self.apply_stream_name(&name);
        let stream_key = self.conn.identity.stream_key();

        let handle = PublisherHandle {
            peer_addr: self.conn.peer_addr().to_string(),
        };

        let source = match self.router.attach_publisher(&stream_key, handle) {
            Ok(source) => source,
            Err(error) => {
                warn!(
                    event = "publish",
                    stream_key = %stream_key,
                    addr = self.conn.peer_addr(),
                    "stream key conflict"
                );

                self.send_on_status(
                    "error",
                    "NetStream.Publish.BadName",
                    "Stream key is already being published.",
                    stream_id,
                )
                .await?;

                return Err(SessionError::Router(error));
            }
        };

        info!(
            event = "publish",
            stream_key = %stream_key,
            addr = self.conn.peer_addr(),
            publish_type = %publish_type,
            session_id = source.session_id(),
        );

        self.send_on_status(
            "status",
            "NetStream.Publish.Start",
            &format!("Publishing {}.", self.conn.identity.stream_name),
            stream_id,
        )
        .await?;

        Ok(Some(Role::Publisher { source }))
    }

    async fn handle_play(
        &mut self,
        stream_id: u32,
        mut args: Vec<Amf0Value>,
    ) -> Result<Option<Role>, SessionError> {
        if args.is_empty() {
            warn!(
                event = "play",
                addr = self.conn.peer_addr(),
                "play command without a stream name"
            );
            return Ok(None);
        }

        let name = match args.remove(0) {
            Amf0Value::Utf8String(name) => name,
            _ => return Ok(None),
        };

        self.apply_stream_name(&name);
        let stream_key = self.conn.identity.stream_key();

        let epoch = self.conn.epoch();
        self.conn
            .send_message(
                RtmpMessage::UserControl {
                    event_type: UserControlEventType::StreamBegin,
                    stream_id: Some(stream_id),
                    buffer_length: None,
                    timestamp: None,
                },
                epoch,
                0,
            )
            .await
            .map_err(SessionError::Connection)?;

        self.send_on_status(
            "status",
            "NetStream.Play.Reset",
            &format!("Resetting {}.", self.conn.identity.stream_name),
            stream_id,
        )
        .await?;

        self.send_on_status(
            "status",
            "NetStream.Play.Start",
            &format!("Playing {}.", self.conn.identity.stream_name),
            stream_id,
        )
        .await?;

        let epoch = self.conn.epoch();
        self.conn
            .send_message(
                RtmpMessage::UserControl {
                    event_type: UserControlEventType::StreamIsRecorded,
                    stream_id: Some(stream_id),
                    buffer_length: None,
                    timestamp: None,
                },
                epoch,
                0,
            )
            .await
            .map_err(SessionError::Connection)?;

        let handle = Arc::new(SubscriberHandle::new(
            self.conn.peer_addr().to_string(),
            self.subscriber_queue_capacity,
        ));

        if !self.router.attach_subscriber(&stream_key, handle.clone()) {
            return Err(SessionError::SubscriberRejected {
                stream_key,
                addr: self.conn.peer_addr().to_string(),
            });
        }

        info!(
            event = "play",
            stream_key = %stream_key,
            addr = self.conn.peer_addr(),
        );

        Ok(Some(Role::Subscriber {
            stream_key,
            handle,
            stream_id,
        }))
    }

    /// Applies the publish/play stream name, honoring a `tcUrl` query
    /// override the way relaying encoders pass one through
    fn apply_stream_name(&mut self, name: &str) {
        let (name, query) = match name.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (name, None),
        };

        self.conn.identity.stream_name = name.to_string();

        if let Some(query) = query {
            for pair in query.split('&') {
                if let Some(tc_url) = pair.strip_prefix("tcUrl=") {
                    if let Some(domain) = parse_domain(tc_url) {
                        self.conn.identity.tc_url = tc_url.to_string();
                        self.conn.identity.domain = domain;
                    }
                }
            }
        }
    }

    async fn send_null_result(
        &mut self,
        transaction_id: f64,
        stream_id: u32,
    ) -> Result<(), SessionError> {
        let epoch = self.conn.epoch();
        self.conn
            .send_message(
                RtmpMessage::Amf0Command {
                    command_name: "_result".to_string(),
                    transaction_id,
                    command_object: Amf0Value::Null,
                    additional_arguments: Vec::new(),
                },
                epoch,
                stream_id,
            )
            .await
            .map_err(SessionError::Connection)
    }

    async fn send_on_status(
        &mut self,
        level: &str,
        code: &str,
        description: &str,
        stream_id: u32,
    ) -> Result<(), SessionError> {
        let status = create_status_object(level, code, description);
        let epoch = self.conn.epoch();
        self.conn
            .send_message(
                RtmpMessage::Amf0Command {
                    command_name: "onStatus".to_string(),
                    transaction_id: 0.0,
                    command_object: Amf0Value::Null,
                    additional_arguments: vec![Amf0Value::Object(status)],
                },
                epoch,
                stream_id,
            )
            .await
            .map_err(SessionError::Connection)
    }
}

fn create_status_object(
    level: &str,
    code: &str,
    description: &str,
) -> HashMap<String, Amf0Value> {
    let mut properties = HashMap::new();
    properties.insert(
        "level".to_string(),
        Amf0Value::Utf8String(level.to_string()),
    );
    properties.insert("code".to_string(), Amf0Value::Utf8String(code.to_string()));
    properties.insert(
        "description".to_string(),
        Amf0Value::Utf8String(description.to_string()),
    );
    properties
}

/// Pulls the host out of `rtmp://host[:port]/app` style URLs
fn parse_domain(tc_url: &str) -> Option<String> {
    let rest = tc_url.split_once("://").map(|(_, rest)| rest)?;
    let host_port = rest.split('/').next()?;
    let host = host_port.split(':').next()?;

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

fn message_name(message: &RtmpMessage) -> &'static str {
    match message {
        RtmpMessage::Unknown { .. } => "unknown",
        RtmpMessage::Abort { .. } => "abort",
        RtmpMessage::Acknowledgement { .. } => "acknowledgement",
        RtmpMessage::Amf0Command { .. } => "amf0 command",
        RtmpMessage::Amf0Data { .. } => "amf0 data",
        RtmpMessage::AudioData { .. } => "audio",
        RtmpMessage::SetChunkSize { .. } => "set chunk size",
        RtmpMessage::SetPeerBandwidth { .. } => "set peer bandwidth",
        RtmpMessage::UserControl { .. } => "user control",
        RtmpMessage::VideoData { .. } => "video",
        RtmpMessage::WindowAcknowledgement { .. } => "window acknowledgement",
    }
}

#[cfg(test)]
mod unit_tests {
    use super::parse_domain;

    #[test]
    fn parses_domain_from_tc_url() {
        assert_eq!(
            parse_domain("rtmp://example.com/live"),
            Some("example.com".to_string())
        );
        assert_eq!(
            parse_domain("rtmp://example.com:1935/live"),
            Some("example.com".to_string())
        );
        assert_eq!(
            parse_domain("rtmp://10.0.0.1:1935"),
            Some("10.0.0.1".to_string())
        );
        assert_eq!(parse_domain("example.com/live"), None);
        assert_eq!(parse_domain("rtmp://"), None);
    }
}

use serde::Deserialize;

/// Tunables for the RTMP listener and its connections.  Every field has a
/// protocol-sensible default so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, Deserialize)]
pub struct RtmpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Chunk size we announce to peers with SetChunkSize
    #[serde(default = "default_chunk_size")]
    pub local_chunk_size: u32,

    /// Window size we announce; the peer must ack after this many bytes
    #[serde(default = "default_local_window_ack_size")]
    pub local_window_ack_size: u32,

    /// Window size assumed for the peer until it announces its own
    #[serde(default = "default_remote_window_ack_size")]
    pub remote_window_ack_size: u32,

    /// Bandwidth advertised in the SetPeerBandwidth reply to `connect`
    #[serde(default = "default_peer_bandwidth")]
    pub peer_bandwidth: u32,

    /// Capacity of each subscriber's packet queue
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Seconds a disconnected publisher may reclaim its stream key before
    /// the stream source is torn down
    #[serde(default = "default_publisher_grace_secs")]
    pub publisher_grace_secs: u64,

    /// Version string reported in the `connect` reply
    #[serde(default = "default_fms_version")]
    pub fms_version: String,
}

impl Default for RtmpConfig {
    fn default() -> Self {
        RtmpConfig {
            bind_address: default_bind_address(),
            local_chunk_size: default_chunk_size(),
            local_window_ack_size: default_local_window_ack_size(),
            remote_window_ack_size: default_remote_window_ack_size(),
            peer_bandwidth: default_peer_bandwidth(),
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            publisher_grace_secs: default_publisher_grace_secs(),
            fms_version: default_fms_version(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:1935".to_string()
}

fn default_chunk_size() -> u32 {
    128
}

fn default_local_window_ack_size() -> u32 {
    2_500_000
}

fn default_remote_window_ack_size() -> u32 {
    250_000
}

fn default_peer_bandwidth() -> u32 {
    2_500_000
}

fn default_subscriber_queue_capacity() -> usize {
    1024
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_publisher_grace_secs() -> u64 {
    60
}

fn default_fms_version() -> String {
    "FMS/3,0,1,123".to_string()
}

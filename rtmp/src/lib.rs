//! RTMP ingest/egress core.
//!
//! A connection is accepted, handshaken, and driven through the AMF0 command
//! dialogue until it resolves into a publisher or a subscriber of a stream
//! key.  Publishers feed decoded audio/video/metadata packets into the
//! [`router::StreamRouter`], which caches the decoder startup prologue (GOP
//! cache) and fans packets out into bounded per-subscriber queues.
//! Subscribers drain their queue and re-encode packets back onto the wire
//! with rebased timestamps.

pub mod av;
pub mod chunk;
pub mod config;
pub mod connection;
pub mod flv;
pub mod handshake;
pub mod messages;
pub mod router;
pub mod server;
pub mod session;
pub mod time;

pub use config::RtmpConfig;
pub use router::StreamRouter;
pub use server::{listen, serve};

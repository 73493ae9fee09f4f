//! The process-wide stream router: binds at most one publisher per stream
//! key, fans packets out to that key's subscribers, and keeps the GOP cache
//! every new subscriber warms up from.

mod cache;
mod queue;

pub use self::cache::GopCache;
pub use self::queue::PacketQueue;

use crate::av::Packet;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RouterError {
    /// Another connection is already publishing on the stream key
    #[error("Stream key {stream_key} already has a publisher")]
    PublisherConflict { stream_key: String },
}

/// The publisher currently bound to a stream source
#[derive(Debug, Clone)]
pub struct PublisherHandle {
    pub peer_addr: String,
}

/// One attached subscriber: its identity plus the bounded queue its send
/// loop drains
pub struct SubscriberHandle {
    pub peer_addr: String,
    pub queue: PacketQueue,
}

impl SubscriberHandle {
    pub fn new(peer_addr: String, queue_capacity: usize) -> SubscriberHandle {
        SubscriberHandle {
            peer_addr,
            queue: PacketQueue::new(queue_capacity),
        }
    }
}

/// Everything the router tracks for one stream key
pub struct StreamSource {
    stream_key: String,
    session_id: String,
    publisher: Mutex<Option<PublisherHandle>>,
    subscribers: Mutex<HashMap<String, Arc<SubscriberHandle>>>,
    cache: Mutex<GopCache>,
}

impl StreamSource {
    fn new(stream_key: String) -> StreamSource {
        StreamSource {
            stream_key,
            session_id: Uuid::new_v4().to_string(),
            publisher: Mutex::new(None),
            subscribers: Mutex::new(HashMap::new()),
            cache: Mutex::new(GopCache::new()),
        }
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn has_publisher(&self) -> bool {
        self.publisher.lock().is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Updates the GOP cache.  Runs before fan-out for every publisher
    /// packet.
    pub fn cache_av_packet(&self, packet: &Arc<Packet>) {
        self.cache.lock().write(packet);
    }

    /// Fans one packet out to every attached subscriber.  The subscriber
    /// set lock is held only for the non-blocking enqueues.
    pub fn dispatch_av_packet(&self, packet: &Arc<Packet>) {
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.values() {
            if subscriber.queue.is_closed() {
                continue;
            }

            subscriber.queue.push(packet.clone());
        }
    }

    fn close_subscribers(&self) {
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.values() {
            subscriber.queue.close();
        }
    }
}

/// Concurrent map from stream key to stream source, shared by every
/// connection task.  The map itself sits behind an `Arc` so the delayed
/// deletion timers can outlive the borrow that scheduled them.
pub struct StreamRouter {
    streams: Arc<DashMap<String, Arc<StreamSource>>>,
    publisher_grace: Duration,
    shutdown: watch::Sender<bool>,
}

impl StreamRouter {
    pub fn new(publisher_grace: Duration) -> StreamRouter {
        let (shutdown, _) = watch::channel(false);
        StreamRouter {
            streams: Arc::new(DashMap::new()),
            publisher_grace,
            shutdown,
        }
    }

    pub fn get_or_create(&self, stream_key: &str) -> Arc<StreamSource> {
        self.streams
            .entry(stream_key.to_string())
            .or_insert_with(|| Arc::new(StreamSource::new(stream_key.to_string())))
            .clone()
    }

    pub fn get(&self, stream_key: &str) -> Option<Arc<StreamSource>> {
        self.streams.get(stream_key).map(|entry| entry.clone())
    }

    /// Binds a publisher to the stream key.  Fails when the key already has
    /// a live publisher; a stale source whose publisher slot was cleared is
    /// reclaimed as-is.
    pub fn attach_publisher(
        &self,
        stream_key: &str,
        publisher: PublisherHandle,
    ) -> Result<Arc<StreamSource>, RouterError> {
        let source = self.get_or_create(stream_key);

        let mut slot = source.publisher.lock();
        if slot.is_some() {
            return Err(RouterError::PublisherConflict {
                stream_key: stream_key.to_string(),
            });
        }

        *slot = Some(publisher);
        drop(slot);

        info!(event = "attach publisher", stream_key, session_id = source.session_id());
        Ok(source)
    }

    /// Clears the publisher slot and schedules the grace-window check: one
    /// minute later the source is deleted only if it is still
    /// publisher-less, letting a reconnecting publisher reclaim its key.
    /// Pending checks die with [`StreamRouter::shutdown`].
    pub fn detach_publisher(&self, stream_key: &str) {
        let source = match self.get(stream_key) {
            Some(source) => source,
            None => return,
        };

        *source.publisher.lock() = None;
        info!(event = "detach publisher", stream_key);

        let streams = self.streams.clone();
        let stream_key = stream_key.to_string();
        let grace = self.publisher_grace;
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace) => {}
                _ = shutdown.changed() => return,
            }

            delete_if_publisherless(&streams, &stream_key);
        });
    }

    pub fn attach_subscriber(&self, stream_key: &str, subscriber: Arc<SubscriberHandle>) -> bool {
        let source = self.get_or_create(stream_key);

        let mut subscribers = source.subscribers.lock();
        if subscribers.contains_key(&subscriber.peer_addr) {
            return false;
        }

        // Warm-up: the current cache contents, already in decoder prologue
        // order, go into the queue before any live packet can.
        for packet in source.cache.lock().snapshot() {
            subscriber.queue.push(packet);
        }

        info!(
            event = "attach subscriber",
            stream_key,
            addr = %subscriber.peer_addr,
            warmed_up = subscriber.queue.len()
        );

        subscribers.insert(subscriber.peer_addr.clone(), subscriber);
        true
    }

    pub fn detach_subscriber(&self, stream_key: &str, peer_addr: &str) {
        let source = match self.get(stream_key) {
            Some(source) => source,
            None => return,
        };

        let removed = source.subscribers.lock().remove(peer_addr);
        if let Some(subscriber) = removed {
            subscriber.queue.close();
            debug!(event = "detach subscriber", stream_key, addr = peer_addr);
        }
    }

    /// Cancels pending grace timers so they cannot touch the map during
    /// teardown
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

fn delete_if_publisherless(streams: &DashMap<String, Arc<StreamSource>>, stream_key: &str) {
    let source = match streams.get(stream_key).map(|entry| entry.clone()) {
        Some(source) => source,
        None => return,
    };

    if source.has_publisher() {
        // A publisher reclaimed the key inside the grace window
        return;
    }

    streams.remove(stream_key);
    source.close_subscribers();
    info!(event = "delete stream source", stream_key);
}

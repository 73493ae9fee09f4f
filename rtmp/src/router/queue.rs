use crate::av::Packet;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// A bounded FIFO of shared packets between the router's fan-out and one
/// subscriber's send loop.
///
/// Enqueueing never blocks: when the queue approaches capacity a trim pass
/// sheds load by class.  Audio goes first (an audible glitch beats a video
/// freeze), non-key video frames go next, and sequence headers, key frames
/// and metadata are preserved so the decoder recovers on the next GOP
/// boundary.
pub struct PacketQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

struct Inner {
    items: VecDeque<Arc<Packet>>,
    closed: bool,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> PacketQueue {
        PacketQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Enqueues a packet.  Once the queue is within 24 slots of capacity
    /// the packet is discarded and a trim pass sheds already-queued load
    /// instead; the length never exceeds capacity.
    pub fn push(&self, packet: Arc<Packet>) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }

        if inner.items.len() + 24 >= self.capacity {
            self.trim(&mut inner.items);
        } else {
            inner.items.push_back(packet);
        }

        drop(inner);
        self.notify.notify_one();
    }

    /// Dequeues the next packet, waiting for one to arrive.  Returns `None`
    /// once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Arc<Packet>> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(packet) = inner.items.pop_front() {
                    return Some(packet);
                }

                if inner.closed {
                    return None;
                }
            }

            self.notify.notified().await;
        }
    }

    /// Closes the queue; the subscriber's send loop drains what is left and
    /// exits
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_one();
    }

    fn trim(&self, items: &mut VecDeque<Arc<Packet>>) {
        for _ in 0..self.capacity.saturating_sub(84) {
            let packet = match items.pop_front() {
                Some(packet) => packet,
                None => break,
            };

            if packet.is_audio() {
                if items.len() + 2 > self.capacity {
                    continue; // sacrificed
                }

                items.push_back(packet);
            } else if packet.is_video() {
                if packet.is_sequence_header() || packet.is_key_frame() {
                    items.push_back(packet);
                }

                if items.len() + 10 > self.capacity {
                    let _ = items.pop_front();
                }
            } else {
                items.push_back(packet);
            }
        }
    }

    #[cfg(test)]
    fn push_unchecked(&self, packet: Arc<Packet>) {
        self.inner.lock().items.push_back(packet);
    }
}

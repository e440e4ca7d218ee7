//! Module that delivers accepted payloads to all live subscribers.
//!
//! Two channels exist. The room channel queues every payload for all current room members
//! (served as server-sent events). The socket channel holds one sink per raw socket client
//! and skips a client whose queue is closed or full. Both are driven through
//! [`SubscriberSink`] so the fan-out does not care which is which.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::record::SensorReading;

/// Name of the event emitted on the room channel.
pub const SENSOR_EVENT: &str = "sensor-data";

/// Capacity of the room channel and of every socket queue.
const QUEUE_CAPACITY: usize = 64;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
/// A payload handed to subscribers.
pub enum Payload {
    /// A reading that was just persisted.
    Reading(SensorReading),
    /// An undecoded frame from the legacy radar device.
    Raw(String),
}

impl Payload {
    /// The payload as sent over raw sockets.
    pub fn to_text(&self) -> String {
        match self {
            Payload::Reading(reading) => serde_json::to_string(reading).unwrap_or_default(),
            Payload::Raw(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Skipped,
}

/// A destination that accepts payloads without blocking.
pub trait SubscriberSink: Send + Sync {
    fn try_send(&self, payload: &Payload) -> Delivery;
}

/// Room-style channel, every member receives every payload queued for it.
#[derive(Debug, Clone)]
pub struct RoomChannel
{
    tx: broadcast::Sender<Payload>,
}

impl RoomChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(QUEUE_CAPACITY);
        RoomChannel { tx }
    }

    /// Joins the room. Members that fall behind lose the oldest payloads.
    pub fn join(&self) -> broadcast::Receiver<Payload> {
        self.tx.subscribe()
    }

    pub fn members(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RoomChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberSink for RoomChannel {
    fn try_send(&self, payload: &Payload) -> Delivery {
        match self.tx.send(payload.clone()) {
            Ok(_) => Delivery::Delivered,
            Err(_) => Delivery::Skipped,
        }
    }
}

/// Outbound queue of a single raw socket client.
#[derive(Debug, Clone)]
pub struct SocketSubscriber
{
    tx: mpsc::Sender<String>,
}

impl SocketSubscriber {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        SocketSubscriber { tx }
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl SubscriberSink for SocketSubscriber {
    fn try_send(&self, payload: &Payload) -> Delivery {
        if !self.is_open() {
            return Delivery::Skipped;
        }
        match self.tx.try_send(payload.to_text()) {
            Ok(_) => Delivery::Delivered,
            Err(_) => Delivery::Skipped,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport
{
    pub delivered: usize,
    pub skipped: usize,
}

impl FanoutReport {
    fn count(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Delivered => self.delivered += 1,
            Delivery::Skipped => self.skipped += 1,
        }
    }
}

/// Registry of all subscribers and entry point of the fan-out.
#[derive(Debug, Default)]
pub struct Fanout
{
    room: RoomChannel,
    sockets: Mutex<HashMap<u64, SocketSubscriber>>,
    next_socket_id: AtomicU64,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&self) -> &RoomChannel {
        &self.room
    }

    /// Registers a raw socket client. Returns its id and the queue to drain into the socket.
    pub fn register_socket(&self) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let id = self.next_socket_id.fetch_add(1, Ordering::Relaxed);
        self.sockets().insert(id, SocketSubscriber::new(tx));
        log::debug!(target: "sensorlogd::fanout", "Registered socket subscriber {}", id);
        (id, rx)
    }

    pub fn unregister_socket(&self, id: u64) {
        if self.sockets().remove(&id).is_some() {
            log::debug!(target: "sensorlogd::fanout", "Removed socket subscriber {}", id);
        }
    }

    pub fn socket_count(&self) -> usize {
        self.sockets().len()
    }

    /// Delivers `payload` to the room and to every socket subscriber.
    ///
    /// Never blocks and never fails, subscribers that cannot take the payload are skipped.
    pub fn broadcast(&self, payload: &Payload) -> FanoutReport {
        let mut report = FanoutReport::default();
        report.count(self.room.try_send(payload));

        let mut sockets = self.sockets();
        for (id, subscriber) in sockets.iter() {
            let delivery = subscriber.try_send(payload);
            if delivery == Delivery::Skipped {
                log::trace!(target: "sensorlogd::fanout", "Skipped socket subscriber {}", id);
            }
            report.count(delivery);
        }
        sockets.retain(|_, subscriber| subscriber.is_open());

        log::debug!(target: "sensorlogd::fanout", "Broadcast delivered: {}, skipped: {}",
                    report.delivered, report.skipped);
        report
    }

    fn sockets(&self) -> MutexGuard<'_, HashMap<u64, SocketSubscriber>> {
        self.sockets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> Payload {
        Payload::Reading(SensorReading {
            temperature: 24.5,
            humidity: 60.0,
            lux: 300.0,
            timestamp: String::from("2024-05-01 10:00:00"),
        })
    }

    #[test]
    fn skips_closed_socket_subscribers() {
        let fanout = Fanout::new();
        let (_, mut first) = fanout.register_socket();
        let (_, closed) = fanout.register_socket();
        let (_, mut third) = fanout.register_socket();
        drop(closed);

        let report = fanout.broadcast(&reading());

        // the room has no members, so only the two open sockets receive the payload
        assert_eq!(report, FanoutReport { delivered: 2, skipped: 2 });
        assert!(first.try_recv().unwrap().contains("\"temperatura\":24.5"));
        assert!(third.try_recv().is_ok());
        assert_eq!(fanout.socket_count(), 2);
    }

    #[test]
    fn room_members_receive_payload() {
        let fanout = Fanout::new();
        let mut member = fanout.room().join();

        let report = fanout.broadcast(&reading());

        assert_eq!(report.delivered, 1);
        assert_eq!(member.try_recv().unwrap(), reading());
    }

    #[test]
    fn full_socket_queue_is_skipped_not_blocked() {
        let fanout = Fanout::new();
        let (_, _slow) = fanout.register_socket();

        for _ in 0..QUEUE_CAPACITY {
            fanout.broadcast(&Payload::Raw(String::from("45,120")));
        }
        let report = fanout.broadcast(&Payload::Raw(String::from("45,121")));

        assert_eq!(report.delivered, 0);
        assert_eq!(fanout.socket_count(), 1);
    }

    #[test]
    fn raw_payload_is_forwarded_verbatim() {
        assert_eq!(Payload::Raw(String::from("45,120")).to_text(), "45,120");
    }

    #[test]
    fn unregistered_socket_no_longer_receives() {
        let fanout = Fanout::new();
        let (id, mut rx) = fanout.register_socket();
        fanout.unregister_socket(id);

        let report = fanout.broadcast(&reading());
        assert_eq!(report.delivered, 0);
        assert!(rx.try_recv().is_err());
    }
}

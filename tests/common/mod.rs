//! Fixtures shared by the integration tests.
#![allow(dead_code)]
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;

use sensorlogd::clock::Normalizer;
use sensorlogd::database::{RecordStore, StoreError};
use sensorlogd::fanout::Fanout;
use sensorlogd::ingest::Ingestor;
use sensorlogd::record::{AccessEvent, SensorReading};

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps inserted rows in vectors, the position is the sequence.
#[derive(Default)]
pub struct VecStore
{
    sensors: RwLock<Vec<SensorReading>>,
    accesses: RwLock<Vec<AccessEvent>>,
}

impl VecStore {
    pub async fn sensor_readings(&self) -> Vec<SensorReading> {
        self.sensors.read().await.clone()
    }

    pub async fn access_events(&self) -> Vec<AccessEvent> {
        self.accesses.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for VecStore {
    async fn insert_sensor_reading(&self, reading: &SensorReading) -> Result<(), StoreError> {
        self.sensors.write().await.push(reading.clone());
        Ok(())
    }

    async fn insert_access_event(&self, event: &AccessEvent) -> Result<(), StoreError> {
        self.accesses.write().await.push(event.clone());
        Ok(())
    }

    async fn latest_access_event(&self) -> Result<Option<AccessEvent>, StoreError> {
        Ok(self.accesses.read().await.last().cloned())
    }

    async fn recent_sensor_readings(&self, limit: usize) -> Result<Vec<SensorReading>, StoreError> {
        Ok(self.sensors.read().await.iter().rev().take(limit).cloned().collect())
    }
}

/// Store whose database is never reachable.
pub struct DownStore;

#[async_trait]
impl RecordStore for DownStore {
    async fn insert_sensor_reading(&self, _: &SensorReading) -> Result<(), StoreError> {
        Err(StoreError::Unavailable)
    }

    async fn insert_access_event(&self, _: &AccessEvent) -> Result<(), StoreError> {
        Err(StoreError::Unavailable)
    }

    async fn latest_access_event(&self) -> Result<Option<AccessEvent>, StoreError> {
        Err(StoreError::Unavailable)
    }

    async fn recent_sensor_readings(&self, _: usize) -> Result<Vec<SensorReading>, StoreError> {
        Err(StoreError::Unavailable)
    }
}

pub fn ingestor(store: Arc<dyn RecordStore>) -> Ingestor {
    let zone = FixedOffset::west_opt(4 * 3600).unwrap();
    Ingestor::new(store, Arc::new(Fanout::new()), Normalizer::new(zone))
}

/// Plain TCP client speaking just enough HTTP/1.1 and websocket framing for the tests.
pub struct RawClient
{
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl RawClient {
    pub async fn connect(address: SocketAddr) -> Self {
        let stream = TcpStream::connect(address).await.unwrap();
        RawClient { stream, buffer: Vec::new() }
    }

    pub async fn send(&mut self, request: &str) {
        self.stream.write_all(request.as_bytes()).await.unwrap();
    }

    async fn fill(&mut self) {
        let mut chunk = [0u8; 1024];
        let read = timeout(READ_TIMEOUT, self.stream.read(&mut chunk)).await.unwrap().unwrap();
        assert!(read > 0, "connection closed by the server");
        self.buffer.extend_from_slice(&chunk[..read]);
    }

    /// Reads through the blank line ending the response head and returns the head.
    pub async fn read_head(&mut self) -> String {
        loop {
            if let Some(end) = find(&self.buffer, b"\r\n\r\n") {
                let head: Vec<u8> = self.buffer.drain(..end + 4).collect();
                return String::from_utf8(head).unwrap();
            }
            self.fill().await;
        }
    }

    /// Reads until `marker` was received and returns everything read so far.
    pub async fn read_until(&mut self, marker: &str) -> String {
        while find(&self.buffer, marker.as_bytes()).is_none() {
            self.fill().await;
        }
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Reads everything until the server closes the connection.
    pub async fn read_to_end(&mut self) -> String {
        timeout(READ_TIMEOUT, self.stream.read_to_end(&mut self.buffer)).await.unwrap().unwrap();
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Reads one unmasked server frame and returns its opcode and payload.
    pub async fn read_frame(&mut self) -> (u8, Vec<u8>) {
        while self.buffer.len() < 2 {
            self.fill().await;
        }
        let opcode = self.buffer[0] & 0x0f;
        let (header, length) = match self.buffer[1] & 0x7f {
            126 => {
                while self.buffer.len() < 4 {
                    self.fill().await;
                }
                (4, u16::from_be_bytes([self.buffer[2], self.buffer[3]]) as usize)
            }
            length => (2, length as usize),
        };
        while self.buffer.len() < header + length {
            self.fill().await;
        }
        let frame: Vec<u8> = self.buffer.drain(..header + length).collect();
        (opcode, frame[header..].to_vec())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

//! In-process record store for unit tests.
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecordStore, StoreError};
use crate::record::{AccessEvent, SensorReading};

#[derive(Debug, Default)]
struct Tables
{
    sensors: Vec<SensorReading>,
    accesses: Vec<AccessEvent>,
}

/// Record store backed by vectors. The position in the vector is the sequence.
#[derive(Debug, Default)]
pub struct MemoryStore
{
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All readings in insertion order.
    pub async fn sensor_readings(&self) -> Vec<SensorReading> {
        self.tables.read().await.sensors.clone()
    }

    /// All access events in insertion order.
    pub async fn access_events(&self) -> Vec<AccessEvent> {
        self.tables.read().await.accesses.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_sensor_reading(&self, reading: &SensorReading) -> Result<(), StoreError> {
        self.tables.write().await.sensors.push(reading.clone());
        Ok(())
    }

    async fn insert_access_event(&self, event: &AccessEvent) -> Result<(), StoreError> {
        self.tables.write().await.accesses.push(event.clone());
        Ok(())
    }

    async fn latest_access_event(&self) -> Result<Option<AccessEvent>, StoreError> {
        Ok(self.tables.read().await.accesses.last().cloned())
    }

    async fn recent_sensor_readings(&self, limit: usize) -> Result<Vec<SensorReading>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.sensors.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(sequence: usize) -> SensorReading {
        SensorReading {
            temperature: sequence as f64,
            humidity: 50.0,
            lux: 100.0,
            timestamp: String::from("2024-05-01 10:00:00"),
        }
    }

    #[tokio::test]
    async fn recent_readings_are_newest_first() {
        let store = MemoryStore::new();
        for sequence in 1..=5 {
            store.insert_sensor_reading(&reading(sequence)).await.unwrap();
        }

        let recent = store.recent_sensor_readings(3).await.unwrap();
        let sequences: Vec<f64> = recent.iter().map(|r| r.temperature).collect();
        assert_eq!(sequences, vec![5.0, 4.0, 3.0]);
    }

    #[tokio::test]
    async fn latest_access_is_last_inserted() {
        let store = MemoryStore::new();
        assert!(store.latest_access_event().await.unwrap().is_none());

        for name in &["Ana", "Bruno"] {
            let event = AccessEvent {
                name: name.to_string(),
                uid: String::from("04A1"),
                status: String::from("liberado"),
                photo: String::from("f.jpg"),
                timestamp: String::from("2024-05-01 10:00:00"),
            };
            store.insert_access_event(&event).await.unwrap();
        }

        assert_eq!(store.latest_access_event().await.unwrap().unwrap().name, "Bruno");
    }
}

//! Module for the durable storage of sensor readings and access events.
//!
//! The ingestion core only talks to the [`RecordStore`] trait, implemented by
//! [`postgres::PostgresStore`].
use async_trait::async_trait;
use thiserror::Error;

use crate::record::{AccessEvent, SensorReading};

#[cfg(test)]
pub(crate) mod memory;
pub mod postgres;
pub mod reconnect;

/// Number of readings served to dashboards.
pub const RECENT_READINGS_LIMIT: usize = 50;

#[derive(Error, Debug)]
pub enum StoreError {
    /// No live connection to the database server.
    #[error("database connection is not available")]
    Unavailable,
    #[error("database query failed: {0}")]
    Query(#[from] tokio_postgres::Error),
}

/// Append-only storage for records, queryable by recency.
///
/// Every insert is a single atomic row insert. The sequence used for recency ordering is
/// assigned by the store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_sensor_reading(&self, reading: &SensorReading) -> Result<(), StoreError>;

    async fn insert_access_event(&self, event: &AccessEvent) -> Result<(), StoreError>;

    /// The access event with the highest sequence, if any.
    async fn latest_access_event(&self) -> Result<Option<AccessEvent>, StoreError>;

    /// The `limit` readings with the highest sequence, newest first.
    async fn recent_sensor_readings(&self, limit: usize) -> Result<Vec<SensorReading>, StoreError>;
}

//! The ingestion coordinator.
//!
//! Both intake paths, serial and http, hand decoded records to the [`Ingestor`]. It stamps
//! them, persists them through the [`RecordStore`] and fans accepted sensor readings out to
//! all subscribers.
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::clock::Normalizer;
use crate::database::{RecordStore, StoreError, RECENT_READINGS_LIMIT};
use crate::decode::{check_access, RecordKind};
use crate::fanout::{Fanout, Payload};
use crate::record::{AccessEvent, AccessSubmission, SensorReading, SensorSample};

/// The path a record arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Serial,
    Http,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Serial => write!(f, "serial"),
            Origin::Http => write!(f, "http"),
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Shared coordinator of both intake paths.
#[derive(Clone)]
pub struct Ingestor
{
    store: Arc<dyn RecordStore>,
    fanout: Arc<Fanout>,
    normalizer: Normalizer,
}

impl Ingestor {
    pub fn new(store: Arc<dyn RecordStore>, fanout: Arc<Fanout>, normalizer: Normalizer) -> Self {
        Ingestor { store, fanout, normalizer }
    }

    pub fn fanout(&self) -> &Arc<Fanout> {
        &self.fanout
    }

    /// Stamps, stores and broadcasts a decoded sensor sample.
    ///
    /// The sample is broadcast only after it was stored.
    pub async fn ingest_sensor(&self, sample: SensorSample, origin: Origin) -> Result<SensorReading, IngestError> {
        let reading = sample.stamp(self.normalizer.now());

        if let Err(err) = self.store.insert_sensor_reading(&reading).await {
            log::error!(target: "sensorlogd::ingest",
                        "Could not store sensor reading from {} (T={}, U={}, LUX={}, at {}): \'{}\'",
                        origin, reading.temperature, reading.humidity, reading.lux, reading.timestamp, err);
            return Err(IngestError::StoreUnavailable(err));
        }

        log::info!(target: "sensorlogd::ingest", "Sensor reading stored via {}: T={}, U={}, LUX={}",
                   origin, reading.temperature, reading.humidity, reading.lux);

        self.fanout.broadcast(&Payload::Reading(reading.clone()));
        Ok(reading)
    }

    /// Stores a badge scan.
    ///
    /// Incomplete submissions are dropped without a trace and store failures are only logged,
    /// nothing is reported back to the caller.
    pub async fn ingest_access(&self, submission: AccessSubmission) {
        let fields = match check_access(submission) {
            Some(fields) => fields,
            None => {
                RecordKind::Access.policy().reject("sensorlogd::ingest", "access submission", &"incomplete");
                return;
            }
        };

        let event = AccessEvent {
            name: fields.name,
            uid: fields.uid,
            status: fields.status,
            photo: fields.photo,
            timestamp: self.normalizer.now(),
        };

        match self.store.insert_access_event(&event).await {
            Ok(_) => log::info!(target: "sensorlogd::ingest", "Access stored: {}, UID: {}, Status: {}, at {}",
                                event.name, event.uid, event.status, event.timestamp),
            Err(err) => log::error!(target: "sensorlogd::ingest",
                                    "Could not store access of {} (UID: {}): \'{}\'", event.name, event.uid, err),
        }
    }

    /// Forwards an undecoded frame to subscribers without persisting it.
    pub fn forward_raw(&self, frame: String) {
        log::debug!(target: "sensorlogd::ingest", "Forwarding raw frame \'{}\'", frame);
        self.fanout.broadcast(&Payload::Raw(frame));
    }

    /// The most recent access event, if any.
    pub async fn latest_access(&self) -> Result<Option<AccessEvent>, IngestError> {
        Ok(self.store.latest_access_event().await?)
    }

    /// The most recent readings, oldest first.
    pub async fn recent_readings(&self) -> Result<Vec<SensorReading>, IngestError> {
        let mut readings = self.store.recent_sensor_readings(RECENT_READINGS_LIMIT).await?;
        readings.reverse();
        Ok(readings)
    }
}

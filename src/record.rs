//! Module that contains all valid record types for this application.
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
/// A decoded sensor sample that has not been accepted yet.
///
/// Samples carry no timestamp. The timestamp is generated when the sample is accepted
/// by the ingestion coordinator.
pub struct SensorSample
{
    /// Temperature value in celsius.
    #[serde(rename = "temperatura")]
    pub temperature: f64,
    /// Relative humidity value.
    #[serde(rename = "umidade")]
    pub humidity: f64,
    /// Illuminance value in lx.
    pub lux: f64,
}

impl SensorSample {
    /// Turns the sample into a reading stamped with `timestamp`.
    pub fn stamp(self, timestamp: String) -> SensorReading {
        SensorReading {
            temperature: self.temperature,
            humidity: self.humidity,
            lux: self.lux,
            timestamp,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Struct representing environmental data recorded from the sensor device at a specific timestamp.
pub struct SensorReading
{
    /// Temperature value in celsius.
    #[serde(rename = "temperatura")]
    pub temperature: f64,
    /// Relative humidity value.
    #[serde(rename = "umidade")]
    pub humidity: f64,
    /// Illuminance value in lx.
    pub lux: f64,
    /// Normalized timestamp, `YYYY-MM-DD HH:MM:SS` in the configured time zone.
    #[serde(rename = "data_hora")]
    pub timestamp: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
/// An access submission as received from a reporter, before any validation.
pub struct AccessSubmission
{
    #[serde(rename = "nome")]
    pub name: Option<String>,
    pub uid: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "foto")]
    pub photo: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Struct representing a badge scan at the access control reader.
pub struct AccessEvent
{
    /// Name of the badge holder, trimmed.
    #[serde(rename = "nome")]
    pub name: String,
    /// UID of the badge.
    pub uid: String,
    /// Status reported by the reader, e.g. granted or denied.
    pub status: String,
    /// Opaque reference to the photo taken at the scan.
    #[serde(rename = "foto")]
    pub photo: String,
    /// Normalized timestamp, `YYYY-MM-DD HH:MM:SS` in the configured time zone.
    #[serde(rename = "data_hora")]
    pub timestamp: String,
}

//! Timestamp normalization for accepted records.
use chrono::{DateTime, FixedOffset, Utc};

/// Format of every timestamp stored by the daemon.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy)]
/// Stamps accepted records with the wall-clock time of the reference time zone.
pub struct Normalizer
{
    zone: FixedOffset,
}

impl Normalizer {
    /// Creates a normalizer for the process-wide reference zone.
    pub fn new(zone: FixedOffset) -> Self {
        Normalizer { zone }
    }

    /// Current time in the reference zone with second precision.
    pub fn now(&self) -> String {
        self.format(Utc::now())
    }

    fn format(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.zone).format(TIMESTAMP_FORMAT).to_string()
    }
}

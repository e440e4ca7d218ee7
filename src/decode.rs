//! Decoding of untrusted payloads into typed records.
//!
//! Sensor payloads and access submissions are validated under different policies, see
//! [`ValidationPolicy`].
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{AccessSubmission, SensorSample};

/// Reasons a sensor payload is rejected as malformed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Syntax(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("field '{0}' is missing")]
    MissingField(&'static str),
    #[error("field '{0}' is not numeric")]
    NotNumeric(&'static str),
}

/// How a rejected record is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Rejections are logged and reported to the caller, if any.
    StrictValidation,
    /// Rejections are dropped without a trace.
    SilentBestEffort,
}

/// The kinds of records accepted by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Sensor,
    Access,
}

impl RecordKind {
    pub fn policy(self) -> ValidationPolicy {
        match self {
            RecordKind::Sensor => ValidationPolicy::StrictValidation,
            RecordKind::Access => ValidationPolicy::SilentBestEffort,
        }
    }
}

impl ValidationPolicy {
    /// Handles a rejected record according to the policy.
    ///
    /// Returns `true` if the rejection must be reported back to the caller.
    pub fn reject(self, target: &str, raw: &str, reason: &dyn std::fmt::Display) -> bool {
        match self {
            ValidationPolicy::StrictValidation => {
                log::warn!(target: target, "Discarding invalid payload \'{}\': {}", raw, reason);
                true
            }
            ValidationPolicy::SilentBestEffort => false,
        }
    }
}

/// Decodes one trimmed serial line into a sensor sample.
pub fn decode_sensor_line(line: &str) -> Result<SensorSample, DecodeError> {
    decode_sensor_bytes(line.as_bytes())
}

/// Decodes a raw HTTP request body into a sensor sample.
pub fn decode_sensor_bytes(raw: &[u8]) -> Result<SensorSample, DecodeError> {
    let value = serde_json::from_slice::<Value>(raw)
        .map_err(|err| DecodeError::Syntax(err.to_string()))?;
    decode_sensor_value(&value)
}

/// Decodes an already parsed JSON value into a sensor sample.
///
/// Only JSON numbers are accepted, strings holding numbers are rejected.
pub fn decode_sensor_value(value: &Value) -> Result<SensorSample, DecodeError> {
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;

    Ok(SensorSample {
        temperature: numeric_field(object, "temperatura")?,
        humidity: numeric_field(object, "umidade")?,
        lux: numeric_field(object, "lux")?,
    })
}

fn numeric_field(object: &Map<String, Value>, name: &'static str) -> Result<f64, DecodeError> {
    match object.get(name) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(name)),
        Some(value) => value.as_f64().ok_or(DecodeError::NotNumeric(name)),
    }
}

/// A validated access submission, still without timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessFields {
    pub name: String,
    pub uid: String,
    pub status: String,
    pub photo: String,
}

/// Checks an access submission for presence of all fields.
///
/// The name is trimmed before the check. Returns `None` when any field is missing or empty.
pub fn check_access(submission: AccessSubmission) -> Option<AccessFields> {
    let name = submission.name?.trim().to_string();
    let uid = submission.uid?;
    let status = submission.status?;
    let photo = submission.photo?;

    if name.is_empty() || uid.is_empty() || status.is_empty() || photo.is_empty() {
        return None;
    }

    Some(AccessFields { name, uid, status, photo })
}

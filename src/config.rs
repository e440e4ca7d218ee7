//! Module for loading the daemon configuration from a yaml file.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::postgres::DatabaseParameters;
use crate::framer::DEFAULT_MAX_FRAME_LENGTH;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read the configuration from file: \'{0}\'")]
    Io(#[from] std::io::Error),
    #[error("Cannot deserialize the configuration: \'{0}\'")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Root of the configuration file.
pub struct Configuration
{
    /// Fixed UTC offset of the reference time zone, e.g. `-04:00`.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    pub http_parameters: HttpParameters,
    /// Serial intake, disabled when absent.
    #[serde(default)]
    pub serial_parameters: Option<SerialParameters>,
    /// Database receiving every accepted record.
    pub database_connection_parameters: DatabaseParameters,
}

fn default_time_zone() -> String {
    String::from("-04:00")
}

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Parameters for the http listener.
pub struct HttpParameters
{
    /// The ip address the server should listen on.
    pub address: String,
    /// The port the server should listen on.
    pub port: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// How frames from the serial device are treated.
pub enum SerialMode {
    /// Frames are JSON sensor payloads that are decoded and persisted.
    Json,
    /// Frames are opaque strings forwarded verbatim to subscribers.
    Raw,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Parameters for the serial device.
pub struct SerialParameters
{
    /// Path of the serial device, e.g. `/dev/ttyUSB0`.
    pub device: String,
    /// Baud rate configured on the microcontroller.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Character that terminates a frame, must be ASCII.
    #[serde(default = "default_line_delimiter")]
    pub line_delimiter: char,
    #[serde(default = "default_serial_mode")]
    pub mode: SerialMode,
    /// Frames longer than this are dropped.
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_line_delimiter() -> char {
    '\n'
}

fn default_serial_mode() -> SerialMode {
    SerialMode::Json
}

fn default_max_frame_length() -> usize {
    DEFAULT_MAX_FRAME_LENGTH
}

impl SerialParameters {
    /// The delimiter as a single byte.
    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        if self.line_delimiter.is_ascii() {
            Ok(self.line_delimiter as u8)
        } else {
            Err(ConfigError::Invalid(format!("line delimiter \'{}\' is not ascii", self.line_delimiter)))
        }
    }
}

impl Configuration {
    /// Reads and validates the configuration at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut configuration_file = File::open(path.as_ref())?;
        let mut configuration_string = String::new();
        configuration_file.read_to_string(&mut configuration_string)?;
        Self::parse(&configuration_string)
    }

    pub fn parse(configuration_string: &str) -> Result<Self, ConfigError> {
        let configuration = serde_yaml::from_str::<Configuration>(configuration_string)?;
        configuration.validate()?;
        Ok(configuration)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.zone()?;
        if let Some(serial) = &self.serial_parameters {
            serial.delimiter_byte()?;
            if serial.max_frame_length == 0 {
                return Err(ConfigError::Invalid(String::from("max_frame_length must be positive")));
            }
        }
        Ok(())
    }

    /// The reference time zone as a fixed offset.
    pub fn zone(&self) -> Result<FixedOffset, ConfigError> {
        self.time_zone
            .parse::<FixedOffset>()
            .map_err(|err| ConfigError::Invalid(format!("time zone \'{}\': {}", self.time_zone, err)))
    }
}

//! Ingestion daemon for sensor readings and access events.
//!
//! Readings arrive as JSON lines from a microcontroller on a serial port or as JSON bodies
//! pushed over HTTP. Both paths converge on the [`ingest::Ingestor`], which stamps each
//! accepted record, stores it through a [`database::RecordStore`] and fans it out to live
//! subscribers through [`fanout::Fanout`].
pub mod clock;
pub mod config;
pub mod daemon;
pub mod database;
pub mod decode;
pub mod fanout;
pub mod framer;
pub mod http;
pub mod ingest;
pub mod record;
pub mod serial;

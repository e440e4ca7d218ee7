//! Wiring of the configured intakes, the record store and the http listener.
use std::sync::Arc;

use tokio::sync::watch;

use crate::clock::Normalizer;
use crate::config::Configuration;
use crate::database::postgres::PostgresStore;
use crate::database::reconnect::{wait_until_connected, Reconnector};
use crate::fanout::Fanout;
use crate::framer::FrameCodec;
use crate::ingest::Ingestor;
use crate::{http, serial};

/// Runs the daemon until `shutdown` fires and returns the process exit code.
///
/// With `wait_for_connection` set the http listener is only bound once the database is
/// connected. A shutdown while waiting ends the run with 0.
pub async fn run(configuration: Configuration, mut shutdown: watch::Receiver<bool>) -> i32 {
    let zone = match configuration.zone() {
        Ok(zone) => zone,
        Err(err) => {
            log::error!(target: "sensorlogd", "{}", err);
            return 1;
        }
    };

    let parameters = &configuration.database_connection_parameters;
    let store = Arc::new(PostgresStore::new());
    let reconnector = Reconnector::new(parameters.retry_interval());
    let mut state = reconnector.subscribe();
    tokio::spawn(Arc::clone(&store).maintain_connection(parameters.clone(), reconnector, shutdown.clone()));

    if parameters.wait_for_connection {
        log::info!(target: "sensorlogd::db", "Waiting for the database connection before serving!");
        tokio::select! {
            connected = wait_until_connected(&mut state) => {
                if !connected {
                    log::error!(target: "sensorlogd::db", "Database connection task ended unexpectedly!");
                    return 202;
                }
            }
            _ = shutdown.changed() => return 0,
        }
    }

    let ingestor = Ingestor::new(store, Arc::new(Fanout::new()), Normalizer::new(zone));

    if let Some(parameters) = &configuration.serial_parameters {
        let codec = match parameters.delimiter_byte() {
            Ok(delimiter) => FrameCodec::new(delimiter, parameters.max_frame_length),
            Err(err) => {
                log::error!(target: "sensorlogd::serial", "{}", err);
                return 1;
            }
        };
        match serial::open(parameters) {
            Ok(port) => {
                tokio::spawn(serial::read_frames(port, codec, parameters.mode, ingestor.clone(), shutdown.clone()));
            }
            Err(err) => log::error!(target: "sensorlogd::serial", "{}", err),
        }
    }

    match http::serve(&configuration.http_parameters, ingestor, shutdown).await {
        Ok(_) => 0,
        Err(err) => {
            log::error!(target: "sensorlogd::http", "Cannot serve http: \'{}\'", err);
            201
        }
    }
}

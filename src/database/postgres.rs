//! Module for connecting to a postgres database and storing the accepted records in it.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use openssl::error::ErrorStack;
use openssl::ssl::{SslConnector, SslFiletype, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Connection, NoTls, Row};

use super::reconnect::{Reconnector, DEFAULT_RETRY_INTERVAL};
use super::{RecordStore, StoreError};
use crate::record::{AccessEvent, SensorReading};

static SQL_INSERT_SENSOR_READING: &'static str = include_str!("../sql/insert_sensor_reading.sql");
static SQL_INSERT_ACCESS_EVENT: &'static str = include_str!("../sql/insert_access_event.sql");
static SQL_SELECT_LATEST_ACCESS_EVENT: &'static str = include_str!("../sql/select_latest_access_event.sql");
static SQL_SELECT_RECENT_SENSOR_READINGS: &'static str = include_str!("../sql/select_recent_sensor_readings.sql");

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Where the `sensores` and `acessos` tables live and how the daemon reaches them.
///
/// The store connects in the background and reconnects every `retry_interval_secs` after the
/// server goes away. Until the first connection succeeds, reporters get a 500 unless
/// `wait_for_connection` holds the http listener back.
pub struct DatabaseParameters
{
    pub hostname: String,
    pub port: u32,
    /// Role used for the inserts and the dashboard queries.
    pub username: String,
    pub password: String,
    /// Database holding both record tables, `projeto_arduino` in the shipped configuration.
    pub database: String,
    /// Connect through openssl using `tls_params`.
    pub tls_enable: bool,
    /// Required when `tls_enable` is set.
    pub tls_params: Option<DatabaseTlsParameters>,
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// Keep the http listener closed until the store is connected.
    #[serde(default)]
    pub wait_for_connection: bool,
}

fn default_retry_interval_secs() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_secs()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
/// PEM files for a mutually authenticated connection. The server certificate is verified
/// against `server_ca_path`.
pub struct DatabaseTlsParameters {
    pub server_ca_path: String,
    pub client_cert_path: String,
    pub client_key_path: String,
}

impl DatabaseParameters {
    /// Connection string for the database server.
    pub fn dsn(&self) -> String {
        format!("user={} password={} host={} port={} dbname={} application_name=sensorlogd",
                self.username,
                self.password,
                self.hostname,
                self.port,
                self.database)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("TLS enabled but no TLS parameters specified")]
    MissingTlsParameters,
    #[error("could not set up tls: {0}")]
    Tls(#[from] ErrorStack),
    #[error("{0}")]
    Postgres(#[from] tokio_postgres::Error),
}

/// Record store writing into the `sensores` and `acessos` tables.
///
/// The store starts without a connection. [`PostgresStore::maintain_connection`] connects it
/// and reconnects whenever the connection is lost, calls made in between fail with
/// [`StoreError::Unavailable`].
#[derive(Default)]
pub struct PostgresStore
{
    client: RwLock<Option<Arc<Client>>>,
}

impl PostgresStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self) -> Result<Arc<Client>, StoreError> {
        self.client.read().await.clone().ok_or(StoreError::Unavailable)
    }

    /// Keeps the store connected until `shutdown` fires.
    ///
    /// Every failed attempt is followed by the fixed retry interval of `reconnector`.
    pub async fn maintain_connection(self: Arc<Self>,
                                     parameters: DatabaseParameters,
                                     mut reconnector: Reconnector,
                                     mut shutdown: watch::Receiver<bool>)
    {
        loop {
            let connecting = reconnector.connect_with_retry(|| connect(&parameters));
            let (client, connection) = tokio::select! {
                connected = connecting => connected,
                _ = shutdown.changed() => return,
            };

            *self.client.write().await = Some(Arc::new(client));
            log::info!(target: "sensorlogd::db", "Database connection established!");

            tokio::select! {
                _ = connection => {},
                _ = shutdown.changed() => return,
            }

            *self.client.write().await = None;
            reconnector.lost();
            log::warn!(target: "sensorlogd::db", "Database connection lost, reconnecting!");
        }
    }
}

/// Opens one connection and drives it on its own task.
///
/// The returned handle finishes when the connection closes.
async fn connect(parameters: &DatabaseParameters) -> Result<(Client, JoinHandle<()>), ConnectError> {
    let dsn = parameters.dsn();
    match parameters.tls_enable {
        true => {
            let tls_connector = tls_connector(parameters)?;
            Ok(drive(tokio_postgres::connect(dsn.as_str(), tls_connector).await?))
        }
        false => Ok(drive(tokio_postgres::connect(dsn.as_str(), NoTls).await?)),
    }
}

fn drive<S, T>((client, connection): (Client, Connection<S, T>)) -> (Client, JoinHandle<()>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let handle = tokio::spawn(async move {
        if let Err(err) = connection.await {
            log::error!(target: "sensorlogd::db", "Database connection failed: \'{}\'", err);
        }
    });
    (client, handle)
}

fn tls_connector(parameters: &DatabaseParameters) -> Result<MakeTlsConnector, ConnectError> {
    let tls_params = parameters.tls_params.as_ref().ok_or(ConnectError::MissingTlsParameters)?;

    let mut ssl_connection_builder = SslConnector::builder(SslMethod::tls())?;
    ssl_connection_builder.set_verify(SslVerifyMode::PEER);
    ssl_connection_builder.set_ca_file(&tls_params.server_ca_path)?;
    ssl_connection_builder.set_certificate_file(&tls_params.client_cert_path, SslFiletype::PEM)?;
    ssl_connection_builder.set_private_key_file(&tls_params.client_key_path, SslFiletype::PEM)?;

    Ok(MakeTlsConnector::new(ssl_connection_builder.build()))
}

fn sensor_reading_from(row: &Row) -> Result<SensorReading, StoreError> {
    Ok(SensorReading {
        temperature: row.try_get("temperatura")?,
        humidity: row.try_get("umidade")?,
        lux: row.try_get("lux")?,
        timestamp: row.try_get("data_hora")?,
    })
}

fn access_event_from(row: &Row) -> Result<AccessEvent, StoreError> {
    Ok(AccessEvent {
        name: row.try_get("nome")?,
        uid: row.try_get("uid")?,
        status: row.try_get("status")?,
        photo: row.try_get("foto")?,
        timestamp: row.try_get("data_hora")?,
    })
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn insert_sensor_reading(&self, reading: &SensorReading) -> Result<(), StoreError> {
        let client = self.client().await?;
        client.execute(SQL_INSERT_SENSOR_READING,
                       &[&reading.temperature, &reading.humidity, &reading.lux, &reading.timestamp])
            .await?;
        Ok(())
    }

    async fn insert_access_event(&self, event: &AccessEvent) -> Result<(), StoreError> {
        let client = self.client().await?;
        client.execute(SQL_INSERT_ACCESS_EVENT,
                       &[&event.name, &event.uid, &event.status, &event.photo, &event.timestamp])
            .await?;
        Ok(())
    }

    async fn latest_access_event(&self) -> Result<Option<AccessEvent>, StoreError> {
        let client = self.client().await?;
        match client.query_opt(SQL_SELECT_LATEST_ACCESS_EVENT, &[]).await? {
            Some(row) => Ok(Some(access_event_from(&row)?)),
            None => Ok(None),
        }
    }

    async fn recent_sensor_readings(&self, limit: usize) -> Result<Vec<SensorReading>, StoreError> {
        let client = self.client().await?;
        let limit = limit as i64;
        let rows = client.query(SQL_SELECT_RECENT_SENSOR_READINGS, &[&limit]).await?;
        rows.iter().map(sensor_reading_from).collect()
    }
}

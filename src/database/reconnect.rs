//! Reconnection policy for the database connection.
//!
//! The connection is retried on a fixed interval forever: no backoff, no attempt limit.
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// Default delay between two connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State machine tracking the database connection.
///
/// Observers follow the state through [`Reconnector::subscribe`].
#[derive(Debug)]
pub struct Reconnector
{
    state: watch::Sender<ConnectionState>,
    retry_interval: Duration,
    failed_attempts: u64,
}

impl Reconnector {
    pub fn new(retry_interval: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Reconnector {
            state,
            retry_interval,
            failed_attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Failed attempts since the last successful connection.
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts
    }

    pub fn begin_attempt(&mut self) {
        self.transition(ConnectionState::Connecting);
    }

    pub fn succeeded(&mut self) {
        self.failed_attempts = 0;
        self.transition(ConnectionState::Connected);
    }

    /// Records a failed attempt and returns how long to wait before the next one.
    pub fn failed(&mut self) -> Duration {
        self.failed_attempts += 1;
        self.transition(ConnectionState::Disconnected);
        self.retry_interval
    }

    /// Records that an established connection went away.
    pub fn lost(&mut self) {
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        self.state.send_replace(next);
    }

    /// Calls `connect` until it succeeds, sleeping the retry interval after every failure.
    pub async fn connect_with_retry<T, E, F, Fut>(&mut self, mut connect: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        loop {
            self.begin_attempt();
            match connect().await {
                Ok(connection) => {
                    self.succeeded();
                    return connection;
                }
                Err(err) => {
                    let delay = self.failed();
                    log::error!(target: "sensorlogd::db",
                                "Could not establish database connection (attempt {}), retrying in {}s: \'{}\'",
                                self.failed_attempts, delay.as_secs(), err);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Waits until the observed state reaches [`ConnectionState::Connected`].
///
/// Returns `false` if the state sender went away before that.
pub async fn wait_until_connected(rx: &mut watch::Receiver<ConnectionState>) -> bool {
    rx.wait_for(|state| *state == ConnectionState::Connected).await.is_ok()
}

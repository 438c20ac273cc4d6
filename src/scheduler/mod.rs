//! Scheduler module for polling endpoints and persisting their status.

mod peaks;

pub use peaks::*;

use crate::db::{run_blocking, EndpointRecord, RecordStore, StoreError};
use crate::query::{decode_favicon, StatusClient};

use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Source of the calendar date used for daily peak rollover.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Clock reading the local date of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Background poller that refreshes every configured endpoint's record.
pub struct Poller {
    endpoints: Vec<String>,
    interval: Duration,
    client: Arc<dyn StatusClient>,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl Poller {
    /// Create a poller. `interval` is the pause between the end of one
    /// cycle and the start of the next.
    pub fn new(
        endpoints: Vec<String>,
        interval: Duration,
        client: Arc<dyn StatusClient>,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            endpoints,
            interval,
            client,
            store,
            clock,
        }
    }

    /// Spawn the poll loop. It runs until `stop_rx` receives a message or
    /// its sender is dropped.
    pub fn start(self, stop_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(stop_rx).await })
    }

    /// Run poll cycles until stopped.
    pub async fn run(&self, mut stop_rx: broadcast::Receiver<()>) {
        tracing::info!(
            "Poller: watching {} endpoints every {:?}",
            self.endpoints.len(),
            self.interval
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Poller: stopped");
    }

    /// Poll every endpoint once, in order. Failures stay local to their endpoint.
    pub async fn run_cycle(&self) {
        for endpoint in &self.endpoints {
            if let Err(e) = self.poll_endpoint(endpoint).await {
                tracing::error!("Poller: failed to update {}: {}", endpoint, e);
            }
        }
    }

    /// Query one endpoint, fold the result into its record and persist it.
    pub async fn poll_endpoint(&self, endpoint: &str) -> Result<EndpointRecord, StoreError> {
        let key = endpoint.to_string();
        let prev = match run_blocking(&self.store, move |store| store.get(&key)).await {
            Ok(record) => record,
            Err(StoreError::Yaml(e)) => {
                tracing::warn!("Poller: discarding unreadable record for {}: {}", endpoint, e);
                EndpointRecord::default()
            }
            Err(e) => return Err(e),
        };

        let record = match self.client.status(endpoint).await {
            Ok(status) => {
                tracing::debug!(
                    "Poller: {} online {}/{} ({})",
                    endpoint,
                    status.online_players,
                    status.max_players,
                    status.version.as_deref().unwrap_or("unknown version")
                );
                let icon_path = self.store_favicon(endpoint, status.favicon.as_deref()).await;
                observe_online(&prev, status.online_players, self.clock.today(), icon_path)
            }
            Err(e) => {
                tracing::debug!("Poller: {} unreachable: {}", endpoint, e);
                observe_offline(&prev)
            }
        };

        if record.status != prev.status {
            tracing::info!(
                "Poller: {} is now {:?} ({} players)",
                endpoint,
                record.status,
                record.players
            );
        }

        let (key, saved) = (endpoint.to_string(), record.clone());
        run_blocking(&self.store, move |store| store.put(&key, &saved)).await?;
        Ok(record)
    }

    /// Persist the favicon offered by a successful poll and return its URL path.
    ///
    /// Without a favicon the previously saved file is removed. A favicon that
    /// cannot be decoded or written yields no reference but never fails the poll.
    async fn store_favicon(&self, endpoint: &str, favicon: Option<&str>) -> Option<String> {
        let key = endpoint.to_string();
        let Some(data) = favicon else {
            if let Err(e) = run_blocking(&self.store, move |store| store.remove_icon(&key)).await {
                tracing::warn!("Poller: failed to remove stale icon for {}: {}", endpoint, e);
            }
            return None;
        };

        let png = match decode_favicon(data) {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!("Poller: malformed favicon from {}: {}", endpoint, e);
                return None;
            }
        };

        match run_blocking(&self.store, move |store| store.save_icon(&key, &png)).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Poller: failed to save icon for {}: {}", endpoint, e);
                None
            }
        }
    }
}

//! Game-server status queries.
//!
//! The poller only sees the [`StatusClient`] trait; [`SlpClient`] speaks
//! the Minecraft Java status protocol, resolving SRV records first.

mod favicon;
mod slp;
mod srv;

pub use favicon::*;
pub use slp::*;
pub use srv::*;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Status query error types.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("malformed status JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Result of a successful status query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerStatus {
    pub online_players: u32,
    pub max_players: u32,
    /// Version name advertised by the server, e.g. "Paper 1.20.4".
    pub version: Option<String>,
    /// Favicon in its transport encoding (`data:image/png;base64,...`).
    pub favicon: Option<String>,
}

/// Capability to ask an endpoint for its current status.
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn status(&self, endpoint: &str) -> Result<ServerStatus, QueryError>;
}

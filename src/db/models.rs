//! Persisted record types.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Liveness of an endpoint as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Online,
    Offline,
    /// Never polled; only produced for API placeholders.
    Unknown,
}

/// Latest known status of one endpoint.
///
/// The serialized field names are shared by the record files and the
/// `/servers` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub status: ServerState,
    #[serde(default)]
    pub players: u32,
    /// Highest player count since `last_update`'s calendar day began.
    #[serde(rename = "24h_peak", default)]
    pub daily_peak: u32,
    /// Highest player count ever observed.
    #[serde(rename = "record", default)]
    pub all_time_peak: u32,
    /// Date of the last successful poll.
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub last_update: Option<NaiveDate>,
    /// URL path of the saved favicon, e.g. `/icons/example.net.png`.
    #[serde(default)]
    pub icon_path: Option<String>,
}

impl Default for EndpointRecord {
    fn default() -> Self {
        Self {
            status: ServerState::Offline,
            players: 0,
            daily_peak: 0,
            all_time_peak: 0,
            last_update: None,
            icon_path: None,
        }
    }
}

impl EndpointRecord {
    /// Entry reported for an endpoint that has no persisted record.
    pub fn placeholder() -> Self {
        Self {
            status: ServerState::Unknown,
            ..Default::default()
        }
    }
}

/// Accepts `YYYY-MM-DD`, null, or the empty string older record files use for "never".
fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

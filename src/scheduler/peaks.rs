//! Peak bookkeeping applied to a record on each observation.

use chrono::NaiveDate;

use crate::db::{EndpointRecord, ServerState};

/// Record after a successful poll that saw `players` online on `today`.
///
/// The daily peak is reseeded with `players` when the previous update
/// happened on another calendar date, otherwise it keeps the running max.
pub fn observe_online(
    prev: &EndpointRecord,
    players: u32,
    today: NaiveDate,
    icon_path: Option<String>,
) -> EndpointRecord {
    let daily_peak = if prev.last_update == Some(today) {
        players.max(prev.daily_peak)
    } else {
        players
    };

    EndpointRecord {
        status: ServerState::Online,
        players,
        daily_peak,
        all_time_peak: players.max(prev.all_time_peak),
        last_update: Some(today),
        icon_path,
    }
}

/// Record after a failed poll: peaks and date kept, everything live cleared.
pub fn observe_offline(prev: &EndpointRecord) -> EndpointRecord {
    EndpointRecord {
        status: ServerState::Offline,
        players: 0,
        icon_path: None,
        ..prev.clone()
    }
}

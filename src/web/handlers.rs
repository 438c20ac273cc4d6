//! HTTP request handlers.

use super::AppState;
use crate::db::{run_blocking, EndpointRecord, RecordStore, StoreError};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json},
};
use rust_embed::RustEmbed;
use std::collections::BTreeMap;

/// Static assets compiled into the binary.
#[derive(RustEmbed)]
#[folder = "assets/"]
struct Assets;

// ============================================================================
// Landing page
// ============================================================================

pub async fn handle_index() -> impl IntoResponse {
    match Assets::get("index.html") {
        Some(file) => Html(file.data.into_owned()).into_response(),
        None => (StatusCode::NOT_FOUND, "index.html missing").into_response(),
    }
}

// ============================================================================
// API: Servers
// ============================================================================

/// Latest record of every configured endpoint, keyed and sorted by endpoint.
///
/// Endpoints without a readable record are reported with the `unknown`
/// placeholder so the response always covers the whole configuration.
pub async fn handle_get_servers(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints = state.endpoints.clone();
    let read = run_blocking(&state.store, move |store| Ok(read_records(store, &endpoints))).await;

    let servers = match read {
        Ok(servers) => servers,
        Err(e) => {
            tracing::error!("Failed to read records: {}", e);
            state
                .endpoints
                .iter()
                .map(|endpoint| (endpoint.clone(), EndpointRecord::placeholder()))
                .collect()
        }
    };

    Json(servers)
}

fn read_records(store: &dyn RecordStore, endpoints: &[String]) -> BTreeMap<String, EndpointRecord> {
    let mut servers = BTreeMap::new();

    for endpoint in endpoints {
        let record = match store.load(endpoint) {
            Ok(Some(record)) => record,
            Ok(None) => EndpointRecord::placeholder(),
            Err(e) => {
                tracing::warn!("Failed to read record for {}: {}", endpoint, e);
                EndpointRecord::placeholder()
            }
        };
        servers.insert(endpoint.clone(), record);
    }

    servers
}

// ============================================================================
// Icons
// ============================================================================

pub async fn handle_icon(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    let name = filename.clone();
    match run_blocking(&state.store, move |store| store.load_icon(&name)).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&filename).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(StoreError::NotFound) | Err(StoreError::InvalidKey(_)) => {
            (StatusCode::NOT_FOUND, "Icon not found").into_response()
        }
        Err(e) => {
            tracing::error!("Failed to read icon {}: {}", filename, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

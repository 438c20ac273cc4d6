//! Favicon payload decoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaviconError {
    #[error("favicon is not valid base64: {0}")]
    Malformed(#[from] base64::DecodeError),
    #[error("favicon is empty")]
    Empty,
}

/// Decode a status-response favicon into raw image bytes.
///
/// Servers send a data URI (`data:image/png;base64,<payload>`); a bare
/// base64 payload is accepted as well.
pub fn decode_favicon(data: &str) -> Result<Vec<u8>, FaviconError> {
    let payload = match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    };
    // Some servers wrap the payload like a PEM body
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if payload.is_empty() {
        return Err(FaviconError::Empty);
    }

    Ok(STANDARD.decode(payload)?)
}

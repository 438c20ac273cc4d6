//! Record storage module for peakwatch.
//!
//! Provides per-endpoint YAML records with atomic replacement.

mod models;
mod store;

pub use models::*;
pub use store::*;

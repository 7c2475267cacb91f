//! Definition of the data formats used by fleetfusion.
//!
//! This module makes the link between the upstream wire formats (fm-track
//! objects, events API records) and the normalized shapes the fusion store
//! works with (`VehicleState`, `Event`).
//!
//! To add a new upstream, add a `FORMAT.rs` file defining the wire structs
//! and a `TryFrom` conversion into the normalized shape.
//!

use chrono::{DateTime, Utc};
use thiserror::Error;

// Re-export for convenience
//
pub use event::*;
pub use vehicle::*;

mod event;
mod vehicle;

/// Errors raised while normalizing a wire record.
///
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Missing field {0}")]
    MissingField(&'static str),
    #[error("Bad timestamp: {0}")]
    BadTimestamp(String),
    #[error("Bad coordinate: {0}")]
    BadCoordinate(String),
}

/// Parse an ISO 8601/RFC 3339 timestamp (with `Z` or an explicit offset)
/// into UTC.
///
pub fn parse_iso(s: &str) -> Result<DateTime<Utc>, FormatError> {
    let dt = DateTime::parse_from_rfc3339(s)
        .map_err(|_| FormatError::BadTimestamp(s.to_string()))?;
    Ok(dt.with_timezone(&Utc))
}

/// Upstream ids show up as numbers or strings depending on the provider,
/// we normalize everything to a string key.
///
pub(crate) fn id_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

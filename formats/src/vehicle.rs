//! Module to load and normalize vehicle records coming from an fm-track
//! style `GET /objects` call.
//!

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{id_to_string, parse_iso, FormatError};

/// Normalized, last-known state of one vehicle.
///
/// This is what the fusion store keeps, keyed by `id`.  `seen_at` is the
/// observation timestamp as reported by the provider, not the fetch time;
/// the store only accepts updates whose `seen_at` is not older than the
/// one already held.
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VehicleState {
    /// Provider-unique vehicle identifier
    pub id: String,
    /// Display name, when the provider has one
    pub name: Option<String>,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Heading in degrees, clockwise from north
    pub heading: Option<f64>,
    /// Ground speed as reported (provider units)
    pub speed: Option<f64>,
    /// Free-form status tag (e.g. "DRIVING", "STOPPED")
    pub status: Option<String>,
    /// Timestamp of the observation
    pub seen_at: DateTime<Utc>,
}

/// Wire format of one record in the fm-track `/objects` answer.
///
/// Only the fields we care about are declared, the rest of the record is
/// ignored on deserialization.  Ids come as numbers or strings.
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FmObject {
    pub id: Value,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub status: Option<String>,
    /// ISO 8601, when the position was reported
    pub updated_at: Option<String>,
}

impl TryFrom<&FmObject> for VehicleState {
    type Error = FormatError;

    /// A record without id, position or timestamp carries no usable state
    /// and makes the conversion fail.
    ///
    fn try_from(raw: &FmObject) -> Result<Self, Self::Error> {
        let id = id_to_string(&raw.id).ok_or(FormatError::MissingField("id"))?;
        let latitude = raw.latitude.ok_or(FormatError::MissingField("latitude"))?;
        let longitude = raw
            .longitude
            .ok_or(FormatError::MissingField("longitude"))?;

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(FormatError::BadCoordinate(format!(
                "{latitude},{longitude}"
            )));
        }

        let seen_at = match &raw.updated_at {
            Some(s) => parse_iso(s)?,
            None => return Err(FormatError::MissingField("updated_at")),
        };

        Ok(VehicleState {
            id,
            name: raw.name.clone(),
            latitude,
            longitude,
            heading: raw.heading,
            speed: raw.speed,
            status: raw.status.clone(),
            seen_at,
        })
    }
}

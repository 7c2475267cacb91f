//! Module to load and normalize records coming from the events API
//! (`GET /events`).
//!
//! The set of event kinds is open, the provider adds new tags without
//! notice.  Unknown tags are kept verbatim in `EventKind::Other` instead of
//! being dropped.
//!

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumString;

use crate::{id_to_string, parse_iso, FormatError};

/// Known event tags, parsed case-insensitively.  Everything else lands in
/// `Other` with the original tag preserved.
///
#[derive(Clone, Debug, EnumString, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum EventKind {
    Stop,
    Driving,
    Idle,
    Refuel,
    Drain,
    #[strum(default)]
    Other(String),
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        // `Other` is the default variant so this can not fail
        //
        Ok(EventKind::from_str(&s).unwrap_or(EventKind::Other(s)))
    }
}

/// Normalized domain event.
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Event {
    /// Provider-unique event identifier
    pub id: String,
    /// Associated vehicle, `None` for fleet-wide events
    pub vehicle_id: Option<String>,
    /// Kind tag (open set)
    pub kind: EventKind,
    /// When the event started/happened
    pub at: DateTime<Utc>,
    /// Everything else the provider sent (duration, mileage, fuel levels,
    /// location, driver ids, …), kept as-is for the presentation layer
    pub payload: BTreeMap<String, Value>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} vehicle={}",
            self.at.to_rfc3339(),
            self.kind,
            self.vehicle_id.as_deref().unwrap_or("-")
        )
    }
}

/// Wire format of one record in the events API answer.
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RawEvent {
    pub id: Value,
    #[serde(default)]
    pub vehicle_id: Option<Value>,
    pub event_type: Option<String>,
    /// ISO 8601 with `Z` suffix
    pub event_start: Option<String>,
    /// Every other field, preserved into the payload
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TryFrom<&RawEvent> for Event {
    type Error = FormatError;

    fn try_from(raw: &RawEvent) -> Result<Self, Self::Error> {
        let id = id_to_string(&raw.id).ok_or(FormatError::MissingField("id"))?;
        let vehicle_id = raw.vehicle_id.as_ref().and_then(id_to_string);

        let kind = match &raw.event_type {
            // From_str with a default variant is infallible
            //
            Some(tag) => EventKind::from_str(tag).unwrap_or(EventKind::Other(tag.clone())),
            None => return Err(FormatError::MissingField("event_type")),
        };

        let at = match &raw.event_start {
            Some(s) => parse_iso(s)?,
            None => return Err(FormatError::MissingField("event_start")),
        };

        Ok(Event {
            id,
            vehicle_id,
            kind,
            at,
            payload: raw.extra.clone(),
        })
    }
}

// src/services/normalize.rs

//! Record normalizer.
//!
//! Turns an arbitrary JSON payload into a [`Ticket`] or a [`Rejection`].
//! Malformed input is never an error here: the caller decides what a
//! rejection means (skip and log during a crawl, skip a file entry during a
//! restore).

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::Ticket;

/// Keys consumed into typed `Ticket` fields.
const MODELLED_KEYS: &[&str] = &[
    "id",
    "name",
    "description",
    "report",
    "solution",
    "latitude",
    "longitude",
    "status_id",
    "photos",
    "created",
    "date",
];

/// Why a payload was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Not an object, or the object has no `id`
    MissingRequiredFields,
    /// `id` is present but not a non-negative integer
    InvalidId,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequiredFields => f.write_str("missing_required_fields"),
            Self::InvalidId => f.write_str("invalid_id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub detail: String,
}

impl Rejection {
    fn new(kind: RejectionKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Outcome of normalizing one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Valid(Ticket),
    Rejected(Rejection),
}

impl Normalized {
    pub fn into_result(self) -> Result<Ticket, Rejection> {
        match self {
            Self::Valid(ticket) => Ok(ticket),
            Self::Rejected(rejection) => Err(rejection),
        }
    }
}

/// Normalize a raw payload into a ticket.
///
/// A payload of the shape `{"item": {...}}` without its own `id` is unwrapped
/// first; the bulk downloader saved detail responses that way.
pub fn normalize(payload: &Value) -> Normalized {
    let Some(map) = unwrap_item(payload).as_object() else {
        return Normalized::Rejected(Rejection::new(
            RejectionKind::MissingRequiredFields,
            format!("expected an object, got {}", kind_of(payload)),
        ));
    };

    let id = match map.get("id") {
        None | Some(Value::Null) => {
            return Normalized::Rejected(Rejection::new(
                RejectionKind::MissingRequiredFields,
                "no id field",
            ));
        }
        Some(raw) => match parse_id(raw) {
            Some(id) => id,
            None => {
                return Normalized::Rejected(Rejection::new(
                    RejectionKind::InvalidId,
                    format!("id {raw} is not a non-negative integer"),
                ));
            }
        },
    };

    let created = map
        .get("created")
        .filter(|v| !v.is_null())
        .or_else(|| map.get("date").filter(|v| !v.is_null()))
        .cloned();

    let extra: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| !MODELLED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Normalized::Valid(Ticket {
        id,
        name: text(map.get("name")),
        description: text(map.get("description")),
        report: text(map.get("report")),
        solution: text(map.get("solution")),
        latitude: coordinate(map.get("latitude")),
        longitude: coordinate(map.get("longitude")),
        status_id: map.get("status_id").and_then(small_int),
        photos: match map.get("photos") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        created,
        extra,
    })
}

/// Parse an identity value: an integer literal or an all-digit string.
///
/// Booleans, floats, negative numbers and empty strings are never ids.
pub fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    }
}

/// Strip a `{"item": {...}}` wrapper when the outer object has no id.
pub fn unwrap_item(payload: &Value) -> &Value {
    match payload.as_object() {
        Some(map) if !map.contains_key("id") => match map.get("item") {
            Some(inner @ Value::Object(_)) => inner,
            _ => payload,
        },
        _ => payload,
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

fn small_int(value: &Value) -> Option<u32> {
    parse_id(value).and_then(|n| u32::try_from(n).ok())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

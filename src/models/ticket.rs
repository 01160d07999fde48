//! Ticket record data structure.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Date formats seen in the `created` field, tried in order.
const CREATED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// A single civic-issue ticket.
///
/// `id` is the only identity: two tickets with the same id are the same
/// ticket, whatever their content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    /// Stable integer identity
    pub id: u64,

    /// Short title
    #[serde(default)]
    pub name: String,

    /// Long description
    #[serde(default)]
    pub description: String,

    /// Reporter's text (mirrors `description` for web-sourced records)
    #[serde(default)]
    pub report: String,

    /// Resolution text, empty while unresolved
    #[serde(default)]
    pub solution: String,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    /// Resolution state, `None` when missing or malformed
    #[serde(default)]
    pub status_id: Option<u32>,

    /// Attachment descriptors in source order
    #[serde(default)]
    pub photos: Vec<Value>,

    /// Raw creation date (a string or an object carrying a `date` key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<Value>,

    /// Fields not modelled above, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Ticket {
    /// Create a ticket with only an id; everything else empty.
    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            report: String::new(),
            solution: String::new(),
            latitude: None,
            longitude: None,
            status_id: None,
            photos: Vec::new(),
            created: None,
            extra: Map::new(),
        }
    }

    /// Both coordinates, if present.
    pub fn location(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Parse the creation timestamp.
    ///
    /// Accepts `YYYY-MM-DD HH:MM:SS[.ffffff]`, RFC 3339 and bare dates, either
    /// as a plain string or wrapped in `{"date": ...}`.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        let raw = match self.created.as_ref()? {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("date")?.as_str()?,
            _ => return None,
        };
        parse_created(raw.trim())
    }
}

fn parse_created(raw: &str) -> Option<NaiveDateTime> {
    for format in CREATED_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticket_created(created: Value) -> Ticket {
        Ticket {
            created: Some(created),
            ..Ticket::with_id(1)
        }
    }

    #[test]
    fn test_created_at_object_with_fraction() {
        let ticket = ticket_created(json!({"date": "2021-10-04 08:15:30.000000", "timezone": "Europe/Prague"}));
        let parsed = ticket.created_at().unwrap();
        assert_eq!(parsed.to_string(), "2021-10-04 08:15:30");
    }

    #[test]
    fn test_created_at_plain_formats() {
        assert!(ticket_created(json!("2021-10-04 08:15:30")).created_at().is_some());
        assert!(ticket_created(json!("2021-10-04T08:15:30+02:00")).created_at().is_some());
        assert!(ticket_created(json!("2021-10-04")).created_at().is_some());
        assert!(ticket_created(json!("yesterday")).created_at().is_none());
        assert!(Ticket::with_id(1).created_at().is_none());
    }

    #[test]
    fn test_extra_fields_round_trip() {
        let raw = json!({
            "id": 7,
            "name": "Díra v silnici",
            "category_id": 4,
            "address": "Americká 1"
        });
        let ticket: Ticket = serde_json::from_value(raw).unwrap();
        assert_eq!(ticket.extra.get("category_id"), Some(&json!(4)));

        let back = serde_json::to_value(&ticket).unwrap();
        assert_eq!(back["address"], json!("Americká 1"));
        assert_eq!(back["id"], json!(7));
    }

    #[test]
    fn test_location_requires_both_coordinates() {
        let mut ticket = Ticket::with_id(1);
        ticket.latitude = Some(49.74);
        assert_eq!(ticket.location(), None);
        ticket.longitude = Some(13.37);
        assert_eq!(ticket.location(), Some((49.74, 13.37)));
    }
}

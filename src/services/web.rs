// src/services/web.rs

//! Ticket extraction from the public map page.
//!
//! The page embeds every nearby ticket as a JavaScript array literal,
//! `var locations = [ {...}, ... ];`. The literal is cut out of the page,
//! rewritten into strict JSON and searched for the requested id.

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::services::normalize::parse_id;

/// Start of the embedded array, up to and including its opening bracket.
const LOCATIONS_PATTERN: &str = r"(?:var|let|const)\s+locations\s*=\s*\[";

/// Coordinate key pairs, most specific first.
const COORDINATE_KEYS: &[(&str, &str)] = &[("latitude", "longitude"), ("lat", "lng"), ("lat", "lon")];

/// Keys that may hold a `[lat, lng]` pair or a nested coordinate object.
const LOCATION_CONTAINERS: &[&str] = &["location", "position", "coords"];

/// Why a page did not yield the requested ticket.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("page has no `locations` array")]
    NoLocations,

    #[error("`locations` array is malformed: {0}")]
    Malformed(String),

    #[error("ticket {0} is not listed on the page")]
    Missing(u64),
}

/// Find ticket `id` on a map page and return it in canonical shape.
pub fn ticket_from_page(html: &str, id: u64) -> Result<Value, PageError> {
    let literal = extract_locations_literal(html).ok_or(PageError::NoLocations)?;
    let entries =
        parse_relaxed_array(&literal).map_err(|e| PageError::Malformed(e.to_string()))?;
    let entry = find_entry(&entries, id).ok_or(PageError::Missing(id))?;
    Ok(canonical_entry(entry))
}

/// Pull the raw text of the `locations` array out of the page's scripts.
pub fn extract_locations_literal(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let scripts = Selector::parse("script").ok()?;
    let pattern = Regex::new(LOCATIONS_PATTERN).ok()?;

    document.select(&scripts).find_map(|script| {
        let source: String = script.text().collect();
        let found = pattern.find(&source)?;
        let open = found.end() - 1;
        let close = matching_bracket(&source, open)?;
        Some(source[open..=close].to_string())
    })
}

/// Index of the bracket closing the one at `open`, skipping strings and comments.
fn matching_bracket(source: &str, open: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    let mut i = open;

    while i < bytes.len() {
        let byte = bytes[i];
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match byte {
            b'/' if is_comment_start(bytes, i) => {
                i = skip_comment(bytes, i);
                continue;
            }
            b'"' | b'\'' | b'`' => quote = Some(byte),
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Decode a JavaScript array literal with relaxed syntax.
pub fn parse_relaxed_array(literal: &str) -> Result<Vec<Value>, serde_json::Error> {
    serde_json::from_str(&relax_to_json(literal))
}

/// Rewrite relaxed JavaScript object syntax into strict JSON.
///
/// Handles bare keys, single-quoted strings, trailing commas, comments and
/// `undefined`.
pub fn relax_to_json(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len() + source.len() / 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                i = read_string(&chars, i, &mut out);
            }
            '/' if is_comment_start(&chars, i) => {
                i = skip_comment(&chars, i);
            }
            ',' => {
                if !matches!(next_significant(&chars, i + 1), Some(']' | '}')) {
                    out.push(',');
                }
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if next_significant(&chars, i) == Some(':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else if ident == "undefined" {
                    out.push_str("null");
                } else {
                    out.push_str(&ident);
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Next character that is neither whitespace nor inside a comment.
fn next_significant(chars: &[char], from: usize) -> Option<char> {
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '/' if is_comment_start(chars, i) => i = skip_comment(chars, i),
            c => return Some(c),
        }
    }
    None
}

fn is_comment_start<T: Copy + Into<char>>(chars: &[T], i: usize) -> bool {
    let at = |k: usize| -> Option<char> { chars.get(k).map(|&c| c.into()) };
    at(i) == Some('/') && matches!(at(i + 1), Some('/' | '*'))
}

/// Index just past the comment starting at `i`.
fn skip_comment<T: Copy + Into<char>>(chars: &[T], mut i: usize) -> usize {
    let at = |k: usize| -> Option<char> { chars.get(k).map(|&c| c.into()) };
    if at(i + 1) == Some('/') {
        while i < chars.len() && at(i) != Some('\n') {
            i += 1;
        }
        return i;
    }
    i += 2;
    while i < chars.len() && !(at(i) == Some('*') && at(i + 1) == Some('/')) {
        i += 1;
    }
    (i + 2).min(chars.len())
}

/// Copy the string literal starting at `start` into `out` as a JSON string.
/// Returns the index just past the closing quote.
fn read_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                match chars.get(i + 1) {
                    Some('\'') => out.push('\''),
                    Some(next) => {
                        out.push('\\');
                        out.push(*next);
                    }
                    None => out.push_str("\\\\"),
                }
                i += 2;
            }
            c if c == quote => {
                i += 1;
                break;
            }
            '"' => {
                out.push_str("\\\"");
                i += 1;
            }
            '\n' => {
                out.push_str("\\n");
                i += 1;
            }
            '\r' => {
                out.push_str("\\r");
                i += 1;
            }
            '\t' => {
                out.push_str("\\t");
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out.push('"');
    i.min(chars.len())
}

/// First entry whose `id` equals `id`.
pub fn find_entry(entries: &[Value], id: u64) -> Option<&Value> {
    entries
        .iter()
        .find(|entry| entry.get("id").and_then(parse_id) == Some(id))
}

/// Map a page entry onto the field names used by the detail API.
///
/// Coordinates are folded into `latitude`/`longitude` and `description`
/// doubles as `report`.
pub fn canonical_entry(entry: &Value) -> Value {
    let Some(map) = entry.as_object() else {
        return entry.clone();
    };
    let mut out = map.clone();

    if let Some((lat, lng)) = coordinates(map) {
        for (a, b) in COORDINATE_KEYS {
            out.remove(*a);
            out.remove(*b);
        }
        for key in LOCATION_CONTAINERS {
            out.remove(*key);
        }
        out.insert("latitude".into(), lat);
        out.insert("longitude".into(), lng);
    }

    if let Some(description) = map.get("description").cloned() {
        out.entry("report").or_insert(description);
    }

    Value::Object(out)
}

fn coordinates(map: &Map<String, Value>) -> Option<(Value, Value)> {
    for (lat_key, lng_key) in COORDINATE_KEYS {
        if let (Some(lat), Some(lng)) = (map.get(*lat_key), map.get(*lng_key)) {
            return Some((lat.clone(), lng.clone()));
        }
    }
    for key in LOCATION_CONTAINERS {
        match map.get(*key) {
            Some(Value::Array(pair)) if pair.len() == 2 => {
                return Some((pair[0].clone(), pair[1].clone()));
            }
            Some(Value::Object(inner)) => {
                if let Some(found) = coordinates(inner) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

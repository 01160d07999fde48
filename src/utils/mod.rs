//! Utility functions and helpers.

pub mod http;
pub mod report;

use url::Url;

pub use report::{LogReporter, MemoryReporter, Reporter};

/// Join a relative endpoint path onto a base URL.
pub fn endpoint(base: &Url, path: &str) -> crate::error::Result<Url> {
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// Parse a file name of the form `<digits>.json` into its numeric id.
pub fn numeric_file_id(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".json")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_appends_to_base_path() {
        let base = Url::parse("https://example.com/api/1.0/").unwrap();
        assert_eq!(
            endpoint(&base, "tickets/detail/42").unwrap().as_str(),
            "https://example.com/api/1.0/tickets/detail/42"
        );
        assert_eq!(
            endpoint(&base, "/map/42").unwrap().as_str(),
            "https://example.com/api/1.0/map/42"
        );
    }

    #[test]
    fn test_numeric_file_id() {
        assert_eq!(numeric_file_id("900.json"), Some(900));
        assert_eq!(numeric_file_id("0012.json"), Some(12));
        assert_eq!(numeric_file_id("900.json.bz2"), None);
        assert_eq!(numeric_file_id("notes.json"), None);
        assert_eq!(numeric_file_id(".json"), None);
        assert_eq!(numeric_file_id("12a.json"), None);
    }
}

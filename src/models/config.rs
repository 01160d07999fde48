//! Application configuration structures.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote endpoints and fetch source selection
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP client, retry and pacing settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Crawl window and circuit breaker settings
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Data file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// What gets written besides the store
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply `TICKETS_*` overrides read through `lookup`
    /// (`std::env::var` in the binary).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("TICKETS_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(dir);
        }
        if let Some(store) = lookup("TICKETS_STORE") {
            self.paths.store_file = PathBuf::from(store);
        }
        if let Some(dir) = lookup("TICKETS_SEED_DIR") {
            self.crawl.seed_dir = Some(PathBuf::from(dir));
        }
        if let Some(anchor) = lookup("TICKETS_ANCHOR") {
            self.crawl.anchor_override = Some(parse_env("TICKETS_ANCHOR", &anchor)?);
        }
        if let Some(value) = lookup("TICKETS_LOOK_BACK") {
            self.crawl.look_back = parse_env("TICKETS_LOOK_BACK", &value)?;
        }
        if let Some(value) = lookup("TICKETS_LOOK_AHEAD") {
            self.crawl.look_ahead = parse_env("TICKETS_LOOK_AHEAD", &value)?;
        }
        if let Some(mode) = lookup("TICKETS_SOURCE") {
            self.source.mode = mode.parse()?;
        }
        if let Some(flag) = lookup("TICKETS_ARCHIVE_RAW") {
            self.output.archive_raw = parse_flag("TICKETS_ARCHIVE_RAW", &flag)?;
        }
        Ok(())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.crawl.look_back < 0 {
            return Err(AppError::validation("crawl.look_back must be >= 0"));
        }
        if self.crawl.look_ahead < 0 {
            return Err(AppError::validation("crawl.look_ahead must be >= 0"));
        }
        if self.crawl.failure_threshold == 0 {
            return Err(AppError::validation("crawl.failure_threshold must be > 0"));
        }
        self.source.api_url()?;
        self.source.web_url()?;
        Ok(())
    }

    /// Absolute-or-relative path of the store file.
    pub fn store_path(&self) -> PathBuf {
        self.paths.resolve(&self.paths.store_file)
    }

    /// Directory receiving compressed snapshots.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.paths.resolve(&self.paths.snapshot_dir)
    }

    /// Path of the derived cycling subset store.
    pub fn subset_path(&self) -> PathBuf {
        self.paths.resolve(&self.paths.subset_file)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("{key}={value:?} is invalid: {e}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::config(format!(
            "{key}={value:?} is not a boolean"
        ))),
    }
}

/// Which backend(s) a fetch may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// JSON API first, HTML page when the API yields nothing
    #[default]
    Auto,
    /// JSON API only
    Api,
    /// HTML page only
    Web,
}

impl FromStr for SourceMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "api" => Ok(Self::Api),
            "web" => Ok(Self::Web),
            other => Err(AppError::config(format!(
                "unknown source mode '{other}' (expected auto, api or web)"
            ))),
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Api => "api",
            Self::Web => "web",
        };
        f.write_str(name)
    }
}

/// Remote endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base of the JSON API (`{base}/tickets/detail/{id}`)
    #[serde(default = "defaults::api_base_url")]
    pub api_base_url: String,

    /// Base of the public site (`{base}/map/{id}`)
    #[serde(default = "defaults::web_base_url")]
    pub web_base_url: String,

    #[serde(default)]
    pub mode: SourceMode,

    /// Query string for the full ticket list
    #[serde(default = "defaults::list_query")]
    pub list_query: String,
}

impl SourceConfig {
    pub fn api_url(&self) -> Result<Url> {
        base_url(&self.api_base_url)
    }

    pub fn web_url(&self) -> Result<Url> {
        base_url(&self.web_base_url)
    }
}

/// Parse a base URL, forcing a trailing slash so `join` appends.
fn base_url(raw: &str) -> Result<Url> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(Url::parse(&normalized)?)
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base_url: defaults::api_base_url(),
            web_base_url: defaults::web_base_url(),
            mode: SourceMode::default(),
            list_query: defaults::list_query(),
        }
    }
}

/// HTTP client and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt, per strategy
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_ms: u64,

    /// Delay between consecutive ids in milliseconds
    #[serde(default)]
    pub request_delay_ms: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            backoff_base_ms: defaults::backoff_base(),
            backoff_max_ms: defaults::backoff_max(),
            request_delay_ms: 0,
        }
    }
}

/// Crawl window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Ids to revisit below the anchor
    #[serde(default = "defaults::look_back")]
    pub look_back: i64,

    /// Ids to probe above the anchor
    #[serde(default = "defaults::look_ahead")]
    pub look_ahead: i64,

    /// Consecutive failed ids before the crawl stops
    #[serde(default = "defaults::failure_threshold")]
    pub failure_threshold: u32,

    /// Anchor used when the store is empty
    #[serde(default)]
    pub anchor_override: Option<u64>,

    /// Directory of `<id>.json` files from the bulk download
    #[serde(default)]
    pub seed_dir: Option<PathBuf>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            look_back: defaults::look_back(),
            look_ahead: defaults::look_ahead(),
            failure_threshold: defaults::failure_threshold(),
            anchor_override: None,
            seed_dir: None,
        }
    }
}

/// File locations. Relative paths resolve against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "defaults::store_file")]
    pub store_file: PathBuf,

    #[serde(default = "defaults::snapshot_dir")]
    pub snapshot_dir: PathBuf,

    #[serde(default = "defaults::subset_file")]
    pub subset_file: PathBuf,
}

impl PathsConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            store_file: defaults::store_file(),
            snapshot_dir: defaults::snapshot_dir(),
            subset_file: defaults::subset_file(),
        }
    }
}

/// Optional outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Archive every raw crawl as a compressed snapshot
    #[serde(default = "defaults::archive_raw")]
    pub archive_raw: bool,

    /// Also write the cycling-related subset store
    #[serde(default)]
    pub write_subset: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            archive_raw: defaults::archive_raw(),
            write_subset: false,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Source defaults
    pub fn api_base_url() -> String {
        "https://www.plznito.cz/api/1.0".into()
    }
    pub fn web_base_url() -> String {
        "https://www.plznito.cz".into()
    }
    pub fn list_query() -> String {
        "categoryId=0&statusId=0&arch=0&term=&own=0".into()
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; ticket-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn backoff_base() -> u64 {
        500
    }
    pub fn backoff_max() -> u64 {
        8_000
    }

    // Crawl defaults
    pub fn look_back() -> i64 {
        50
    }
    pub fn look_ahead() -> i64 {
        300
    }
    pub fn failure_threshold() -> u32 {
        10
    }

    // Path defaults
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn store_file() -> PathBuf {
        PathBuf::from("tickets.json")
    }
    pub fn snapshot_dir() -> PathBuf {
        PathBuf::from("snapshots")
    }
    pub fn subset_file() -> PathBuf {
        PathBuf::from("tickets_cycling.json")
    }

    pub fn archive_raw() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_window() {
        let mut config = Config::default();
        config.crawl.look_back = -1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crawl.look_ahead = -5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_threshold_and_timeout() {
        let mut config = Config::default();
        config.crawl.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.http.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawl]
            look_ahead = 20

            [source]
            mode = "web"
            "#,
        )
        .unwrap();
        assert_eq!(config.crawl.look_ahead, 20);
        assert_eq!(config.crawl.look_back, 50);
        assert_eq!(config.source.mode, SourceMode::Web);
        assert!(config.output.archive_raw);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("TICKETS_ANCHOR", "33874"),
                ("TICKETS_LOOK_BACK", "10"),
                ("TICKETS_SOURCE", "API"),
                ("TICKETS_ARCHIVE_RAW", "off"),
                ("TICKETS_DATA_DIR", "/srv/tickets"),
            ]))
            .unwrap();

        assert_eq!(config.crawl.anchor_override, Some(33874));
        assert_eq!(config.crawl.look_back, 10);
        assert_eq!(config.source.mode, SourceMode::Api);
        assert!(!config.output.archive_raw);
        assert_eq!(config.store_path(), PathBuf::from("/srv/tickets/tickets.json"));
    }

    #[test]
    fn env_override_rejects_garbage() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("TICKETS_ANCHOR", "abc")])).is_err());
        assert!(config.apply_env(env(&[("TICKETS_SOURCE", "ftp")])).is_err());
        assert!(config.apply_env(env(&[("TICKETS_ARCHIVE_RAW", "maybe")])).is_err());
    }

    #[test]
    fn base_urls_join_paths() {
        let source = SourceConfig::default();
        let api = source.api_url().unwrap();
        assert_eq!(
            api.join("tickets/detail/5").unwrap().as_str(),
            "https://www.plznito.cz/api/1.0/tickets/detail/5"
        );
    }

    #[test]
    fn absolute_store_path_is_kept() {
        let mut config = Config::default();
        config.paths.store_file = PathBuf::from("/tmp/store.json");
        assert_eq!(config.store_path(), PathBuf::from("/tmp/store.json"));
    }
}

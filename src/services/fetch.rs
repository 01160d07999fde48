// src/services/fetch.rs

//! Ticket fetch client.
//!
//! A fetch is an ordered list of [`FetchStrategy`] values tried in sequence.
//! Each strategy gets its own retry budget with exponential backoff; the
//! first one to return a payload wins. When every strategy is exhausted the
//! caller receives a [`FetchFailure`] listing what each one saw.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::error::Result;
use crate::models::{Config, HttpConfig, SourceMode};
use crate::services::normalize::unwrap_item;
use crate::services::web::{PageError, ticket_from_page};
use crate::utils::Reporter;

/// Exponential backoff between retries of one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Failure of a single attempt against one backend.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("malformed payload from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("empty payload from {url}")]
    Empty { url: String },

    #[error("{url}: {source}")]
    Page {
        url: String,
        #[source]
        source: PageError,
    },

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

impl FetchError {
    /// Whether another attempt against the same backend may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } | Self::Decode { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Page { source, .. } => matches!(source, PageError::Malformed(_)),
            Self::Empty { .. } | Self::Url(_) => false,
        }
    }
}

/// Last error seen by one strategy after its retries ran out.
#[derive(Debug)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub tries: u32,
    pub error: FetchError,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.tries == 1 { "try" } else { "tries" };
        write!(
            f,
            "{} after {} {}: {}",
            self.strategy, self.tries, plural, self.error
        )
    }
}

/// Every strategy failed for `id`.
#[derive(Debug, Error)]
#[error("ticket {id}: all sources failed ({})", summarize(.attempts))]
pub struct FetchFailure {
    pub id: u64,
    pub attempts: Vec<StrategyFailure>,
}

fn summarize(attempts: &[StrategyFailure]) -> String {
    if attempts.is_empty() {
        return "no sources configured".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A payload returned by one strategy.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub id: u64,
    /// Name of the strategy that produced the payload
    pub source: &'static str,
    pub payload: Value,
}

/// One way of fetching a ticket payload.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name used in logs and failures.
    fn name(&self) -> &'static str;

    /// Single attempt, no retries.
    async fn fetch(&self, id: u64) -> std::result::Result<Value, FetchError>;
}

/// `GET {base}/tickets/detail/{id}` returning JSON.
pub struct ApiStrategy {
    client: Client,
    base: Url,
}

impl ApiStrategy {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl FetchStrategy for ApiStrategy {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn fetch(&self, id: u64) -> std::result::Result<Value, FetchError> {
        let url = self.base.join(&format!("tickets/detail/{id}"))?;
        let payload = get_json(&self.client, &url).await?;
        Ok(unwrap_item(&payload).clone())
    }
}

/// `GET {base}/map/{id}` returning HTML with an embedded `locations` array.
pub struct WebStrategy {
    client: Client,
    base: Url,
}

impl WebStrategy {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl FetchStrategy for WebStrategy {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn fetch(&self, id: u64) -> std::result::Result<Value, FetchError> {
        let url = self.base.join(&format!("map/{id}"))?;
        let html = get_text(&self.client, &url).await?;
        ticket_from_page(&html, id).map_err(|source| FetchError::Page {
            url: url.to_string(),
            source,
        })
    }
}

/// GET a URL and return its body; any non-2xx status is an error.
async fn get_text(client: &Client, url: &Url) -> std::result::Result<String, FetchError> {
    let request_error = |source| FetchError::Request {
        url: url.to_string(),
        source,
    };
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(request_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    response.text().await.map_err(request_error)
}

/// GET a URL and decode a non-empty JSON body.
pub async fn get_json(client: &Client, url: &Url) -> std::result::Result<Value, FetchError> {
    let body = get_text(client, url).await?;
    decode_payload(&body, url.as_str())
}

/// Decode a response body, treating blank or falsy JSON as empty.
fn decode_payload(body: &str, url: &str) -> std::result::Result<Value, FetchError> {
    if body.trim().is_empty() {
        return Err(FetchError::Empty { url: url.into() });
    }
    let payload: Value = serde_json::from_str(body).map_err(|e| FetchError::Decode {
        url: url.into(),
        message: e.to_string(),
    })?;
    if is_falsy(&payload) {
        return Err(FetchError::Empty { url: url.into() });
    }
    Ok(payload)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) | Value::Bool(true) => false,
    }
}

/// Run `op` until it succeeds, fails permanently or the retry budget is spent.
pub async fn with_retry<T, F, Fut>(
    policy: &BackoffPolicy,
    strategy: &'static str,
    reporter: &dyn Reporter,
    mut op: F,
) -> std::result::Result<T, StrategyFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                reporter.debug(&format!(
                    "{strategy}: attempt {} failed ({error}), retrying in {delay:?}",
                    attempt + 1
                ));
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(StrategyFailure {
                    strategy,
                    tries: attempt + 1,
                    error,
                });
            }
        }
    }
}

/// Fetch client: ordered strategies plus a shared backoff policy.
pub struct TicketFetcher {
    strategies: Vec<Box<dyn FetchStrategy>>,
    backoff: BackoffPolicy,
}

impl TicketFetcher {
    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>, backoff: BackoffPolicy) -> Self {
        Self {
            strategies,
            backoff,
        }
    }

    /// Build the strategy chain for the configured source mode.
    ///
    /// `auto` tries the API first and falls back to the HTML page.
    pub fn from_config(config: &Config, client: Client) -> Result<Self> {
        Self::for_mode(config, config.source.mode, client)
    }

    /// Same as [`TicketFetcher::from_config`] with an explicit mode.
    pub fn for_mode(config: &Config, mode: SourceMode, client: Client) -> Result<Self> {
        let api = || -> Result<Box<dyn FetchStrategy>> {
            Ok(Box::new(ApiStrategy::new(client.clone(), config.source.api_url()?)))
        };
        let web = || -> Result<Box<dyn FetchStrategy>> {
            Ok(Box::new(WebStrategy::new(client.clone(), config.source.web_url()?)))
        };

        let strategies = match mode {
            SourceMode::Auto => vec![api()?, web()?],
            SourceMode::Api => vec![api()?],
            SourceMode::Web => vec![web()?],
        };
        Ok(Self::new(strategies, BackoffPolicy::from_config(&config.http)))
    }

    /// Names of the strategies in the order they are tried.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Fetch one ticket payload, falling through the strategy chain.
    pub async fn fetch(
        &self,
        id: u64,
        reporter: &dyn Reporter,
    ) -> std::result::Result<Fetched, FetchFailure> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let name = strategy.name();
            match with_retry(&self.backoff, name, reporter, || strategy.fetch(id)).await {
                Ok(payload) => {
                    if !attempts.is_empty() {
                        reporter.debug(&format!("ticket {id}: recovered via {name}"));
                    }
                    return Ok(Fetched {
                        id,
                        source: name,
                        payload,
                    });
                }
                Err(failure) => {
                    reporter.debug(&format!("ticket {id}: {failure}"));
                    attempts.push(failure);
                }
            }
        }

        Err(FetchFailure { id, attempts })
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::testing::*;
    use super::*;
    use crate::utils::MemoryReporter;

    fn decode_error() -> FetchError {
        FetchError::Decode {
            url: "x".into(),
            message: "expected value".into(),
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_classification() {
        let status = |status| FetchError::HttpStatus {
            status,
            url: "x".into(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(decode_error().is_retryable());
        assert!(!FetchError::Empty { url: "x".into() }.is_retryable());
        assert!(
            !FetchError::Page {
                url: "x".into(),
                source: PageError::Missing(3)
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_decode_payload_treats_falsy_as_empty() {
        assert!(matches!(decode_payload("", "u"), Err(FetchError::Empty { .. })));
        assert!(matches!(decode_payload("{}", "u"), Err(FetchError::Empty { .. })));
        assert!(matches!(decode_payload("[]", "u"), Err(FetchError::Empty { .. })));
        assert!(matches!(decode_payload("null", "u"), Err(FetchError::Empty { .. })));
        assert!(matches!(
            decode_payload("<html>", "u"),
            Err(FetchError::Decode { .. })
        ));
        assert!(matches!(decode_payload("false", "u"), Err(FetchError::Empty { .. })));
        assert_eq!(decode_payload("true", "u").unwrap(), json!(true));
        assert_eq!(decode_payload(r#"{"id": 1}"#, "u").unwrap(), json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_retries_transient_failures_then_succeeds() {
        let api = Arc::new(ScriptedStrategy::new(
            "api",
            vec![Err(decode_error()), Ok(json!({"id": 5}))],
        ));
        let fetcher = TicketFetcher::new(vec![Box::new(Arc::clone(&api))], no_backoff());

        let fetched = fetcher.fetch(5, &MemoryReporter::new()).await.unwrap();
        assert_eq!(fetched.source, "api");
        assert_eq!(fetched.payload, json!({"id": 5}));
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let api = Arc::new(ScriptedStrategy::new(
            "api",
            (0..10).map(|_| Err(decode_error())).collect(),
        ));
        let fetcher = TicketFetcher::new(vec![Box::new(Arc::clone(&api))], no_backoff());

        let failure = fetcher.fetch(5, &MemoryReporter::new()).await.unwrap_err();
        assert_eq!(api.calls(), 3);
        assert_eq!(failure.attempts.len(), 1);
        assert_eq!(failure.attempts[0].tries, 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let api = Arc::new(ScriptedStrategy::new(
            "api",
            vec![Err(FetchError::HttpStatus {
                status: 404,
                url: "x".into(),
            })],
        ));
        let fetcher = TicketFetcher::new(vec![Box::new(Arc::clone(&api))], no_backoff());

        assert!(fetcher.fetch(5, &MemoryReporter::new()).await.is_err());
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_strategy() {
        let api = Arc::new(ScriptedStrategy::new(
            "api",
            vec![Err(FetchError::Empty { url: "x".into() })],
        ));
        let web = Arc::new(ScriptedStrategy::new("web", vec![Ok(json!({"id": 8}))]));
        let fetcher = TicketFetcher::new(
            vec![Box::new(Arc::clone(&api)), Box::new(Arc::clone(&web))],
            no_backoff(),
        );

        let fetched = fetcher.fetch(8, &MemoryReporter::new()).await.unwrap();
        assert_eq!(fetched.source, "web");
        assert_eq!(api.calls(), 1);
        assert_eq!(web.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_lists_every_strategy() {
        let fetcher = TicketFetcher::new(
            vec![
                Box::new(ScriptedStrategy::new("api", vec![])),
                Box::new(ScriptedStrategy::new("web", vec![])),
            ],
            no_backoff(),
        );

        let failure = fetcher.fetch(3, &MemoryReporter::new()).await.unwrap_err();
        assert_eq!(failure.id, 3);
        let names: Vec<_> = failure.attempts.iter().map(|a| a.strategy).collect();
        assert_eq!(names, vec!["api", "web"]);
        assert!(failure.to_string().starts_with("ticket 3: all sources failed"));
    }

    #[test]
    fn test_source_mode_builds_expected_chain() {
        let config = Config::default();
        let client = Client::new();

        let auto = TicketFetcher::for_mode(&config, SourceMode::Auto, client.clone()).unwrap();
        assert_eq!(auto.strategy_names(), vec!["api", "web"]);

        let api = TicketFetcher::for_mode(&config, SourceMode::Api, client.clone()).unwrap();
        assert_eq!(api.strategy_names(), vec!["api"]);

        let web = TicketFetcher::for_mode(&config, SourceMode::Web, client).unwrap();
        assert_eq!(web.strategy_names(), vec!["web"]);
    }
}

#[cfg(test)]
mod http_tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::testing::no_backoff;
    use super::*;
    use crate::utils::MemoryReporter;

    const MAP_PAGE: &str = "<html><body><script>\
        var locations = [{id: 7, name: 'Výtluk', description: 'Hluboký', lat: 49.7, lng: 13.3}];\
        </script></body></html>";

    /// Local HTTP server answering fixed routes; unknown paths get 404.
    struct TestServer {
        base: Url,
        paths: Arc<Mutex<Vec<String>>>,
    }

    impl TestServer {
        async fn start(routes: Vec<(&'static str, u16, &'static str)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let paths = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&paths);

            tokio::spawn(async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request);
                    let path = head.split_whitespace().nth(1).unwrap_or("").to_string();
                    seen.lock().unwrap().push(path.clone());

                    let (status, body) = routes
                        .iter()
                        .find(|(p, _, _)| *p == path)
                        .map(|(_, status, body)| (*status, *body))
                        .unwrap_or((404, "not found"));
                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });

            Self {
                base: Url::parse(&format!("http://{addr}/")).unwrap(),
                paths,
            }
        }

        fn paths(&self) -> Vec<String> {
            self.paths.lock().unwrap().clone()
        }
    }

    fn client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn test_api_non_success_status_is_an_error() {
        let server = TestServer::start(vec![]).await;
        let api = ApiStrategy::new(client(), server.base.clone());

        let err = api.fetch(5).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
        assert_eq!(server.paths(), vec!["/tickets/detail/5"]);
    }

    #[tokio::test]
    async fn test_api_empty_object_is_empty() {
        let server = TestServer::start(vec![("/tickets/detail/5", 200, "{}")]).await;
        let api = ApiStrategy::new(client(), server.base.clone());

        assert!(matches!(api.fetch(5).await, Err(FetchError::Empty { .. })));
    }

    #[tokio::test]
    async fn test_api_unwraps_item_envelope() {
        let server = TestServer::start(vec![(
            "/tickets/detail/9",
            200,
            r#"{"item": {"id": 9, "name": "Lampa"}}"#,
        )])
        .await;
        let api = ApiStrategy::new(client(), server.base.clone());

        assert_eq!(api.fetch(9).await.unwrap(), json!({"id": 9, "name": "Lampa"}));
    }

    #[tokio::test]
    async fn test_web_maps_page_fields() {
        let server = TestServer::start(vec![("/map/7", 200, MAP_PAGE)]).await;
        let web = WebStrategy::new(client(), server.base.clone());

        let payload = web.fetch(7).await.unwrap();
        assert_eq!(payload["id"], json!(7));
        assert_eq!(payload["latitude"], json!(49.7));
        assert_eq!(payload["longitude"], json!(13.3));
        assert_eq!(payload["report"], json!("Hluboký"));
        assert_eq!(server.paths(), vec!["/map/7"]);
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_web_on_empty_api() {
        let server = TestServer::start(vec![
            ("/tickets/detail/7", 200, "{}"),
            ("/map/7", 200, MAP_PAGE),
        ])
        .await;
        let fetcher = TicketFetcher::new(
            vec![
                Box::new(ApiStrategy::new(client(), server.base.clone())),
                Box::new(WebStrategy::new(client(), server.base.clone())),
            ],
            no_backoff(),
        );

        let fetched = fetcher.fetch(7, &MemoryReporter::new()).await.unwrap();
        assert_eq!(fetched.source, "web");
        assert_eq!(fetched.payload["name"], json!("Výtluk"));
        assert_eq!(server.paths(), vec!["/tickets/detail/7", "/map/7"]);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = TestServer::start(vec![("/tickets/detail/3", 503, "busy")]).await;
        let fetcher = TicketFetcher::new(
            vec![Box::new(ApiStrategy::new(client(), server.base.clone()))],
            no_backoff(),
        );

        let failure = fetcher.fetch(3, &MemoryReporter::new()).await.unwrap_err();
        assert_eq!(failure.attempts[0].tries, 3);
        assert_eq!(server.paths().len(), 3);
    }
}

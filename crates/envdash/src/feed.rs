//! The network primitive every other component goes through.
//!
//! Components call [`FeedClient`] instead of `reqwest` directly, which keeps
//! the aggregators testable with the mock in [`mock`].

use crate::error::{FeedError, FeedResult};
use reqwest::Url;
use serde_json::Value;
use std::future::Future;

/// Default `User-Agent`. api.weather.gov refuses requests without one.
pub const DEFAULT_USER_AGENT: &str = concat!("envdash/", env!("CARGO_PKG_VERSION"));

/// Fetch-and-decode access to JSON feeds.
///
/// One attempt per call: no retry, no timeout.
pub trait FeedClient: Send + Sync + 'static {
    /// GET `url` and decode the body as JSON.
    fn fetch_json(&self, url: &str) -> impl Future<Output = FeedResult<Value>> + Send;

    /// GET `url` and report the HTTP status without decoding the body.
    fn fetch_status(&self, url: &str) -> impl Future<Output = FeedResult<u16>> + Send;
}

/// Production client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    client: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new(user_agent: &str) -> FeedResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FeedError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl FeedClient for HttpFeedClient {
    async fn fetch_json(&self, url: &str) -> FeedResult<Value> {
        log::debug!("[Feed] GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| transport(url, e))?;
        serde_json::from_slice(&body).map_err(|e| FeedError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn fetch_status(&self, url: &str) -> FeedResult<u16> {
        log::debug!("[Feed] GET {} (status only)", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(url, e))?;
        Ok(response.status().as_u16())
    }
}

fn transport(url: &str, err: reqwest::Error) -> FeedError {
    FeedError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Append query parameters to `base`, percent-encoding the values.
pub fn with_query(base: &str, params: &[(&str, String)]) -> FeedResult<String> {
    let url = Url::parse_with_params(base, params)
        .map_err(|_| FeedError::InvalidUrl(base.to_string()))?;
    Ok(url.into())
}

/// Follow a dotted/indexed path such as `features.0.id` into a JSON tree.
///
/// Returns `Value::Null` when any step is absent.
pub fn lookup<'a>(value: &'a Value, path: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    path.split('.')
        .try_fold(value, |node, key| match key.parse::<usize>() {
            Ok(index) => node.get(index),
            Err(_) => node.get(key),
        })
        .unwrap_or(&NULL)
}

// ── MockFeed for testing ─────────────────────────────────────────────────


// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::mock::MockFeed;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_query_encodes_params() {
        let url = with_query(
            "https://api.example.com/geo/1.0/zip",
            &[("zip", "02139,US".to_string()), ("appid", "k".to_string())],
        )
        .unwrap();
        assert_eq!(url, "https://api.example.com/geo/1.0/zip?zip=02139%2CUS&appid=k");
    }

    #[test]
    fn test_with_query_rejects_relative_base() {
        let err = with_query("not a url", &[]).unwrap_err();
        assert!(matches!(err, FeedError::InvalidUrl(_)));
    }

    #[test]
    fn test_lookup_paths() {
        let doc = json!({"features": [{"id": "https://x/stations/KBOS"}], "a": {"b": 2}});
        assert_eq!(
            lookup(&doc, "features.0.id").as_str(),
            Some("https://x/stations/KBOS")
        );
        assert_eq!(lookup(&doc, "a.b"), &json!(2));
        assert!(lookup(&doc, "features.1.id").is_null());
        assert!(lookup(&doc, "a.c.d").is_null());
    }

    #[tokio::test]
    async fn test_mock_routes_by_needles() {
        let feed = MockFeed::new()
            .on_json(&["aq.test", "hourly="], json!({"hourly": {}}))
            .on_json(&["aq.test"], json!({"current": {}}))
            .on_status(&["/api/run"], 500);

        let next = feed.fetch_json("http://aq.test/v1?hourly=pm10").await.unwrap();
        assert!(next.get("hourly").is_some());
        let now = feed.fetch_json("http://aq.test/v1?current=pm10").await.unwrap();
        assert!(now.get("current").is_some());
        assert_eq!(feed.fetch_status("http://dev/api/run").await.unwrap(), 500);
        assert!(matches!(
            feed.fetch_json("http://dev/api/run").await,
            Err(FeedError::Status { status: 500, .. })
        ));
        assert!(feed.fetch_json("http://unrouted/").await.is_err());
        assert_eq!(feed.calls().len(), 5);
        assert_eq!(feed.call_count("aq.test"), 2);
    }

    #[test]
    fn test_default_user_agent() {
        assert!(DEFAULT_USER_AGENT.starts_with("envdash/"));
        assert!(HttpFeedClient::new(DEFAULT_USER_AGENT).is_ok());
    }
}

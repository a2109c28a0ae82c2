//! Request, response and cache entry types

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// How a request was initiated, using the `Sec-Fetch-Mode` vocabulary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Full page document load
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` header value
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(Self::Navigate),
            "same-origin" => Some(Self::SameOrigin),
            "no-cors" => Some(Self::NoCors),
            "cors" => Some(Self::Cors),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::SameOrigin => "same-origin",
            Self::NoCors => "no-cors",
            Self::Cors => "cors",
        }
    }
}

/// Request identity used as the cache key: the URL without its fragment.
pub fn cache_key(url: &str) -> String {
    match url.split_once('#') {
        Some((base, _)) => base.to_string(),
        None => url.to_string(),
    }
}

/// A request dispatched to the worker
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// Path and query relative to the origin, or an absolute URL
    pub url: String,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            mode: RequestMode::default(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A plain sub-resource GET
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// A GET issued by a full page navigation
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate)
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

/// A response produced by the network or read back from a cache generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// URL the response was fetched for
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// True for 2xx statuses
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type")
            .unwrap_or("application/octet-stream")
    }
}

/// Metadata for a stored cache entry; the body lives beside it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request identity the entry is stored under
    pub key: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn from_response(key: &str, response: &FetchResponse) -> Self {
        Self {
            key: key.to_string(),
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            size: response.body.len() as u64,
            stored_at: Utc::now(),
        }
    }

    pub fn into_response(self, body: Vec<u8>) -> FetchResponse {
        FetchResponse {
            url: self.url,
            status: self.status,
            headers: self.headers,
            body,
        }
    }
}

/// Statistics about a cache store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub generations: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries written since the store was created
    pub writes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_mode_from_header() {
        assert_eq!(
            RequestMode::from_header("navigate"),
            Some(RequestMode::Navigate)
        );
        assert_eq!(
            RequestMode::from_header(" No-CORS "),
            Some(RequestMode::NoCors)
        );
        assert_eq!(
            RequestMode::from_header("same-origin"),
            Some(RequestMode::SameOrigin)
        );
        assert_eq!(RequestMode::from_header("websocket"), None);
    }

    #[test]
    fn test_request_mode_serialization() {
        let json = serde_json::to_string(&RequestMode::SameOrigin).unwrap();
        assert_eq!(json, "\"same-origin\"");
        assert_eq!(RequestMode::SameOrigin.as_str(), "same-origin");
    }

    #[test]
    fn test_cache_key_strips_fragment() {
        assert_eq!(cache_key("/portal/offline/#top"), "/portal/offline/");
        assert_eq!(cache_key("/static/app.js?v=3"), "/static/app.js?v=3");
    }

    #[test]
    fn test_request_builders() {
        let get = FetchRequest::get("/static/manifest.json");
        assert!(get.is_get());
        assert!(!get.is_navigation());
        assert_eq!(get.mode, RequestMode::NoCors);

        let nav = FetchRequest::navigate("/portal/#section");
        assert!(nav.is_navigation());
        assert_eq!(nav.cache_key(), "/portal/");

        let post = FetchRequest::new(Method::POST, "/api/shifts").with_body("{}");
        assert!(!post.is_get());
        assert_eq!(post.body, b"{}");
    }

    #[test]
    fn test_response_helpers() {
        let response = FetchResponse::new("/static/manifest.json", 200)
            .with_header("Content-Type", "application/json")
            .with_body("{}");
        assert!(response.is_ok());
        assert_eq!(response.content_type(), "application/json");
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));

        let missing = FetchResponse::new("/missing", 404);
        assert!(!missing.is_ok());
        assert_eq!(missing.content_type(), "application/octet-stream");
    }

    #[test]
    fn test_cache_entry_serialization() {
        let response = FetchResponse::new("/static/images/icon-192.png", 200)
            .with_header("content-type", "image/png")
            .with_body(vec![0u8; 12345]);
        let entry = CacheEntry::from_response("/static/images/icon-192.png", &response);

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("image/png"));
        assert!(json.contains("12345"));

        let deserialized: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.key, entry.key);
        assert_eq!(deserialized.size, 12345);

        let restored = deserialized.into_response(response.body.clone());
        assert_eq!(restored, response);
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.generations, 0);
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.writes, 0);
    }
}

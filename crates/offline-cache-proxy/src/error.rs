//! Error types for the offline cache proxy

use offline_cache_worker::OfflineCacheError;
use std::fmt;

#[derive(Debug)]
pub enum ProxyError {
    Worker(OfflineCacheError),
    Io(Box<std::io::Error>),
    Json(serde_json::Error),
    Config(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Worker(err) => write!(f, "Worker error: {}", err),
            ProxyError::Io(err) => write!(f, "IO error: {}", err),
            ProxyError::Json(err) => write!(f, "JSON error: {}", err),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Worker(err) => Some(err),
            ProxyError::Io(err) => Some(err.as_ref()),
            ProxyError::Json(err) => Some(err),
            ProxyError::Config(_) => None,
        }
    }
}

impl From<OfflineCacheError> for ProxyError {
    fn from(err: OfflineCacheError) -> Self {
        ProxyError::Worker(err)
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Json(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for ProxyError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

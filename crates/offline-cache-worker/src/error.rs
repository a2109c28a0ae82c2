//! Error types for the offline cache worker

use crate::lifecycle::WorkerState;
use std::fmt;

#[derive(Debug)]
pub enum OfflineCacheError {
    /// The network could not produce a response
    Network(String),
    /// HTTP client failure while talking to the origin
    Http(reqwest::Error),
    /// A pre-cached asset answered with a non-2xx status
    BadStatus { url: String, status: u16 },
    /// The same asset URL appears twice in the pre-cache list
    DuplicateAsset(String),
    /// A URL could not be parsed or resolved against the origin
    InvalidUrl(String),
    Io(Box<std::io::Error>),
    Json(serde_json::Error),
    /// Lifecycle transition the state machine does not allow
    InvalidTransition { from: WorkerState, to: WorkerState },
    /// Activation could not delete these stale generations
    StaleCaches(Vec<String>),
    /// Activation was requested with no installed worker waiting
    NoWaitingWorker,
}

impl fmt::Display for OfflineCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Http(err) => write!(f, "HTTP error: {}", err),
            Self::BadStatus { url, status } => {
                write!(f, "Asset {} returned status {}", url, status)
            }
            Self::DuplicateAsset(url) => write!(f, "Duplicate asset in pre-cache list: {}", url),
            Self::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Json(err) => write!(f, "JSON error: {}", err),
            Self::InvalidTransition { from, to } => {
                write!(f, "Invalid worker state transition: {} -> {}", from, to)
            }
            Self::StaleCaches(names) => {
                write!(f, "Failed to delete stale caches: {}", names.join(", "))
            }
            Self::NoWaitingWorker => write!(f, "No installed worker is waiting to activate"),
        }
    }
}

impl std::error::Error for OfflineCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Io(err) => Some(err.as_ref()),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OfflineCacheError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<std::io::Error> for OfflineCacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for OfflineCacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, OfflineCacheError>;

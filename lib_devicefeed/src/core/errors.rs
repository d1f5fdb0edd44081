//! # Feed Errors
//!
//! Every failure the stream and fetch components can hit. Transport and
//! construction failures are never returned across the subscriber boundary;
//! they are captured as `ErrorInfo` in the observable view instead.

use std::fmt;
use thiserror::Error;

/// Errors raised by the codec, the subscriber and the fetch controller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeedError {
    /// An inbound payload was not well-formed or lacked a required field.
    /// The payload is dropped; the stream keeps running.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The connection failed to open or dropped while open.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote server answered with a non-success status code.
    #[error("HTTP error! status: {status}")]
    Http {
        /// Numeric HTTP status code.
        status: u16,
        /// Raw response body, kept for diagnostics.
        body: Option<String>,
    },

    /// The connection could not even be initiated (e.g. malformed endpoint).
    #[error("Construction error: {0}")]
    Construction(String),

    /// A fetch was requested before a target identifier was set.
    #[error("No target identifier has been set")]
    MissingTarget,

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeedError {
    /// Coarse classification used by observers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedError::Decode(_) => ErrorKind::Decode,
            FeedError::Transport(_) => ErrorKind::Transport,
            FeedError::Http { .. } => ErrorKind::Http,
            FeedError::Construction(_) => ErrorKind::Construction,
            FeedError::MissingTarget => ErrorKind::MissingTarget,
            FeedError::Config(_) => ErrorKind::Config,
        }
    }
}

#[cfg(feature = "forecast")]
impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if !status.is_success() => FeedError::Http {
                status: status.as_u16(),
                body: None,
            },
            _ if e.is_decode() => FeedError::Decode(e.to_string()),
            _ => FeedError::Transport(e.to_string()),
        }
    }
}

#[cfg(feature = "forecast")]
impl From<reqwest_middleware::Error> for FeedError {
    fn from(e: reqwest_middleware::Error) -> Self {
        match e {
            reqwest_middleware::Error::Reqwest(inner) => inner.into(),
            reqwest_middleware::Error::Middleware(inner) => FeedError::Transport(inner.to_string()),
        }
    }
}

#[cfg(feature = "stream")]
impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::Url(inner) => FeedError::Construction(inner.to_string()),
            other => FeedError::Transport(other.to_string()),
        }
    }
}

/// Classification of a captured error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed inbound payload.
    Decode,
    /// Connection failed or dropped.
    Transport,
    /// Non-success response status.
    Http,
    /// Connection could not be initiated.
    Construction,
    /// No target identifier.
    MissingTarget,
    /// Invalid configuration.
    Config,
}

/// Renderable error state exposed to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    /// What went wrong, coarsely.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl ErrorInfo {
    /// Builds an `ErrorInfo` from a kind and a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&FeedError> for ErrorInfo {
    fn from(e: &FeedError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<FeedError> for ErrorInfo {
    fn from(e: FeedError) -> Self {
        Self::from(&e)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

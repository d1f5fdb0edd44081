//! # Data Model
//!
//! Records exchanged with the anomaly broker and the forecast server. Field
//! names on the wire follow the remote services (`timestamp_start`,
//! `most_anomalous_feature`, ...); the Rust side uses descriptive names.

use serde::{Deserialize, Serialize};

use crate::core::errors::FeedError;

/// # Anomaly Event
///
/// One anomaly detection over a time window. Immutable once constructed:
/// either decoded from an inbound payload or synthesized locally. Invariants
/// are checked in [`AnomalyEvent::new`], which deserialization also goes through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAnomalyEvent", into = "RawAnomalyEvent")]
pub struct AnomalyEvent {
    window_start: i64,
    window_end: i64,
    reconstruction_error: f64,
    dominant_feature: String,
    message: String,
}

impl AnomalyEvent {
    /// Builds a validated event.
    ///
    /// # Errors
    /// Returns `FeedError::Decode` when `window_end < window_start`, the
    /// reconstruction error is negative or not finite, or either string is empty.
    pub fn new(
        window_start: i64,
        window_end: i64,
        reconstruction_error: f64,
        dominant_feature: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, FeedError> {
        let dominant_feature = dominant_feature.into();
        let message = message.into();

        if window_end < window_start {
            return Err(FeedError::Decode(format!(
                "window end {} precedes window start {}",
                window_end, window_start
            )));
        }
        if !reconstruction_error.is_finite() || reconstruction_error < 0.0 {
            return Err(FeedError::Decode(format!(
                "reconstruction error must be a non-negative number, got {}",
                reconstruction_error
            )));
        }
        if dominant_feature.trim().is_empty() {
            return Err(FeedError::Decode("most_anomalous_feature is empty".to_string()));
        }
        if message.trim().is_empty() {
            return Err(FeedError::Decode("message is empty".to_string()));
        }

        Ok(Self {
            window_start,
            window_end,
            reconstruction_error,
            dominant_feature,
            message,
        })
    }

    /// Start of the detection window, Unix seconds.
    pub fn window_start(&self) -> i64 {
        self.window_start
    }

    /// End of the detection window, Unix seconds.
    pub fn window_end(&self) -> i64 {
        self.window_end
    }

    /// Autoencoder reconstruction error for the window.
    pub fn reconstruction_error(&self) -> f64 {
        self.reconstruction_error
    }

    /// The feature that contributed most to the anomaly.
    pub fn dominant_feature(&self) -> &str {
        &self.dominant_feature
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Wire shape of an anomaly payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAnomalyEvent {
    timestamp_start: i64,
    timestamp_end: i64,
    reconstruction_error: f64,
    most_anomalous_feature: String,
    message: String,
}

impl TryFrom<RawAnomalyEvent> for AnomalyEvent {
    type Error = FeedError;

    fn try_from(raw: RawAnomalyEvent) -> Result<Self, Self::Error> {
        AnomalyEvent::new(
            raw.timestamp_start,
            raw.timestamp_end,
            raw.reconstruction_error,
            raw.most_anomalous_feature,
            raw.message,
        )
    }
}

impl From<AnomalyEvent> for RawAnomalyEvent {
    fn from(event: AnomalyEvent) -> Self {
        Self {
            timestamp_start: event.window_start,
            timestamp_end: event.window_end,
            reconstruction_error: event.reconstruction_error,
            most_anomalous_feature: event.dominant_feature,
            message: event.message,
        }
    }
}

/// A single forecast sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Unix seconds.
    pub timestamp: i64,
    /// Predicted power draw.
    pub power: f64,
}

/// # Forecast Result
///
/// Chronological forecast samples, exactly as the server returned them.
/// Duplicate timestamps are not removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// The forecast samples.
    pub forecast: Vec<ForecastPoint>,
}

/// # Forecast Request
///
/// Query parameters for a forecast. Absent fields are left out of the
/// outbound query entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForecastRequest {
    /// First forecast timestamp, Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<i64>,
    /// Forecast horizon in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizon: Option<u64>,
}

impl ForecastRequest {
    /// A request with both fields set.
    pub fn new(starts_at: i64, horizon: u64) -> Self {
        Self {
            starts_at: Some(starts_at),
            horizon: Some(horizon),
        }
    }

    /// The `(name, value)` pairs to append to the query string, present fields only.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(starts_at) = self.starts_at {
            pairs.push(("starts_at", starts_at.to_string()));
        }
        if let Some(horizon) = self.horizon {
            pairs.push(("horizon", horizon.to_string()));
        }
        pairs
    }
}

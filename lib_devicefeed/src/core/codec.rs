//! # Event Envelope Codec
//!
//! Turns raw inbound frames into validated `AnomalyEvent`s. A failure here is
//! always a `FeedError::Decode`; the caller logs it and drops the frame.

use crate::core::errors::FeedError;
use crate::core::model::AnomalyEvent;

/// Decodes a text frame.
///
/// # Errors
/// `FeedError::Decode` if the payload is not JSON, misses a required field,
/// or violates an `AnomalyEvent` invariant.
pub fn decode(raw: &str) -> Result<AnomalyEvent, FeedError> {
    serde_json::from_str::<AnomalyEvent>(raw).map_err(|e| FeedError::Decode(e.to_string()))
}

/// Decodes a binary frame carrying UTF-8 JSON.
pub fn decode_bytes(raw: &[u8]) -> Result<AnomalyEvent, FeedError> {
    serde_json::from_slice::<AnomalyEvent>(raw).map_err(|e| FeedError::Decode(e.to_string()))
}

/// Serializes an event back into its wire form.
pub fn encode(event: &AnomalyEvent) -> Result<String, FeedError> {
    serde_json::to_string(event).map_err(|e| FeedError::Decode(e.to_string()))
}

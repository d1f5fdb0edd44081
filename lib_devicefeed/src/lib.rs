//! # lib_devicefeed
//!
//! Client-side plumbing for device telemetry: a reconnecting WebSocket
//! subscriber for anomaly detections and an on-demand power forecast fetcher.
//! Both degrade to locally synthesized data in development builds when the
//! remote side cannot be reached.
//!
//! Modules are gated by cargo features (`configs`, `stream`, `forecast`, `full`).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Runtime configuration: stream and forecast settings, runtime mode.
#[cfg(feature = "configs")]
pub mod configs;

/// Shared building blocks: errors, data model, codec, window, state machine, clock.
#[cfg(any(feature = "stream", feature = "forecast"))]
pub mod core;

/// Long-lived stream clients and the synthetic event generator.
#[cfg(feature = "stream")]
pub mod ingestors;

/// HTTP retrieval: generic API client and the forecast fetch controller.
#[cfg(feature = "forecast")]
pub mod retrieve;

// --- Public API Re-exports ---
#[cfg(feature = "configs")]
pub use configs::{FallbackPolicy, ForecastConfig, RuntimeMode, StreamConfig};
#[cfg(any(feature = "stream", feature = "forecast"))]
pub use core::{ErrorInfo, ErrorKind, FeedError};
#[cfg(feature = "stream")]
pub use ingestors::{AnomalyStreamSubscriber, StreamView};
#[cfg(feature = "forecast")]
pub use retrieve::{ForecastController, FetchView};

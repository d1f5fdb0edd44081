//! # Data Ingestors Module
//!
//! Long-lived clients that pull device data into the process.
//!
//! ## Contained Modules:
//! - **`anomaly_wss`**: the reconnecting WebSocket subscriber for a device's
//!   anomaly topic, with its pluggable transport.
//! - **`synthetic`**: the development-only generator that stands in for the
//!   broker when the endpoint cannot even be constructed.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The reconnecting anomaly stream subscriber.
pub mod anomaly_wss;
/// Random anomaly events for development builds.
pub mod synthetic;

// --- Public API Re-exports ---
pub use anomaly_wss::{
    build_endpoint, AnomalyStreamSubscriber, Frame, FrameStream, StreamTransport, StreamView, WsTransport,
};
pub use synthetic::SyntheticAnomalyGenerator;

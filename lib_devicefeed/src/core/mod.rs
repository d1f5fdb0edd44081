//! # Core Module
//!
//! The leaf components shared by the stream subscriber and the forecast
//! controller. Nothing in here performs I/O; everything is deterministic given
//! its inputs, which keeps the lifecycle code in `ingestors` and `retrieve`
//! testable without a network.
//!
//! ## Core Components:
//!
//! - **`errors`**: the `FeedError` taxonomy and its renderable `ErrorInfo` form.
//! - **`model`**: `AnomalyEvent` and the forecast request/result types.
//! - **`codec`**: decodes raw inbound payloads into `AnomalyEvent`.
//! - **`window`**: the bounded, newest-first recent-event container.
//! - **`connection`**: the subscriber's connection state machine as a pure
//!   transition function.
//! - **`clock`**: wall-clock injection for timestamps of synthesized data.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Error taxonomy for stream and fetch failures.
pub mod errors;
/// Domain records exchanged with the remote services.
pub mod model;
/// Wall-clock abstraction.
pub mod clock;
/// Inbound payload decoding.
#[cfg(feature = "stream")]
pub mod codec;
/// Bounded most-recent-K event container.
#[cfg(feature = "stream")]
pub mod window;
/// Connection lifecycle state machine.
#[cfg(feature = "stream")]
pub mod connection;

// --- Public API Re-exports ---
pub use errors::{ErrorInfo, ErrorKind, FeedError};
pub use model::{AnomalyEvent, ForecastPoint, ForecastRequest, ForecastResult};
pub use clock::{system_clock, Clock, SharedClock, SystemClock};
#[cfg(feature = "stream")]
pub use window::RecentEventWindow;
#[cfg(feature = "stream")]
pub use connection::{ConnectionEvent, ConnectionState, Effect, Lifecycle};

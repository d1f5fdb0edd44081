//! # Data Retrieval Module
//!
//! Request/response access to the forecast server.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, featuring optional retries with exponential
//!   backoff and non-throwing handling of error statuses.
//! - **`forecast`**: The `ForecastController`, which tracks the latest
//!   parameters, in-flight state and errors of forecast requests.
//! - **`synthetic`**: The placeholder forecast served in development builds
//!   when the server cannot be reached.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client with retry middleware.
pub mod ky_http;
/// The parameterized forecast fetch controller.
pub mod forecast;
/// Synthetic forecast fallback.
pub mod synthetic;

// --- Public API Re-exports ---
pub use forecast::{FetchView, ForecastController, ForecastSource, HttpForecastSource};
pub use ky_http::{ApiClient, ApiResponse};
pub use synthetic::synthesize_forecast;

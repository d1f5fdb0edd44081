//! # Configuration Modules
//!
//! Typed settings for the stream subscriber and the forecast controller,
//! plus the runtime mode that decides whether synthetic fallbacks may run.

// // Statements: Exporting sub-modules to make them accessible via lib_devicefeed::configs
/// Stream, forecast and runtime-mode settings.
pub mod feed_config;

pub use feed_config::{FallbackPolicy, ForecastConfig, RuntimeMode, StreamConfig};

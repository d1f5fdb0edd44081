//! # Feed Configuration
//!
//! Settings are plain serde structs with millisecond/second integer fields so
//! they can be merged from JSON files, environment variables and CLI flags by
//! the binaries. Every field has a default matching the production services.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Placeholder substituted with the device identifier in `endpoint_template`.
pub const DEVICE_ID_PLACEHOLDER: &str = "{device_id}";

/// Whether the process runs as a production deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Real data only; synthetic fallbacks never activate.
    #[default]
    Production,
    /// Synthetic fallbacks stand in for unreachable remotes.
    Development,
}

impl RuntimeMode {
    /// The fallback strategy this mode allows.
    pub fn fallback_policy(self) -> FallbackPolicy {
        match self {
            RuntimeMode::Production => FallbackPolicy::Disabled,
            RuntimeMode::Development => FallbackPolicy::Synthetic,
        }
    }
}

impl FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(RuntimeMode::Production),
            "development" | "dev" => Ok(RuntimeMode::Development),
            other => Err(format!("unknown runtime mode '{}'", other)),
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeMode::Production => write!(f, "production"),
            RuntimeMode::Development => write!(f, "development"),
        }
    }
}

/// What to do when the remote source is unreachable. Selected once at
/// construction and injected into the subscriber and the fetch controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Surface the failure and nothing else.
    Disabled,
    /// Surface the failure and fill in locally synthesized data.
    Synthetic,
}

impl FallbackPolicy {
    /// True when synthetic data may be produced.
    pub fn is_synthetic(self) -> bool {
        matches!(self, FallbackPolicy::Synthetic)
    }
}

impl From<RuntimeMode> for FallbackPolicy {
    fn from(mode: RuntimeMode) -> Self {
        mode.fallback_policy()
    }
}

/// Settings for the anomaly stream subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamConfig {
    /// WebSocket endpoint, `{device_id}` is replaced with the target.
    pub endpoint_template: String,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay_ms: u64,
    /// Period of the synthetic generator tick.
    pub synthetic_interval_ms: u64,
    /// Chance that a synthetic tick produces an event.
    pub synthetic_probability: f64,
    /// Number of recent events kept.
    pub window_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint_template: format!("ws://broker.emqx.io:8083/{}/anomalies", DEVICE_ID_PLACEHOLDER),
            reconnect_delay_ms: 5_000,
            synthetic_interval_ms: 10_000,
            synthetic_probability: 0.3,
            window_capacity: 10,
        }
    }
}

impl StreamConfig {
    /// Reconnect delay as a `Duration`. Never zero.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.max(1))
    }

    /// Synthetic tick period as a `Duration`. Never zero.
    pub fn synthetic_interval(&self) -> Duration {
        Duration::from_millis(self.synthetic_interval_ms.max(1))
    }

    /// The endpoint string for one target, before URL validation.
    pub fn endpoint_for(&self, target: &str) -> String {
        self.endpoint_template.replace(DEVICE_ID_PLACEHOLDER, target)
    }
}

/// Settings for the forecast fetch controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForecastConfig {
    /// Base URL of the forecast server.
    pub server_base_url: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Retries for transient failures. Zero issues exactly one request.
    pub max_retries: u32,
    /// Number of points in a synthetic forecast.
    pub synthetic_points: usize,
    /// Spacing between synthetic points, seconds.
    pub synthetic_spacing_secs: i64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            server_base_url: "https://AZURE_SERVER".to_string(),
            request_timeout_secs: 10,
            max_retries: 0,
            synthetic_points: 12,
            synthetic_spacing_secs: 300,
        }
    }
}

impl ForecastConfig {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Rejects settings that make every request time out at once or give
    /// synthetic forecasts non-increasing timestamps.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("requestTimeoutSecs must be at least 1".to_string());
        }
        if self.synthetic_spacing_secs <= 0 {
            return Err(format!(
                "syntheticSpacingSecs must be positive, got {}",
                self.synthetic_spacing_secs
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_mode_parses_aliases() {
        assert_eq!("dev".parse::<RuntimeMode>(), Ok(RuntimeMode::Development));
        assert_eq!(" Production ".parse::<RuntimeMode>(), Ok(RuntimeMode::Production));
        assert!("staging".parse::<RuntimeMode>().is_err());
        assert_eq!(RuntimeMode::default(), RuntimeMode::Production);
    }

    #[test]
    fn only_development_enables_synthetic_fallback() {
        assert!(FallbackPolicy::from(RuntimeMode::Development).is_synthetic());
        assert!(!FallbackPolicy::from(RuntimeMode::Production).is_synthetic());
    }

    #[test]
    fn endpoint_template_substitutes_device() {
        let config = StreamConfig::default();
        assert_eq!(config.endpoint_for("device-42"), "ws://broker.emqx.io:8083/device-42/anomalies");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.synthetic_interval(), Duration::from_secs(10));
    }

    #[test]
    fn zero_reconnect_delay_is_clamped() {
        let config = StreamConfig {
            reconnect_delay_ms: 0,
            ..StreamConfig::default()
        };
        assert_eq!(config.reconnect_delay(), Duration::from_millis(1));
    }

    #[test]
    fn forecast_config_rejects_zero_timeout_and_non_positive_spacing() {
        assert!(ForecastConfig::default().validate().is_ok());

        let zero_timeout = ForecastConfig {
            request_timeout_secs: 0,
            ..ForecastConfig::default()
        };
        assert!(zero_timeout.validate().is_err());

        for spacing in [0, -300] {
            let config = ForecastConfig {
                synthetic_spacing_secs: spacing,
                ..ForecastConfig::default()
            };
            assert!(config.validate().is_err(), "spacing {} accepted", spacing);
        }
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: StreamConfig = serde_json::from_str(r#"{"reconnectDelayMs": 250}"#).unwrap();
        assert_eq!(config.reconnect_delay_ms, 250);
        assert_eq!(config.window_capacity, 10);
    }
}

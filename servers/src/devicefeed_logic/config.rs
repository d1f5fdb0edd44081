use anyhow::{Context, Result};
use clap::Parser;
use lib_devicefeed::configs::{ForecastConfig, RuntimeMode, StreamConfig};
use lib_devicefeed::core::ForecastRequest;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Device anomaly stream and power forecast monitor", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "DEVICEFEED_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "DEVICEFEED_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "DEVICEFEED_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "DEVICEFEED_DEVICE_ID", help = "Device whose anomalies and forecast are followed.")]
    pub device_id: Option<String>,

    #[clap(long, env = "DEVICEFEED_RUNTIME_MODE", help = "production or development. Development enables synthetic fallbacks.")]
    pub runtime_mode: Option<String>,

    #[clap(long, env = "DEVICEFEED_STREAM_URL", help = "Anomaly WebSocket endpoint, {device_id} is substituted.")]
    pub stream_url: Option<String>,

    #[clap(long, env = "DEVICEFEED_RECONNECT_DELAY_MS", help = "Fixed delay in milliseconds before each stream reconnect attempt.")]
    pub reconnect_delay_ms: Option<u64>,

    #[clap(long, env = "DEVICEFEED_SYNTHETIC_INTERVAL_MS", help = "Tick period in milliseconds of the synthetic anomaly generator.")]
    pub synthetic_interval_ms: Option<u64>,

    #[clap(long, env = "DEVICEFEED_SYNTHETIC_PROBABILITY", help = "Chance that a synthetic tick produces an anomaly.")]
    pub synthetic_probability: Option<f64>,

    #[clap(long, env = "DEVICEFEED_WINDOW_CAPACITY", help = "Number of recent anomalies kept.")]
    pub window_capacity: Option<usize>,

    #[clap(long, env = "DEVICEFEED_FORECAST_URL", help = "Base URL of the forecast server.")]
    pub forecast_url: Option<String>,

    #[clap(long, env = "DEVICEFEED_REQUEST_TIMEOUT_SECONDS", help = "Forecast request timeout in seconds.")]
    pub request_timeout_seconds: Option<u64>,

    #[clap(long, env = "DEVICEFEED_MAX_RETRIES", help = "Retries for transient forecast request failures.")]
    pub max_retries: Option<u32>,

    #[clap(long, env = "DEVICEFEED_STARTS_AT", help = "Forecast start, Unix seconds.")]
    pub starts_at: Option<i64>,

    #[clap(long, env = "DEVICEFEED_HORIZON", help = "Forecast horizon in seconds.")]
    pub horizon: Option<u64>,

    #[clap(long, env = "DEVICEFEED_FORECAST_REFRESH_SECONDS", help = "Interval in seconds between forecast refreshes.")]
    pub forecast_refresh_seconds: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            device_id: other.device_id.or(self.device_id),
            runtime_mode: other.runtime_mode.or(self.runtime_mode),
            stream_url: other.stream_url.or(self.stream_url),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            synthetic_interval_ms: other.synthetic_interval_ms.or(self.synthetic_interval_ms),
            synthetic_probability: other.synthetic_probability.or(self.synthetic_probability),
            window_capacity: other.window_capacity.or(self.window_capacity),
            forecast_url: other.forecast_url.or(self.forecast_url),
            request_timeout_seconds: other.request_timeout_seconds.or(self.request_timeout_seconds),
            max_retries: other.max_retries.or(self.max_retries),
            starts_at: other.starts_at.or(self.starts_at),
            horizon: other.horizon.or(self.horizon),
            forecast_refresh_seconds: other.forecast_refresh_seconds.or(self.forecast_refresh_seconds),
        }
    }

    fn defaults() -> Config {
        let stream = StreamConfig::default();
        let forecast = ForecastConfig::default();
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            runtime_mode: Some(RuntimeMode::default().to_string()),
            stream_url: Some(stream.endpoint_template),
            reconnect_delay_ms: Some(stream.reconnect_delay_ms),
            synthetic_interval_ms: Some(stream.synthetic_interval_ms),
            synthetic_probability: Some(stream.synthetic_probability),
            window_capacity: Some(stream.window_capacity),
            forecast_url: Some(forecast.server_base_url),
            request_timeout_seconds: Some(forecast.request_timeout_secs),
            max_retries: Some(forecast.max_retries),
            forecast_refresh_seconds: Some(300),
            ..Default::default()
        }
    }

    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_deref().unwrap_or(Path::new("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// The trimmed device id, rejecting blanks.
    pub fn device_id(&self) -> Result<&str> {
        self.device_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .context("No device id configured (--device-id or DEVICEFEED_DEVICE_ID).")
    }

    pub fn runtime_mode(&self) -> Result<RuntimeMode> {
        match self.runtime_mode.as_deref() {
            None => Ok(RuntimeMode::default()),
            Some(raw) => raw.parse::<RuntimeMode>().map_err(anyhow::Error::msg),
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        let defaults = StreamConfig::default();
        StreamConfig {
            endpoint_template: self.stream_url.clone().unwrap_or(defaults.endpoint_template),
            reconnect_delay_ms: self.reconnect_delay_ms.unwrap_or(defaults.reconnect_delay_ms),
            synthetic_interval_ms: self.synthetic_interval_ms.unwrap_or(defaults.synthetic_interval_ms),
            synthetic_probability: self.synthetic_probability.unwrap_or(defaults.synthetic_probability),
            window_capacity: self.window_capacity.unwrap_or(defaults.window_capacity),
        }
    }

    pub fn forecast_config(&self) -> ForecastConfig {
        let defaults = ForecastConfig::default();
        ForecastConfig {
            server_base_url: self.forecast_url.clone().unwrap_or(defaults.server_base_url),
            request_timeout_secs: self.request_timeout_seconds.unwrap_or(defaults.request_timeout_secs),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            ..defaults
        }
    }

    /// Initial forecast parameters, `None` when neither is configured.
    pub fn forecast_request(&self) -> Option<ForecastRequest> {
        match (self.starts_at, self.horizon) {
            (None, None) => None,
            (starts_at, horizon) => Some(ForecastRequest { starts_at, horizon }),
        }
    }

    pub fn forecast_refresh_seconds(&self) -> u64 {
        self.forecast_refresh_seconds.unwrap_or(300).max(1)
    }
}

pub fn load_config() -> Config {
    // clap::Parser handles both env vars and CLI args
    resolve(Config::parse())
}

/// Layers defaults, then the JSON config file, then env/CLI values.
fn resolve(cli_args: Config) -> Config {
    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from config file (server_devicefeed.conf) if present.
    //    Allow overriding default config file path with CLI arg.
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_devicefeed.conf"));

    if config_file_path.exists() {
        if let Ok(config_str) = fs::read_to_string(&config_file_path) {
            if let Ok(file_config) = serde_json::from_str::<Config>(&config_str) {
                current_config = current_config.merge(file_config);
            } else {
                log::warn!("Failed to parse config file: {}. Falling back to other sources.", config_file_path.display());
            }
        } else {
            log::warn!("Failed to read config file: {}. Falling back to other sources.", config_file_path.display());
        }
    } else {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", config_file_path.display());
    }

    // 3. Override with environment variables and CLI arguments
    current_config.merge(cli_args)
}

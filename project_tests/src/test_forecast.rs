//! # Forecast Live Test
//!
//! Requests a forecast from the configured server and prints the
//! controller's view afterwards.

use clap::Parser;
use lib_devicefeed::configs::{ForecastConfig, RuntimeMode};
use lib_devicefeed::core::ForecastRequest;
use lib_devicefeed::ForecastController;

#[derive(Parser, Debug)]
#[clap(about = "Live check of the forecast controller")]
struct Args {
    /// Device whose forecast is requested.
    #[clap(long, default_value = "device-7")]
    device_id: String,

    /// Base URL of the forecast server.
    #[clap(long, env = "DEVICEFEED_FORECAST_URL")]
    forecast_url: Option<String>,

    /// Forecast start, Unix seconds.
    #[clap(long)]
    starts_at: Option<i64>,

    /// Forecast horizon in seconds.
    #[clap(long)]
    horizon: Option<u64>,

    /// production or development.
    #[clap(long, default_value = "development")]
    mode: RuntimeMode,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut config = ForecastConfig::default();
    if let Some(url) = args.forecast_url {
        config.server_base_url = url;
    }

    let controller = ForecastController::new(config, args.mode.fallback_policy())?;
    controller.set_target(Some(args.device_id.as_str()));

    let request = ForecastRequest {
        starts_at: args.starts_at,
        horizon: args.horizon,
    };
    println!("[*] Requesting forecast for '{}' with {:?}...", args.device_id, request);

    if let Err(e) = controller.fetch(Some(request)).await {
        eprintln!("\n[ERROR] Forecast retrieval failed:");
        eprintln!(">>> {}", e);
    }

    let view = controller.view();
    println!("-----------------------------------------------");
    println!("synthetic: {}", view.synthetic);
    if let Some(result) = &view.last_result {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    println!("-----------------------------------------------");

    if view.last_result.is_none() {
        std::process::exit(1);
    }
    Ok(())
}

//! # Anomaly Stream Live Test
//!
//! Subscribes to a device's anomaly topic on the real broker through
//! lib_devicefeed and prints every view change for a fixed duration.

use clap::Parser;
use lib_devicefeed::configs::{RuntimeMode, StreamConfig};
use lib_devicefeed::AnomalyStreamSubscriber;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(about = "Live check of the anomaly stream subscriber")]
struct Args {
    /// Device whose anomalies are followed.
    #[clap(long, default_value = "device-42")]
    device_id: String,

    /// How long to listen, in seconds.
    #[clap(long, default_value_t = 60)]
    seconds: u64,

    /// production or development.
    #[clap(long, default_value = "production")]
    mode: RuntimeMode,

    /// Override of the WebSocket endpoint template.
    #[clap(long)]
    stream_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut config = StreamConfig::default();
    if let Some(url) = args.stream_url {
        config.endpoint_template = url;
    }

    // // Statement: One subscriber, observed through its watch channel
    let subscriber = AnomalyStreamSubscriber::new(config, args.mode.fallback_policy());
    let mut view = subscriber.subscribe_view();
    subscriber.start(&args.device_id);

    println!("[*] Listening to '{}' for {}s ({} mode)...", args.device_id, args.seconds, args.mode);

    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                println!(
                    "[{:?}{}] events={} error={}",
                    current.connection_state,
                    if current.synthetic { ", synthetic" } else { "" },
                    current.recent_events.len(),
                    current.last_error.map(|e| e.to_string()).unwrap_or_else(|| "-".to_string()),
                );
                if let Some(latest) = current.recent_events.first() {
                    println!("    latest: {}", serde_json::to_string(latest)?);
                }
            }
        }
    }

    subscriber.stop();
    println!("\n[SUCCESS] Collected {} events.", subscriber.snapshot().len());
    Ok(())
}

use anyhow::Result;
use lib_devicefeed::{AnomalyStreamSubscriber, ForecastController};
use std::time::Duration;
use tokio::signal;

mod devicefeed_logic;
use devicefeed_logic::{config, logger, monitor};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let config = config::load_config();
    logger::setup_logging(config.log_dir(), config.log_level())?;

    let device_id = config.device_id()?.to_string();
    let mode = config.runtime_mode()?;
    let fallback = mode.fallback_policy();
    log::info!("Following device '{}' in {} mode.", device_id, mode);

    let subscriber = AnomalyStreamSubscriber::new(config.stream_config(), fallback);
    let controller = ForecastController::new(config.forecast_config(), fallback)?;
    controller.set_target(Some(device_id.as_str()));
    subscriber.start(&device_id);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let monitor_handle = tokio::spawn(monitor::run(
        subscriber.subscribe_view(),
        controller.subscribe_view(),
        shutdown_tx.subscribe(),
    ));

    let refresh_handle = tokio::spawn(monitor::run_forecast_refresh(
        controller.clone(),
        config.forecast_request(),
        Duration::from_secs(config.forecast_refresh_seconds()),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());
    subscriber.stop();

    // Wait for components to shut down
    let _ = tokio::try_join!(monitor_handle, refresh_handle);

    log::info!("Shutdown complete.");
    Ok(())
}

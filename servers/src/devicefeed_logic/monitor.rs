use lib_devicefeed::core::ForecastRequest;
use lib_devicefeed::{FetchView, ForecastController, StreamView};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::interval;

/// Logs every meaningful change of the stream and forecast views until shutdown.
pub async fn run(
    mut stream: watch::Receiver<StreamView>,
    mut forecast: watch::Receiver<FetchView>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut last_stream = stream.borrow_and_update().clone();
    let mut last_forecast = forecast.borrow_and_update().clone();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Monitor service received shutdown signal.");
                break;
            }
            changed = stream.changed() => {
                if changed.is_err() {
                    log::warn!("Stream view closed, monitor stopping.");
                    break;
                }
                let next = stream.borrow_and_update().clone();
                for line in describe_stream_change(&last_stream, &next) {
                    log::info!("{}", line);
                }
                last_stream = next;
            }
            changed = forecast.changed() => {
                if changed.is_err() {
                    log::warn!("Forecast view closed, monitor stopping.");
                    break;
                }
                let next = forecast.borrow_and_update().clone();
                for line in describe_forecast_change(&last_forecast, &next) {
                    log::info!("{}", line);
                }
                last_forecast = next;
            }
        }
    }
}

/// Periodically refreshes the forecast. The first tick fires immediately
/// with `initial`; later ticks repeat the remembered parameters.
pub async fn run_forecast_refresh(
    controller: ForecastController,
    initial: Option<ForecastRequest>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut check_interval = interval(period);
    let mut params = initial;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Forecast refresh received shutdown signal.");
                break;
            }
            _ = check_interval.tick() => {
                tokio::select! {
                    _ = shutdown.recv() => {
                        log::info!("Forecast refresh received shutdown signal.");
                        break;
                    }
                    outcome = controller.fetch(params.take()) => {
                        if let Err(e) = outcome {
                            log::warn!("Forecast refresh failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}

fn describe_stream_change(prev: &StreamView, next: &StreamView) -> Vec<String> {
    let mut lines = Vec::new();
    if prev.connection_state != next.connection_state || prev.synthetic != next.synthetic {
        lines.push(format!(
            "Stream {:?}{}",
            next.connection_state,
            if next.synthetic { " (synthetic)" } else { "" }
        ));
    }
    if prev.last_error != next.last_error {
        if let Some(error) = &next.last_error {
            lines.push(format!("Stream error [{:?}]: {}", error.kind, error));
        }
    }
    if prev.recent_events.first() != next.recent_events.first() {
        if let Some(event) = next.recent_events.first() {
            lines.push(format!(
                "Anomaly {}..{} error={:.4} feature={}: {}",
                event.window_start(),
                event.window_end(),
                event.reconstruction_error(),
                event.dominant_feature(),
                event.message()
            ));
        }
    }
    lines
}

fn describe_forecast_change(prev: &FetchView, next: &FetchView) -> Vec<String> {
    let mut lines = Vec::new();
    if prev.last_error != next.last_error {
        if let Some(error) = &next.last_error {
            lines.push(format!("Forecast error [{:?}]: {}", error.kind, error));
        }
    }
    if prev.last_result != next.last_result {
        if let Some(result) = &next.last_result {
            let peak = result.forecast.iter().map(|p| p.power).fold(f64::NAN, f64::max);
            lines.push(format!(
                "Forecast{}: {} points, peak {:.1}",
                if next.synthetic { " (synthetic)" } else { "" },
                result.forecast.len(),
                peak
            ));
        }
    }
    lines
}

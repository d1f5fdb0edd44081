//! # Forecast Fetch Tests
//!
//! Exercises `ForecastController` over real HTTP against a mock server that
//! answers a fixed number of connections on a random local port.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use lib_devicefeed::configs::{FallbackPolicy, ForecastConfig};
use lib_devicefeed::core::{ErrorKind, FeedError, ForecastPoint, ForecastRequest};
use lib_devicefeed::retrieve::ForecastController;

/// Serves one canned response per connection and returns the request lines.
fn mock_server(responses: Vec<(u16, String)>) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    let port = listener.local_addr().unwrap().port();
    let base_url = format!("http://127.0.0.1:{}", port);

    let handle = thread::spawn(move || {
        let mut request_lines = Vec::new();
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };

            // Read until the end of the request headers
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => raw.extend_from_slice(&buf[..n]),
                }
            }
            let text = String::from_utf8_lossy(&raw);
            request_lines.push(text.lines().next().unwrap_or_default().to_string());

            let response = format!(
                "HTTP/1.1 {} Mock\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
        }
        request_lines
    });

    (base_url, handle)
}

fn controller(base_url: &str, fallback: FallbackPolicy) -> ForecastController {
    let config = ForecastConfig {
        server_base_url: base_url.to_string(),
        request_timeout_secs: 5,
        ..ForecastConfig::default()
    };
    ForecastController::new(config, fallback).expect("valid base url")
}

#[tokio::test]
async fn fetch_returns_server_forecast_and_sends_params() {
    let body = r#"{"forecast":[{"timestamp":1700000000,"power":75.2}]}"#.to_string();
    let (base_url, server) = mock_server(vec![(200, body)]);
    let ctl = controller(&base_url, FallbackPolicy::Disabled);
    ctl.set_target(Some("device-7"));

    let result = ctl.fetch(Some(ForecastRequest::new(1_700_000_000, 3600))).await.unwrap();
    let lines = server.join().unwrap();

    let expected = vec![ForecastPoint {
        timestamp: 1_700_000_000,
        power: 75.2,
    }];
    assert_eq!(result.forecast, expected);

    let view = ctl.view();
    assert_eq!(view.last_result.map(|r| r.forecast), Some(expected));
    assert_eq!(view.last_error, None);
    assert!(!view.in_flight);
    assert!(!view.synthetic);
    assert_eq!(lines, vec!["GET /forecast/device-7?starts_at=1700000000&horizon=3600 HTTP/1.1".to_string()]);
}

#[tokio::test]
async fn refetch_reuses_params_and_absent_fields_are_omitted() {
    let body = r#"{"forecast":[]}"#.to_string();
    let (base_url, server) = mock_server(vec![(200, body.clone()), (200, body.clone()), (200, body)]);
    let ctl = controller(&base_url, FallbackPolicy::Disabled);
    ctl.set_target(Some("device-7"));

    ctl.fetch(Some(ForecastRequest {
        starts_at: None,
        horizon: Some(900),
    }))
    .await
    .unwrap();
    ctl.refetch().await.unwrap();
    ctl.fetch(Some(ForecastRequest::default())).await.unwrap();

    let lines = server.join().unwrap();
    assert_eq!(
        lines,
        vec![
            "GET /forecast/device-7?horizon=900 HTTP/1.1".to_string(),
            "GET /forecast/device-7?horizon=900 HTTP/1.1".to_string(),
            "GET /forecast/device-7 HTTP/1.1".to_string(),
        ]
    );
}

#[tokio::test]
async fn error_status_is_reported_with_code() {
    let (base_url, server) = mock_server(vec![(500, r#"{"detail":"model offline"}"#.to_string())]);
    let ctl = controller(&base_url, FallbackPolicy::Disabled);
    ctl.set_target(Some("device-7"));

    let err = ctl.fetch(Some(ForecastRequest::new(1, 60))).await.unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, FeedError::Http { status: 500, .. }), "got {:?}", err);
    let view = ctl.view();
    assert_eq!(view.last_result, None);
    assert!(!view.in_flight);
    let error = view.last_error.expect("error recorded");
    assert_eq!(error.kind, ErrorKind::Http);
    assert_eq!(error.message, "HTTP error! status: 500");
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let (base_url, server) = mock_server(vec![(200, r#"{"points":[]}"#.to_string())]);
    let ctl = controller(&base_url, FallbackPolicy::Disabled);
    ctl.set_target(Some("device-7"));

    let err = ctl.refetch().await.unwrap_err();
    server.join().unwrap();
    assert!(matches!(err, FeedError::Decode(_)), "got {:?}", err);
}

#[tokio::test]
async fn unreachable_server_in_development_serves_synthetic_forecast() {
    // Bind then release a port so nothing listens on it.
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let ctl = controller(&format!("http://127.0.0.1:{}", port), FallbackPolicy::Synthetic);
    ctl.set_target(Some("device-7"));

    let err = ctl.fetch(Some(ForecastRequest::new(1_700_000_000, 3600))).await.unwrap_err();
    assert!(matches!(err, FeedError::Transport(_)), "got {:?}", err);

    let view = ctl.view();
    assert!(view.synthetic);
    assert!(!view.in_flight);
    assert_eq!(view.last_error.map(|e| e.kind), Some(ErrorKind::Transport));

    let forecast = view.last_result.expect("synthetic result").forecast;
    assert_eq!(forecast.len(), 12);
    assert_eq!(forecast[0].timestamp, 1_700_000_000);
    for pair in forecast.windows(2) {
        assert_eq!(pair[1].timestamp - pair[0].timestamp, 300);
    }
}

#[tokio::test]
async fn unreachable_server_in_production_leaves_result_empty() {
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let ctl = controller(&format!("http://127.0.0.1:{}", port), FallbackPolicy::Disabled);
    ctl.set_target(Some("device-7"));

    assert!(ctl.refetch().await.is_err());
    let view = ctl.view();
    assert_eq!(view.last_result, None);
    assert!(!view.synthetic);
    assert!(view.last_error.is_some());
}

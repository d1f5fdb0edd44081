//! # Anomaly WSS Subscriber
//!
//! Long-lived WebSocket subscriber for a device's anomaly topic.
//! Location: lib_devicefeed/src/ingestors/anomaly_wss.rs
//!
//! `start(target)` spawns one session task that owns the connection, the
//! reconnect timer, the synthetic interval and the recent-event window. The
//! task is the only writer of the window and of the observable view, so
//! messages are applied strictly in arrival order. `stop()` cancels the
//! session token and aborts the task, which drops the socket and every timer
//! on the spot; any publish racing with it is discarded because publishing
//! checks the token while holding the view lock.

use std::future::pending;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::configs::{FallbackPolicy, StreamConfig};
use crate::core::clock::{system_clock, SharedClock};
use crate::core::codec;
use crate::core::connection::{ConnectionEvent, ConnectionState, Effect, Lifecycle};
use crate::core::errors::{ErrorInfo, FeedError};
use crate::core::model::AnomalyEvent;
use crate::core::window::RecentEventWindow;
use crate::ingestors::synthetic::SyntheticAnomalyGenerator;

/// One inbound data frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

/// Stream of inbound frames for one open connection. Ends on clean close.
pub type FrameStream = BoxStream<'static, Result<Frame, FeedError>>;

/// Opens connections for the subscriber.
///
/// Returning `FeedError::Construction` means the attempt could not even be
/// initiated; any other error is treated as a transport failure.
pub trait StreamTransport: Send + Sync + 'static {
    /// Connects to `endpoint` and yields its frames.
    fn connect(&self, endpoint: Url) -> BoxFuture<'static, Result<FrameStream, FeedError>>;
}

/// The real WebSocket transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl StreamTransport for WsTransport {
    fn connect(&self, endpoint: Url) -> BoxFuture<'static, Result<FrameStream, FeedError>> {
        Box::pin(async move {
            let (ws_stream, _) = connect_async(endpoint.as_str()).await?;
            let (_write, read) = ws_stream.split();

            let frames = read.filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
                    Ok(Message::Binary(bin)) => Some(Ok(Frame::Binary(bin.to_vec()))),
                    Ok(Message::Close(frame)) => {
                        log::info!("WSS close frame received: {:?}", frame);
                        None
                    }
                    // Ping, pong and raw frames carry no events.
                    Ok(_) => None,
                    Err(e) => Some(Err(FeedError::from(e))),
                }
            });

            Ok(frames.boxed())
        })
    }
}

/// Validates the endpoint for one target.
///
/// # Errors
/// `FeedError::Construction` when the string is not a URL or not `ws`/`wss`.
pub fn build_endpoint(config: &StreamConfig, target: &str) -> Result<Url, FeedError> {
    let raw = config.endpoint_for(target);
    let url = Url::parse(&raw).map_err(|e| FeedError::Construction(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(FeedError::Construction(format!(
            "unsupported scheme '{}' in {}",
            other, raw
        ))),
    }
}

/// Read-only view of the subscription for observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamView {
    /// The active subscription target.
    pub target: Option<String>,
    /// Recent events, newest first.
    pub recent_events: Vec<AnomalyEvent>,
    /// Current connection state.
    pub connection_state: ConnectionState,
    /// Latest error, cleared on successful connect.
    pub last_error: Option<ErrorInfo>,
    /// True while events come from the synthetic generator.
    pub synthetic: bool,
}

struct Session {
    target: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// # Anomaly Stream Subscriber
///
/// Maintains one live subscription and exposes its state through a `watch`
/// channel. Dropping the subscriber stops it.
pub struct AnomalyStreamSubscriber {
    config: StreamConfig,
    fallback: FallbackPolicy,
    transport: Arc<dyn StreamTransport>,
    clock: SharedClock,
    seed: Option<u64>,
    view: Arc<watch::Sender<StreamView>>,
    session: Mutex<Option<Session>>,
}

impl AnomalyStreamSubscriber {
    /// Creates a subscriber using the real WebSocket transport.
    pub fn new(config: StreamConfig, fallback: FallbackPolicy) -> Self {
        Self::with_transport(config, fallback, Arc::new(WsTransport))
    }

    /// Creates a subscriber with a custom transport.
    pub fn with_transport(
        config: StreamConfig,
        fallback: FallbackPolicy,
        transport: Arc<dyn StreamTransport>,
    ) -> Self {
        let (view, _) = watch::channel(StreamView::default());
        Self {
            config,
            fallback,
            transport,
            clock: system_clock(),
            seed: None,
            view: Arc::new(view),
            session: Mutex::new(None),
        }
    }

    /// Replaces the wall clock used for synthetic timestamps.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Seeds the synthetic generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Begins the connection lifecycle for `target`.
    ///
    /// An empty target is ignored. A running session for any target is
    /// stopped first. Must be called from within a Tokio runtime.
    pub fn start(&self, target: &str) {
        let target = target.trim();
        if target.is_empty() {
            log::debug!("Ignoring start request with an empty target.");
            return;
        }

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = session.take() {
            Self::teardown(previous);
        }

        let cancel = CancellationToken::new();
        let target_owned = target.to_string();
        self.view.send_modify(|view| {
            *view = StreamView {
                target: Some(target_owned.clone()),
                ..StreamView::default()
            };
        });

        let driver = SessionDriver {
            target: target_owned.clone(),
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            seed: self.seed,
            publisher: Publisher {
                view: Arc::clone(&self.view),
                cancel: cancel.clone(),
            },
            lifecycle: Lifecycle::new(self.fallback),
            window: RecentEventWindow::new(self.config.window_capacity),
            connection: None,
            reconnect: None,
            synthetic: None,
        };

        log::info!("Starting anomaly subscription for '{}'", target);
        let handle = tokio::spawn(driver.run());
        *session = Some(Session {
            target: target_owned,
            cancel,
            handle,
        });
    }

    /// Tears the subscription down. Idempotent and safe from any state.
    pub fn stop(&self) {
        let previous = self.session.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(previous) = previous {
            log::info!("Stopping anomaly subscription for '{}'", previous.target);
            Self::teardown(previous);
        }

        self.view.send_if_modified(|view| {
            if view.connection_state == ConnectionState::Disconnected && !view.synthetic {
                return false;
            }
            view.connection_state = ConnectionState::Disconnected;
            view.synthetic = false;
            true
        });
    }

    fn teardown(session: Session) {
        session.cancel.cancel();
        session.handle.abort();
    }

    /// A receiver that observes every view change.
    pub fn subscribe_view(&self) -> watch::Receiver<StreamView> {
        self.view.subscribe()
    }

    /// Copy of the current view.
    pub fn view(&self) -> StreamView {
        self.view.borrow().clone()
    }

    /// Recent events, newest first.
    pub fn snapshot(&self) -> Vec<AnomalyEvent> {
        self.view.borrow().recent_events.clone()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.view.borrow().connection_state
    }

    /// Latest error, if any.
    pub fn last_error(&self) -> Option<ErrorInfo> {
        self.view.borrow().last_error.clone()
    }

    /// True while a session task is alive.
    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

impl Drop for AnomalyStreamSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Writes to the shared view on behalf of one session.
struct Publisher {
    view: Arc<watch::Sender<StreamView>>,
    cancel: CancellationToken,
}

impl Publisher {
    /// Applies `update` unless the session was cancelled. The check runs
    /// under the view lock, so nothing lands after `stop()` has published.
    fn publish(&self, update: impl FnOnce(&mut StreamView)) {
        let cancel = &self.cancel;
        self.view.send_if_modified(|view| {
            if cancel.is_cancelled() {
                return false;
            }
            update(view);
            true
        });
    }
}

/// The session task's state.
struct SessionDriver {
    target: String,
    config: StreamConfig,
    transport: Arc<dyn StreamTransport>,
    clock: SharedClock,
    seed: Option<u64>,
    publisher: Publisher,
    lifecycle: Lifecycle,
    window: RecentEventWindow,
    connection: Option<FrameStream>,
    reconnect: Option<Pin<Box<Sleep>>>,
    synthetic: Option<(Interval, SyntheticAnomalyGenerator)>,
}

impl SessionDriver {
    async fn run(mut self) {
        let cancel = self.publisher.cancel.clone();
        let mut next_event = Some(ConnectionEvent::Start);

        loop {
            if let Some(event) = next_event.take() {
                next_event = self.dispatch(event, &cancel).await;
                if next_event.is_some() {
                    continue;
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = wait_timer(&mut self.reconnect) => {
                    self.reconnect = None;
                    log::info!("Reconnect delay elapsed for '{}'", self.target);
                    next_event = Some(ConnectionEvent::ReconnectDue);
                }

                _ = wait_tick(&mut self.synthetic) => {
                    self.synthetic_tick();
                }

                frame = next_frame(&mut self.connection) => {
                    next_event = self.on_frame(frame);
                }
            }
        }

        // Releases the socket and timers when only the token was cancelled.
        self.dispatch(ConnectionEvent::Stop, &cancel).await;
        log::debug!("Session task for '{}' finished", self.target);
    }

    /// Applies one event and executes its effects. Returns the follow-up
    /// event produced by a connection attempt, if any.
    async fn dispatch(
        &mut self,
        event: ConnectionEvent,
        cancel: &CancellationToken,
    ) -> Option<ConnectionEvent> {
        let (lifecycle, effects) = self.lifecycle.apply(event);
        self.lifecycle = lifecycle;

        let state = lifecycle.state();
        let synthetic = lifecycle.is_synthetic();
        self.publisher.publish(|view| {
            view.connection_state = state;
            view.synthetic = synthetic;
        });

        let mut follow_up = None;
        for effect in effects {
            match effect {
                Effect::OpenConnection => {
                    follow_up = self.open_connection(cancel).await;
                }
                Effect::CloseConnection => {
                    if self.connection.take().is_some() {
                        log::info!("Closed anomaly connection for '{}'", self.target);
                    }
                }
                Effect::ScheduleReconnect => {
                    let delay = self.config.reconnect_delay();
                    log::info!("Reconnecting '{}' in {}ms", self.target, delay.as_millis());
                    // Replacing the slot drops any previously armed timer.
                    self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelReconnect => {
                    self.reconnect = None;
                }
                Effect::ActivateSynthetic => {
                    log::warn!(
                        "Anomaly stream for '{}' unavailable, generating synthetic events",
                        self.target
                    );
                    let period = self.config.synthetic_interval();
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    let generator =
                        SyntheticAnomalyGenerator::new(self.config.synthetic_probability, self.seed);
                    self.synthetic = Some((ticker, generator));
                }
                Effect::StopSynthetic => {
                    self.synthetic = None;
                }
                Effect::ClearError => {
                    self.publisher.publish(|view| view.last_error = None);
                }
                Effect::ReportError(info) => {
                    log::error!("Anomaly stream '{}': {}", self.target, info);
                    self.publisher.publish(|view| view.last_error = Some(info));
                }
            }
        }

        follow_up
    }

    async fn open_connection(&mut self, cancel: &CancellationToken) -> Option<ConnectionEvent> {
        let endpoint = match build_endpoint(&self.config, &self.target) {
            Ok(endpoint) => endpoint,
            Err(e) => return Some(ConnectionEvent::ConstructionFailed(e.to_string())),
        };

        log::info!("Connecting to anomaly stream: {}", endpoint);
        let attempt = self.transport.connect(endpoint);
        let outcome = tokio::select! {
            biased;
            // Teardown won the race, the attempt's result is irrelevant.
            _ = cancel.cancelled() => return None,
            outcome = attempt => outcome,
        };

        match outcome {
            Ok(stream) => {
                log::info!("Successfully connected anomaly stream for '{}'", self.target);
                self.connection = Some(stream);
                Some(ConnectionEvent::Opened)
            }
            Err(e @ FeedError::Construction(_)) => Some(ConnectionEvent::ConstructionFailed(e.to_string())),
            Err(e) => Some(ConnectionEvent::TransportFailed(e.to_string())),
        }
    }

    fn on_frame(&mut self, frame: Option<Result<Frame, FeedError>>) -> Option<ConnectionEvent> {
        match frame {
            Some(Ok(frame)) => {
                let decoded = match &frame {
                    Frame::Text(text) => {
                        log::trace!("Received text frame: {}", text);
                        codec::decode(text)
                    }
                    Frame::Binary(bin) => {
                        log::trace!("Received binary frame: {} bytes", bin.len());
                        codec::decode_bytes(bin)
                    }
                };
                match decoded {
                    Ok(event) => self.push_event(event),
                    Err(e) => log::warn!("Dropping malformed anomaly payload for '{}': {}", self.target, e),
                }
                None
            }
            Some(Err(e)) => {
                log::error!("WSS read error for '{}': {}", self.target, e);
                Some(ConnectionEvent::TransportFailed(e.to_string()))
            }
            None => {
                log::warn!("WSS stream for '{}' closed by remote host.", self.target);
                Some(ConnectionEvent::RemoteClosed)
            }
        }
    }

    fn synthetic_tick(&mut self) {
        let now = self.clock.now_unix();
        let produced = self.synthetic.as_mut().and_then(|(_, generator)| generator.tick(now));
        if let Some(event) = produced {
            log::debug!("Synthetic anomaly for '{}': {}", self.target, event.message());
            self.push_event(event);
        }
    }

    fn push_event(&mut self, event: AnomalyEvent) {
        self.window.push(event);
        let snapshot = self.window.snapshot();
        self.publisher.publish(|view| view.recent_events = snapshot);
    }
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn wait_tick(synthetic: &mut Option<(Interval, SyntheticAnomalyGenerator)>) {
    match synthetic {
        Some((ticker, _)) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

async fn next_frame(connection: &mut Option<FrameStream>) -> Option<Result<Frame, FeedError>> {
    match connection {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

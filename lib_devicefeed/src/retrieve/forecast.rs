//! # Power Forecast Controller
//!
//! On-demand, parameterized forecast retrieval with latest-parameter memory.
//!
//! ## Key Design Principles:
//! - **Last-write-wins**: every call takes a monotonic sequence token. A
//!   completion is applied only if no strictly later call has already been
//!   applied, so a slow stale response never overwrites a newer one.
//!   Overlapping calls are allowed; the superseded request is not cancelled.
//! - **Parameter memory**: the last supplied `ForecastRequest` persists, so
//!   `refetch()` repeats the previous query.
//! - **In-flight accounting**: an RAII guard keeps `in_flight` true for exactly
//!   as long as at least one call is running, on every exit path.
//! - **Degraded mode**: with the synthetic fallback policy a failed call still
//!   fills `last_result` with a placeholder forecast, while `last_error` keeps
//!   the real failure so the two are never confused.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::configs::{FallbackPolicy, ForecastConfig};
use crate::core::clock::{system_clock, SharedClock};
use crate::core::errors::{ErrorInfo, FeedError};
use crate::core::model::{ForecastRequest, ForecastResult};
use crate::retrieve::ky_http::ApiClient;
use crate::retrieve::synthetic::synthesize_forecast;

/// Where forecasts come from.
pub trait ForecastSource: Send + Sync + 'static {
    /// Retrieves the forecast for `device_id`.
    fn fetch_forecast(
        &self,
        device_id: &str,
        request: ForecastRequest,
    ) -> BoxFuture<'static, Result<ForecastResult, FeedError>>;
}

/// `GET <base>/forecast/<device_id>?starts_at=..&horizon=..` over HTTP.
#[derive(Clone)]
pub struct HttpForecastSource {
    client: Arc<ApiClient>,
}

impl HttpForecastSource {
    /// Builds the source from the forecast settings.
    ///
    /// # Errors
    /// `FeedError::Config` when the settings are out of range or the base URL is invalid.
    pub fn new(config: &ForecastConfig) -> Result<Self, FeedError> {
        config.validate().map_err(FeedError::Config)?;
        let client = ApiClient::new(&config.server_base_url, config.request_timeout(), config.max_retries)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Wraps an existing client.
    pub fn from_client(client: ApiClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl ForecastSource for HttpForecastSource {
    fn fetch_forecast(
        &self,
        device_id: &str,
        request: ForecastRequest,
    ) -> BoxFuture<'static, Result<ForecastResult, FeedError>> {
        let client = Arc::clone(&self.client);
        let device_id = device_id.to_string();
        Box::pin(async move {
            let query = request.query_pairs();
            client
                .get_json::<ForecastResult>(&["forecast", device_id.as_str()], &query)
                .await?
                .into_result()
        })
    }
}

/// Read-only view of the controller for observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchView {
    /// Device the controller fetches for.
    pub target: Option<String>,
    /// Latest applied forecast, real or synthetic.
    pub last_result: Option<ForecastResult>,
    /// Latest applied failure.
    pub last_error: Option<ErrorInfo>,
    /// True while any call is running.
    pub in_flight: bool,
    /// Parameters the next parameterless call will use.
    pub last_params: Option<ForecastRequest>,
    /// True when `last_result` is a synthetic placeholder.
    pub synthetic: bool,
}

#[derive(Debug, Default)]
struct Inputs {
    target: Option<String>,
    params: Option<ForecastRequest>,
    last_params: Option<ForecastRequest>,
}

struct ControllerInner {
    config: ForecastConfig,
    fallback: FallbackPolicy,
    source: Arc<dyn ForecastSource>,
    clock: SharedClock,
    rng: Mutex<StdRng>,
    inputs: Mutex<Inputs>,
    view: watch::Sender<FetchView>,
    issued: AtomicU64,
    applied: AtomicU64,
    active: AtomicUsize,
}

/// # Forecast Controller
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ForecastController {
    inner: Arc<ControllerInner>,
}

impl ForecastController {
    /// Creates a controller that fetches over HTTP.
    ///
    /// # Errors
    /// `FeedError::Config` when the server base URL is invalid.
    pub fn new(config: ForecastConfig, fallback: FallbackPolicy) -> Result<Self, FeedError> {
        let source = HttpForecastSource::new(&config)?;
        Ok(Self::with_source(config, fallback, Arc::new(source), system_clock(), None))
    }

    /// Creates a controller with an explicit source, clock and optional RNG seed.
    pub fn with_source(
        config: ForecastConfig,
        fallback: FallbackPolicy,
        source: Arc<dyn ForecastSource>,
        clock: SharedClock,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (view, _) = watch::channel(FetchView::default());
        Self {
            inner: Arc::new(ControllerInner {
                config,
                fallback,
                source,
                clock,
                rng: Mutex::new(rng),
                inputs: Mutex::new(Inputs::default()),
                view,
                issued: AtomicU64::new(0),
                applied: AtomicU64::new(0),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Sets the device identifier. An empty string counts as absent.
    ///
    /// When the target changes and parameters are present, a fetch is spawned
    /// and its handle returned. Must be called from within a Tokio runtime.
    pub fn set_target(&self, target: Option<&str>) -> Option<JoinHandle<()>> {
        let target = target.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
        let changed = {
            let mut inputs = self.lock_inputs();
            if inputs.target == target {
                false
            } else {
                inputs.target = target.clone();
                true
            }
        };
        if changed {
            self.inner.view.send_modify(|view| view.target = target);
        }
        self.auto_fetch(changed)
    }

    /// Sets the driving parameters. Present parameters also become the
    /// remembered ones. When they change and a target is set, a fetch is
    /// spawned and its handle returned.
    pub fn set_params(&self, params: Option<ForecastRequest>) -> Option<JoinHandle<()>> {
        let changed = {
            let mut inputs = self.lock_inputs();
            if inputs.params == params {
                false
            } else {
                inputs.params = params;
                if params.is_some() {
                    inputs.last_params = params;
                }
                true
            }
        };
        if changed && params.is_some() {
            self.inner.view.send_modify(|view| view.last_params = params);
        }
        self.auto_fetch(changed)
    }

    fn auto_fetch(&self, changed: bool) -> Option<JoinHandle<()>> {
        let ready = {
            let inputs = self.lock_inputs();
            inputs.target.is_some() && inputs.params.is_some()
        };
        if !(changed && ready) {
            return None;
        }

        let this = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = this.fetch(None).await {
                log::debug!("Automatic forecast fetch failed: {}", e);
            }
        }))
    }

    /// Repeats the last request.
    pub async fn refetch(&self) -> Result<ForecastResult, FeedError> {
        self.fetch(None).await
    }

    /// Runs one request/response cycle.
    ///
    /// `params` replaces the remembered parameters; `None` reuses them.
    ///
    /// # Errors
    /// `FeedError::MissingTarget` without touching any state when no target
    /// is set. Otherwise the source's error, which is also recorded in the
    /// view (alongside a synthetic result when the fallback is enabled).
    pub async fn fetch(&self, params: Option<ForecastRequest>) -> Result<ForecastResult, FeedError> {
        let (target, remembered) = {
            let mut inputs = self.lock_inputs();
            let target = inputs.target.clone().ok_or(FeedError::MissingTarget)?;
            if params.is_some() {
                inputs.last_params = params;
            }
            (target, inputs.last_params)
        };
        let request = remembered.unwrap_or_default();

        let seq = self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlightGuard::enter(&self.inner);
        self.apply(seq, |view| {
            view.last_error = None;
            view.last_params = remembered;
        });

        log::info!("Fetching forecast for '{}' (call #{})", target, seq);
        match self.inner.source.fetch_forecast(&target, request).await {
            Ok(result) => {
                let applied = result.clone();
                let fresh = self.apply(seq, move |view| {
                    view.last_result = Some(applied);
                    view.last_error = None;
                    view.synthetic = false;
                });
                if !fresh {
                    log::debug!("Discarding stale forecast from call #{}", seq);
                }
                Ok(result)
            }
            Err(e) => {
                log::error!("Error fetching forecast data for '{}': {}", target, e);
                let info = ErrorInfo::from(&e);
                let placeholder = self.inner.fallback.is_synthetic().then(|| self.placeholder(request));
                if placeholder.is_some() {
                    log::warn!("Serving synthetic forecast for '{}'", target);
                }
                self.apply(seq, move |view| {
                    view.last_error = Some(info);
                    if let Some(placeholder) = placeholder {
                        view.last_result = Some(placeholder);
                        view.synthetic = true;
                    }
                });
                Err(e)
            }
        }
    }

    /// Applies `update` if `seq` is at least as new as the last applied call.
    /// Runs under the view lock, so check-and-write is atomic.
    fn apply(&self, seq: u64, update: impl FnOnce(&mut FetchView)) -> bool {
        let applied = &self.inner.applied;
        self.inner.view.send_if_modified(|view| {
            if seq < applied.load(Ordering::SeqCst) {
                return false;
            }
            applied.store(seq, Ordering::SeqCst);
            update(view);
            true
        })
    }

    fn placeholder(&self, request: ForecastRequest) -> ForecastResult {
        let starts_at = request.starts_at.unwrap_or_else(|| self.inner.clock.now_unix());
        let mut rng = self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner);
        synthesize_forecast(
            starts_at,
            self.inner.config.synthetic_points,
            self.inner.config.synthetic_spacing_secs,
            &mut *rng,
        )
    }

    fn lock_inputs(&self) -> std::sync::MutexGuard<'_, Inputs> {
        self.inner.inputs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A receiver that observes every view change.
    pub fn subscribe_view(&self) -> watch::Receiver<FetchView> {
        self.inner.view.subscribe()
    }

    /// Copy of the current view.
    pub fn view(&self) -> FetchView {
        self.inner.view.borrow().clone()
    }

    /// Latest applied forecast.
    pub fn last_result(&self) -> Option<ForecastResult> {
        self.inner.view.borrow().last_result.clone()
    }

    /// Latest applied error.
    pub fn last_error(&self) -> Option<ErrorInfo> {
        self.inner.view.borrow().last_error.clone()
    }

    /// True while any call is running.
    pub fn in_flight(&self) -> bool {
        self.inner.view.borrow().in_flight
    }

    /// Parameters a parameterless call will use.
    pub fn last_params(&self) -> Option<ForecastRequest> {
        self.lock_inputs().last_params
    }
}

/// Holds `in_flight` up for the lifetime of one call.
struct InFlightGuard<'a> {
    inner: &'a ControllerInner,
}

impl<'a> InFlightGuard<'a> {
    fn enter(inner: &'a ControllerInner) -> Self {
        inner.view.send_modify(|view| {
            inner.active.fetch_add(1, Ordering::SeqCst);
            view.in_flight = true;
        });
        Self { inner }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let active = &self.inner.active;
        self.inner.view.send_modify(|view| {
            let remaining = active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            view.in_flight = remaining > 0;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::Clock;
    use crate::core::model::ForecastPoint;
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_unix(&self) -> i64 {
            self.0
        }
    }

    /// Replays scripted outcomes and records every request.
    #[derive(Default)]
    struct ScriptedSource {
        outcomes: Mutex<VecDeque<Result<ForecastResult, FeedError>>>,
        requests: Mutex<Vec<(String, ForecastRequest)>>,
    }

    impl ScriptedSource {
        fn push(&self, outcome: Result<ForecastResult, FeedError>) {
            self.outcomes.lock().unwrap().push_back(outcome);
        }

        fn requests(&self) -> Vec<(String, ForecastRequest)> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ForecastSource for ScriptedSource {
        fn fetch_forecast(
            &self,
            device_id: &str,
            request: ForecastRequest,
        ) -> BoxFuture<'static, Result<ForecastResult, FeedError>> {
            self.requests.lock().unwrap().push((device_id.to_string(), request));
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FeedError::Transport("no scripted outcome".into())));
            Box::pin(async move { outcome })
        }
    }

    fn single(ts: i64, power: f64) -> ForecastResult {
        ForecastResult {
            forecast: vec![ForecastPoint { timestamp: ts, power }],
        }
    }

    fn controller(source: Arc<ScriptedSource>, fallback: FallbackPolicy) -> ForecastController {
        ForecastController::with_source(
            ForecastConfig::default(),
            fallback,
            source,
            Arc::new(FixedClock(1_800_000_000)),
            Some(11),
        )
    }

    #[tokio::test]
    async fn fetch_without_target_touches_nothing() {
        let source = Arc::new(ScriptedSource::default());
        let ctl = controller(Arc::clone(&source), FallbackPolicy::Synthetic);

        assert_eq!(ctl.fetch(Some(ForecastRequest::new(1, 2))).await, Err(FeedError::MissingTarget));
        assert_eq!(ctl.view(), FetchView::default());
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn parameterless_fetch_inherits_last_params() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Ok(single(1, 1.0)));
        source.push(Ok(single(2, 2.0)));
        let ctl = controller(Arc::clone(&source), FallbackPolicy::Disabled);
        ctl.set_target(Some("device-7"));

        let params = ForecastRequest::new(1_700_000_000, 3600);
        ctl.fetch(Some(params)).await.unwrap();
        ctl.fetch(None).await.unwrap();

        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1], ("device-7".to_string(), params));
        assert_eq!(ctl.last_params(), Some(params));
        assert_eq!(ctl.last_result(), Some(single(2, 2.0)));
        assert!(!ctl.in_flight());
    }

    #[tokio::test]
    async fn http_error_is_recorded_and_in_flight_reset() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Err(FeedError::Http { status: 500, body: None }));
        let ctl = controller(Arc::clone(&source), FallbackPolicy::Disabled);
        ctl.set_target(Some("device-7"));

        let err = ctl.refetch().await.unwrap_err();
        assert_eq!(err, FeedError::Http { status: 500, body: None });

        let view = ctl.view();
        assert!(!view.in_flight);
        assert_eq!(view.last_result, None);
        assert_eq!(view.last_error.map(|e| e.message), Some("HTTP error! status: 500".to_string()));
    }

    #[tokio::test]
    async fn fallback_sets_result_and_keeps_error() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Err(FeedError::Transport("unreachable".into())));
        let ctl = controller(Arc::clone(&source), FallbackPolicy::Synthetic);
        ctl.set_target(Some("device-7"));

        assert!(ctl.fetch(Some(ForecastRequest { starts_at: Some(1_000), horizon: None })).await.is_err());

        let view = ctl.view();
        assert!(view.synthetic);
        assert!(view.last_error.is_some());
        let forecast = view.last_result.unwrap().forecast;
        assert_eq!(forecast.len(), 12);
        assert_eq!(forecast[0].timestamp, 1_000);
        assert_eq!(forecast[11].timestamp, 1_000 + 11 * 300);
    }

    #[tokio::test]
    async fn fallback_without_starts_at_uses_clock() {
        let source = Arc::new(ScriptedSource::default());
        let ctl = controller(Arc::clone(&source), FallbackPolicy::Synthetic);
        ctl.set_target(Some("device-7"));

        let _ = ctl.fetch(None).await;
        let forecast = ctl.last_result().unwrap().forecast;
        assert_eq!(forecast[0].timestamp, 1_800_000_000);
    }

    #[tokio::test]
    async fn next_call_clears_previous_error() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Err(FeedError::Http { status: 404, body: None }));
        source.push(Ok(single(5, 5.0)));
        let ctl = controller(Arc::clone(&source), FallbackPolicy::Synthetic);
        ctl.set_target(Some("device-7"));

        let _ = ctl.fetch(None).await;
        assert!(ctl.last_error().is_some());
        ctl.fetch(None).await.unwrap();
        assert!(ctl.last_error().is_none());
        assert!(!ctl.view().synthetic);
    }

    #[tokio::test]
    async fn parameterless_first_fetch_keeps_params_absent() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Ok(single(1, 1.0)));
        let ctl = controller(Arc::clone(&source), FallbackPolicy::Disabled);
        ctl.set_target(Some("device-7"));

        ctl.fetch(None).await.unwrap();

        assert_eq!(ctl.last_params(), None);
        assert_eq!(ctl.view().last_params, ctl.last_params());
        assert_eq!(source.requests()[0].1, ForecastRequest::default());
    }

    #[tokio::test]
    async fn fallback_near_timestamp_limit_does_not_overflow() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Err(FeedError::Transport("unreachable".into())));
        let ctl = controller(Arc::clone(&source), FallbackPolicy::Synthetic);
        ctl.set_target(Some("device-7"));

        let request = ForecastRequest {
            starts_at: Some(i64::MAX - 10),
            horizon: None,
        };
        assert!(ctl.fetch(Some(request)).await.is_err());

        let view = ctl.view();
        assert!(view.synthetic);
        let forecast = view.last_result.unwrap().forecast;
        assert_eq!(forecast.len(), 1);
        assert_eq!(forecast[0].timestamp, i64::MAX - 10);
    }

    #[test]
    fn http_source_rejects_out_of_range_settings() {
        let zero_timeout = ForecastConfig {
            request_timeout_secs: 0,
            ..ForecastConfig::default()
        };
        assert!(matches!(HttpForecastSource::new(&zero_timeout), Err(FeedError::Config(_))));

        let backwards = ForecastConfig {
            synthetic_spacing_secs: -300,
            ..ForecastConfig::default()
        };
        assert!(matches!(
            ForecastController::new(backwards, FallbackPolicy::Synthetic),
            Err(FeedError::Config(_))
        ));
    }

    /// Hands out responses only when the test releases them.
    struct GatedSource {
        gates: Mutex<VecDeque<oneshot::Receiver<ForecastResult>>>,
    }

    impl ForecastSource for GatedSource {
        fn fetch_forecast(
            &self,
            _device_id: &str,
            _request: ForecastRequest,
        ) -> BoxFuture<'static, Result<ForecastResult, FeedError>> {
            let gate = self.gates.lock().unwrap().pop_front();
            Box::pin(async move {
                match gate {
                    Some(rx) => rx.await.map_err(|_| FeedError::Transport("gate dropped".into())),
                    None => Err(FeedError::Transport("no gate".into())),
                }
            })
        }
    }

    #[tokio::test]
    async fn stale_response_never_overwrites_newer_one() {
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let source = Arc::new(GatedSource {
            gates: Mutex::new(VecDeque::from([first_rx, second_rx])),
        });
        let ctl = ForecastController::with_source(
            ForecastConfig::default(),
            FallbackPolicy::Disabled,
            source,
            Arc::new(FixedClock(0)),
            Some(1),
        );
        ctl.set_target(Some("device-7"));

        let older = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.fetch(Some(ForecastRequest::new(100, 60))).await }
        });
        while ctl.inner.issued.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        let newer = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.fetch(Some(ForecastRequest::new(200, 60))).await }
        });
        while ctl.inner.issued.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        assert!(ctl.in_flight());

        second_tx.send(single(200, 2.0)).unwrap();
        newer.await.unwrap().unwrap();
        assert!(ctl.in_flight(), "older call is still running");

        first_tx.send(single(100, 1.0)).unwrap();
        // The stale call still returns its own data to its caller.
        assert_eq!(older.await.unwrap().unwrap(), single(100, 1.0));

        assert_eq!(ctl.last_result(), Some(single(200, 2.0)));
        assert!(!ctl.in_flight());
    }

    #[tokio::test]
    async fn dropped_call_resets_in_flight() {
        let (_keep_tx, rx) = oneshot::channel::<ForecastResult>();
        let source = Arc::new(GatedSource {
            gates: Mutex::new(VecDeque::from([rx])),
        });
        let ctl = ForecastController::with_source(
            ForecastConfig::default(),
            FallbackPolicy::Disabled,
            source,
            Arc::new(FixedClock(0)),
            Some(1),
        );
        ctl.set_target(Some("device-7"));

        let call = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.fetch(None).await }
        });
        while !ctl.in_flight() {
            tokio::task::yield_now().await;
        }
        call.abort();
        let _ = call.await;
        assert!(!ctl.in_flight());
    }

    #[tokio::test]
    async fn auto_fetch_fires_once_both_inputs_present_and_on_change() {
        let source = Arc::new(ScriptedSource::default());
        for n in 0..3 {
            source.push(Ok(single(n, n as f64)));
        }
        let ctl = controller(Arc::clone(&source), FallbackPolicy::Disabled);

        assert!(ctl.set_params(Some(ForecastRequest::new(10, 60))).is_none());
        ctl.set_target(Some("device-7")).unwrap().await.unwrap();
        assert_eq!(source.requests().len(), 1);

        // Same inputs again: no new fetch.
        assert!(ctl.set_target(Some("device-7")).is_none());
        assert!(ctl.set_params(Some(ForecastRequest::new(10, 60))).is_none());

        ctl.set_params(Some(ForecastRequest::new(20, 60))).unwrap().await.unwrap();
        ctl.set_target(Some("device-8")).unwrap().await.unwrap();

        let requests = source.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].1, ForecastRequest::new(20, 60));
        assert_eq!(requests[2].0, "device-8");

        // Clearing params suppresses the trigger.
        assert!(ctl.set_params(None).is_none());
        assert!(ctl.set_target(Some("device-9")).is_none());
    }
}

//! # Connection State Machine
//!
//! The subscriber's lifecycle as a pure transition function:
//! `(Lifecycle, ConnectionEvent) -> (Lifecycle, Vec<Effect>)`. The async driver
//! in `ingestors::anomaly_wss` feeds it events and executes the effects, so
//! every transition can be tested here without a socket or a timer.
//!
//! ```text
//! Disconnected --Start--> Connecting --Opened--> Connected
//!       ^                     |                      |
//!       |               TransportFailed        TransportFailed / RemoteClosed
//!       |                     v                      v
//!       +----ReconnectDue-- Failed / Disconnected (reconnect pending)
//! ```
//!
//! After `Stop` the lifecycle is terminal: every event except a fresh `Start`
//! is ignored, which makes late callbacks from an aborted connect harmless.

use crate::configs::FallbackPolicy;
use crate::core::errors::{ErrorInfo, ErrorKind};

/// Externally visible connection state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying.
    #[default]
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// Receiving events (live or synthetic).
    Connected,
    /// The last attempt or connection failed.
    Failed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Begin connecting for a valid target.
    Start,
    /// The transport handshake completed.
    Opened,
    /// The connection failed to open or broke while open.
    TransportFailed(String),
    /// The remote closed the connection cleanly.
    RemoteClosed,
    /// The connection could not even be initiated.
    ConstructionFailed(String),
    /// The reconnect timer fired.
    ReconnectDue,
    /// Teardown requested.
    Stop,
}

/// Side effects requested by a transition, executed in order by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Initiate a connection attempt.
    OpenConnection,
    /// Drop the active connection, if any.
    CloseConnection,
    /// Arm the single reconnect timer, replacing any armed one.
    ScheduleReconnect,
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Start the synthetic generator.
    ActivateSynthetic,
    /// Stop the synthetic generator.
    StopSynthetic,
    /// Clear the observable error.
    ClearError,
    /// Publish an error to observers.
    ReportError(ErrorInfo),
}

/// Full lifecycle state fed to [`Lifecycle::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    state: ConnectionState,
    attempts: u32,
    reconnect_pending: bool,
    synthetic: bool,
    stopped: bool,
    fallback: FallbackPolicy,
}

impl Lifecycle {
    /// A fresh, disconnected lifecycle.
    pub fn new(fallback: FallbackPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            reconnect_pending: false,
            synthetic: false,
            stopped: false,
            fallback,
        }
    }

    /// Public connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True while a reconnect timer is armed.
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// True while the synthetic generator is active.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// True after `Stop`.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Applies one event and returns the next lifecycle and its effects.
    pub fn apply(self, event: ConnectionEvent) -> (Lifecycle, Vec<Effect>) {
        use ConnectionEvent as Ev;
        use ConnectionState as St;

        if self.stopped && event != Ev::Start {
            return (self, Vec::new());
        }

        let mut next = self;
        let effects = match (self.state, event) {
            (_, Ev::Start) => {
                next = Lifecycle::new(self.fallback);
                next.state = St::Connecting;
                next.attempts = 1;
                vec![Effect::OpenConnection]
            }

            (_, Ev::Stop) => {
                let mut effects = Vec::new();
                if self.reconnect_pending {
                    effects.push(Effect::CancelReconnect);
                }
                if self.synthetic {
                    effects.push(Effect::StopSynthetic);
                }
                if matches!(self.state, St::Connecting | St::Connected) && !self.synthetic {
                    effects.push(Effect::CloseConnection);
                }
                next.state = St::Disconnected;
                next.reconnect_pending = false;
                next.synthetic = false;
                next.stopped = true;
                effects
            }

            (St::Connecting, Ev::Opened) => {
                next.state = St::Connected;
                vec![Effect::ClearError]
            }

            (St::Connecting, Ev::ConstructionFailed(message)) => {
                if self.attempts == 1 && self.fallback.is_synthetic() {
                    next.state = St::Connected;
                    next.synthetic = true;
                    vec![Effect::ActivateSynthetic, Effect::ClearError]
                } else {
                    next.state = St::Failed;
                    vec![Effect::ReportError(ErrorInfo::new(ErrorKind::Construction, message))]
                }
            }

            (St::Connecting | St::Connected, Ev::TransportFailed(message)) if !self.synthetic => {
                next.state = St::Failed;
                next.reconnect_pending = true;
                vec![
                    Effect::CloseConnection,
                    Effect::ReportError(ErrorInfo::new(ErrorKind::Transport, message)),
                    Effect::ScheduleReconnect,
                ]
            }

            (St::Connecting | St::Connected, Ev::RemoteClosed) if !self.synthetic => {
                next.state = St::Disconnected;
                next.reconnect_pending = true;
                vec![Effect::CloseConnection, Effect::ScheduleReconnect]
            }

            (St::Failed | St::Disconnected, Ev::ReconnectDue) if self.reconnect_pending => {
                next.state = St::Connecting;
                next.reconnect_pending = false;
                next.attempts = self.attempts.saturating_add(1);
                vec![Effect::OpenConnection]
            }

            // Anything else is a stale or out-of-order signal.
            _ => Vec::new(),
        };

        (next, effects)
    }
}

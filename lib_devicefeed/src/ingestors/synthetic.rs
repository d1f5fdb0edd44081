//! # Synthetic Anomaly Generator
//!
//! Development-only stand-in for the anomaly broker. Each tick produces an
//! event with a fixed probability; the event looks like a plausible detection
//! for a power meter. The generator holds no timer itself, the subscriber
//! drives it from its single owned interval.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::core::errors::FeedError;
use crate::core::model::AnomalyEvent;

/// Feature names a synthetic event may blame.
pub const SYNTHETIC_FEATURES: [&str; 4] = ["power_consumption", "voltage", "current", "frequency"];

/// Messages a synthetic event may carry.
pub const SYNTHETIC_MESSAGES: [&str; 4] = [
    "Unusual power spike detected",
    "Power consumption below normal range",
    "Voltage fluctuation detected",
    "Irregular usage pattern identified",
];

/// Longest synthetic detection window, seconds.
const MAX_WINDOW_SECS: i64 = 3600;

/// Random anomaly source.
#[derive(Debug, Clone)]
pub struct SyntheticAnomalyGenerator {
    rng: StdRng,
    probability: f64,
}

impl SyntheticAnomalyGenerator {
    /// Creates a generator. `probability` is clamped to `[0, 1]`; a seed makes
    /// the output reproducible.
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let probability = if probability.is_finite() { probability.clamp(0.0, 1.0) } else { 0.0 };
        Self { rng, probability }
    }

    /// One generator tick at wall time `now`: an event with the configured
    /// probability, otherwise nothing.
    pub fn tick(&mut self, now: i64) -> Option<AnomalyEvent> {
        if !self.rng.random_bool(self.probability) {
            return None;
        }
        match self.synthesize(now) {
            Ok(event) => Some(event),
            Err(e) => {
                log::warn!("Discarding synthetic anomaly: {}", e);
                None
            }
        }
    }

    /// Unconditionally builds one synthetic event ending at `now`.
    pub fn synthesize(&mut self, now: i64) -> Result<AnomalyEvent, FeedError> {
        let window_secs = self.rng.random_range(0..MAX_WINDOW_SECS);
        let reconstruction_error = self.rng.random::<f64>() * 0.1 + 0.01;
        let feature = SYNTHETIC_FEATURES.choose(&mut self.rng).copied().unwrap_or("power_consumption");
        let message = SYNTHETIC_MESSAGES.choose(&mut self.rng).copied().unwrap_or(SYNTHETIC_MESSAGES[0]);

        AnomalyEvent::new(now - window_secs, now, reconstruction_error, feature, message)
    }
}

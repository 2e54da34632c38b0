//! Obfuscation profile: the configuration surface of the layer.
//!
//! A profile is immutable after construction. Caller-supplied values that
//! violate the invariants (min <= max for every bound pair, probabilities in
//! [0, 1]) are corrected at construction with a `tracing` warning — never
//! rejected. The environment loader follows the same rule: unparseable
//! values fall back to the documented defaults.

use std::time::Duration;

use tracing::warn;

use super::constants::*;

/// Immutable obfuscation configuration for one peer.
///
/// Construct via [`ObfuscationProfile::builder`] or
/// [`ObfuscationProfile::from_env`]; both clamp invalid values.
#[derive(Debug, Clone, PartialEq)]
pub struct ObfuscationProfile {
    /// Minimum random pre-send delay.
    pub delay_min: Duration,
    /// Maximum random pre-send delay.
    pub delay_max: Duration,
    /// Probability of appending padding to a message, in [0, 1].
    pub padding_probability: f64,
    /// Minimum padding filler length in bytes.
    pub padding_min: usize,
    /// Maximum padding filler length in bytes.
    pub padding_max: usize,
    /// Whether frequency hopping is enabled at all.
    pub hop_enabled: bool,
    /// Minimum interval between frequency hops.
    pub hop_min: Duration,
    /// Maximum interval between frequency hops.
    pub hop_max: Duration,
    /// Fixed-cadence interval; zero disables fixed-cadence pacing.
    pub fixed_interval: Duration,
    /// Minimum cadence jitter.
    pub jitter_min: Duration,
    /// Maximum cadence jitter.
    pub jitter_max: Duration,
    /// Probability of replacing a request with a decoy, in [0, 1].
    pub decoy_probability: f64,
}

impl Default for ObfuscationProfile {
    fn default() -> Self {
        Self {
            delay_min: DEFAULT_DELAY_MIN,
            delay_max: DEFAULT_DELAY_MAX,
            padding_probability: DEFAULT_PADDING_PROBABILITY,
            padding_min: DEFAULT_PADDING_MIN,
            padding_max: DEFAULT_PADDING_MAX,
            hop_enabled: true,
            hop_min: DEFAULT_HOP_MIN,
            hop_max: DEFAULT_HOP_MAX,
            fixed_interval: DEFAULT_FIXED_INTERVAL,
            jitter_min: DEFAULT_JITTER_MIN,
            jitter_max: DEFAULT_JITTER_MAX,
            decoy_probability: DEFAULT_DECOY_PROBABILITY,
        }
    }
}

impl ObfuscationProfile {
    /// Start building a profile from the defaults.
    pub fn builder() -> ProfileBuilder {
        ProfileBuilder::new()
    }

    /// Load a profile from `VEIL_*` environment variables.
    ///
    /// Recognized variables (all optional):
    /// `VEIL_MIN_DELAY`, `VEIL_MAX_DELAY` (seconds),
    /// `VEIL_PADDING_PROBABILITY`, `VEIL_MIN_PADDING`, `VEIL_MAX_PADDING`
    /// (bytes), `VEIL_ENABLE_FREQUENCY_HOPPING` (true/false),
    /// `VEIL_MIN_HOP_INTERVAL`, `VEIL_MAX_HOP_INTERVAL` (seconds),
    /// `VEIL_FIXED_INTERVAL` (seconds, 0 disables), `VEIL_MIN_JITTER`,
    /// `VEIL_MAX_JITTER` (seconds), `VEIL_DECOY_PROBABILITY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let profile = Self {
            delay_min: env_duration_secs("VEIL_MIN_DELAY", defaults.delay_min),
            delay_max: env_duration_secs("VEIL_MAX_DELAY", defaults.delay_max),
            padding_probability: env_f64("VEIL_PADDING_PROBABILITY", defaults.padding_probability),
            padding_min: env_usize("VEIL_MIN_PADDING", defaults.padding_min),
            padding_max: env_usize("VEIL_MAX_PADDING", defaults.padding_max),
            hop_enabled: env_bool("VEIL_ENABLE_FREQUENCY_HOPPING", defaults.hop_enabled),
            hop_min: env_duration_secs("VEIL_MIN_HOP_INTERVAL", defaults.hop_min),
            hop_max: env_duration_secs("VEIL_MAX_HOP_INTERVAL", defaults.hop_max),
            fixed_interval: env_duration_secs("VEIL_FIXED_INTERVAL", defaults.fixed_interval),
            jitter_min: env_duration_secs("VEIL_MIN_JITTER", defaults.jitter_min),
            jitter_max: env_duration_secs("VEIL_MAX_JITTER", defaults.jitter_max),
            decoy_probability: env_f64("VEIL_DECOY_PROBABILITY", defaults.decoy_probability),
        };
        profile.corrected()
    }

    /// Apply the construction invariants, correcting (never rejecting)
    /// violations with a logged warning.
    fn corrected(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.padding_probability) {
            warn!(
                value = self.padding_probability,
                "padding probability outside [0, 1], clamping"
            );
            self.padding_probability = self.padding_probability.clamp(0.0, 1.0);
        }
        if !(0.0..=1.0).contains(&self.decoy_probability) {
            warn!(
                value = self.decoy_probability,
                "decoy probability outside [0, 1], clamping"
            );
            self.decoy_probability = self.decoy_probability.clamp(0.0, 1.0);
        }
        if self.delay_min > self.delay_max {
            warn!(
                min_ms = self.delay_min.as_millis() as u64,
                max_ms = self.delay_max.as_millis() as u64,
                "delay bounds inverted, raising max"
            );
            self.delay_max = self.delay_min + DELAY_CORRECTION_SLACK;
        }
        if self.padding_min > self.padding_max {
            warn!(
                min = self.padding_min,
                max = self.padding_max,
                "padding bounds inverted, raising max"
            );
            self.padding_max = self.padding_min + PADDING_CORRECTION_SLACK;
        }
        if self.hop_min > self.hop_max {
            warn!(
                min_s = self.hop_min.as_secs(),
                max_s = self.hop_max.as_secs(),
                "hop interval bounds inverted, raising max"
            );
            self.hop_max = self.hop_min + HOP_CORRECTION_SLACK;
        }
        if self.jitter_min > self.jitter_max {
            warn!(
                min_ms = self.jitter_min.as_millis() as u64,
                max_ms = self.jitter_max.as_millis() as u64,
                "jitter bounds inverted, raising max"
            );
            self.jitter_max = self.jitter_min;
        }
        self
    }

    /// Whether fixed-cadence pacing is active.
    pub fn cadence_enabled(&self) -> bool {
        !self.fixed_interval.is_zero()
    }
}

/// Builder for an [`ObfuscationProfile`].
///
/// Every setter accepts raw values; `build` applies the clamping rules.
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    profile: ObfuscationProfile,
}

impl ProfileBuilder {
    /// Create a builder seeded with the default profile.
    pub fn new() -> Self {
        Self {
            profile: ObfuscationProfile::default(),
        }
    }

    /// Set the random pre-send delay bounds.
    pub fn delay_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.profile.delay_min = min;
        self.profile.delay_max = max;
        self
    }

    /// Set the padding probability.
    pub fn padding_probability(mut self, p: f64) -> Self {
        self.profile.padding_probability = p;
        self
    }

    /// Set the padding filler length bounds in bytes.
    pub fn padding_bounds(mut self, min: usize, max: usize) -> Self {
        self.profile.padding_min = min;
        self.profile.padding_max = max;
        self
    }

    /// Enable or disable frequency hopping.
    pub fn hop_enabled(mut self, enabled: bool) -> Self {
        self.profile.hop_enabled = enabled;
        self
    }

    /// Set the hop interval bounds.
    pub fn hop_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.profile.hop_min = min;
        self.profile.hop_max = max;
        self
    }

    /// Set the fixed-cadence interval (zero disables).
    pub fn fixed_interval(mut self, interval: Duration) -> Self {
        self.profile.fixed_interval = interval;
        self
    }

    /// Set the cadence jitter bounds.
    pub fn jitter_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.profile.jitter_min = min;
        self.profile.jitter_max = max;
        self
    }

    /// Set the decoy probability.
    pub fn decoy_probability(mut self, p: f64) -> Self {
        self.profile.decoy_probability = p;
        self
    }

    /// Build the profile, applying the clamping rules.
    pub fn build(self) -> ObfuscationProfile {
        self.profile.corrected()
    }
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(%name, %raw, "unparseable value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(%name, %raw, "unparseable value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                warn!(%name, %raw, "unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    let secs = env_f64(name, default.as_secs_f64());
    if !secs.is_finite() || secs < 0.0 {
        warn!(%name, secs, "duration out of range, using default");
        return default;
    }
    Duration::from_secs_f64(secs)
}

//! Send pacing: random pre-send delays and fixed-cadence waits.
//!
//! Two independent mechanisms that never interact directly:
//!
//! - every send waits a duration drawn uniformly from the profile's delay
//!   bounds, unconditionally, decoy or real;
//! - when a fixed interval is configured, sends are additionally held back
//!   to the cadence, with uniform jitter added so inter-arrival histograms
//!   stay noisy.
//!
//! The decision functions are pure over [`Instant`] values so they can be
//! tested without a runtime; the async appliers suspend cooperatively via
//! `tokio::time::sleep` and are cancelled by dropping the future, in which
//! case the message is simply never sent.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::trace;

use crate::core::ObfuscationProfile;

/// Computes how long a send must wait before leaving the obfuscation layer.
///
/// Owns the last-send timestamp for cadence tracking; one instance per
/// session, single writer.
#[derive(Debug, Clone)]
pub struct PacingScheduler {
    delay_min: Duration,
    delay_max: Duration,
    fixed_interval: Duration,
    jitter_min: Duration,
    jitter_max: Duration,
    /// Instant of the most recent cadence-tracked send.
    last_send: Option<Instant>,
}

impl PacingScheduler {
    /// Create a scheduler from a profile's timing settings.
    pub fn new(profile: &ObfuscationProfile) -> Self {
        Self {
            delay_min: profile.delay_min,
            delay_max: profile.delay_max,
            fixed_interval: profile.fixed_interval,
            jitter_min: profile.jitter_min,
            jitter_max: profile.jitter_max,
            last_send: None,
        }
    }

    /// Draw the unconditional random pre-send delay.
    pub fn draw_presend_delay(&self) -> Duration {
        uniform_duration(self.delay_min, self.delay_max)
    }

    /// Compute the cadence wait for a send attempted at `now`.
    ///
    /// Zero when cadence is disabled, on the first send ever, or when the
    /// elapsed time since the last send already exceeds the interval.
    /// Otherwise `interval - elapsed + jitter`.
    pub fn cadence_wait(&self, now: Instant) -> Duration {
        if self.fixed_interval.is_zero() {
            return Duration::ZERO;
        }
        let Some(last) = self.last_send else {
            return Duration::ZERO;
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.fixed_interval {
            return Duration::ZERO;
        }
        let jitter = uniform_duration(self.jitter_min, self.jitter_max);
        self.fixed_interval - elapsed + jitter
    }

    /// Record a cadence-tracked send at `at`.
    ///
    /// Callers record the instant taken *after* any cadence wait completes,
    /// not before, so repeated waits do not accumulate drift.
    pub fn mark_sent(&mut self, at: Instant) {
        self.last_send = Some(at);
    }

    /// Instant of the most recent cadence-tracked send.
    pub fn last_send(&self) -> Option<Instant> {
        self.last_send
    }

    /// Whether fixed-cadence pacing is active.
    pub fn cadence_enabled(&self) -> bool {
        !self.fixed_interval.is_zero()
    }

    /// Suspend for the random pre-send delay.
    #[cfg(feature = "transport")]
    pub async fn apply_presend_delay(&self) {
        let delay = self.draw_presend_delay();
        trace!(delay_ms = delay.as_millis() as u64, "pre-send delay");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Hold the send to the fixed cadence, if one is configured.
    ///
    /// With `fixed_interval` zero this never suspends. Otherwise it sleeps
    /// for the computed wait and records the post-wait instant as the new
    /// last-send timestamp.
    #[cfg(feature = "transport")]
    pub async fn pace(&mut self) {
        if self.fixed_interval.is_zero() {
            return;
        }
        let wait = self.cadence_wait(Instant::now());
        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis() as u64, "cadence wait");
            tokio::time::sleep(wait).await;
        }
        self.mark_sent(Instant::now());
    }
}

/// Uniform draw from `[min, max]`; degenerate bounds return `min`.
fn uniform_duration(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_secs_f64();
    let drawn = rand::thread_rng().gen_range(0.0..=span);
    min + Duration::from_secs_f64(drawn)
}

//! Anonymizing-overlay seam.
//!
//! Deployments may route the secure transport through an external mixing
//! network (Tor-like or I2P-like daemons). The obfuscation layer never
//! speaks those daemons' control protocols; it only needs to know whether
//! the overlay is reachable and to be able to request an identity rotation.
//! Identity rotation is unrelated to the hop coordinator's port rotation.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::warn;

use crate::core::IDENTITY_ROTATION_JITTER;

/// Seam over an external anonymizing-overlay daemon.
pub trait OverlayNetwork {
    /// Whether the overlay is currently reachable.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;

    /// Request a fresh overlay identity (e.g. a new circuit). Returns
    /// whether the rotation succeeded. Invoked on explicit operator request
    /// or by a rotation schedule, never per message.
    fn rotate_identity(&mut self) -> impl Future<Output = bool> + Send;
}

/// No-op overlay for deployments without an anonymizing daemon.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOverlay;

impl OverlayNetwork for DisabledOverlay {
    async fn is_reachable(&self) -> bool {
        false
    }

    async fn rotate_identity(&mut self) -> bool {
        warn!("identity rotation requested but no overlay is configured");
        false
    }
}

/// Computes jittered identity-rotation deadlines.
///
/// Rotating on an exact cadence would itself be a fingerprint; each interval
/// is the base value plus or minus up to 20 %.
#[derive(Debug, Clone)]
pub struct RotationSchedule {
    interval: Duration,
    last_rotation: Instant,
    next_after: Duration,
}

impl RotationSchedule {
    /// Create a schedule with the given base interval.
    pub fn new(interval: Duration) -> Self {
        let mut schedule = Self {
            interval,
            last_rotation: Instant::now(),
            next_after: interval,
        };
        schedule.redraw();
        schedule
    }

    /// Whether a rotation is due at `now`.
    pub fn due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_rotation) >= self.next_after
    }

    /// Record a completed rotation and draw the next jittered interval.
    pub fn mark_rotated(&mut self, now: Instant) {
        self.last_rotation = now;
        self.redraw();
    }

    /// The jittered interval currently in effect.
    pub fn current_interval(&self) -> Duration {
        self.next_after
    }

    fn redraw(&mut self) {
        let jitter = rand::thread_rng().gen_range(-IDENTITY_ROTATION_JITTER..=IDENTITY_ROTATION_JITTER);
        let secs = self.interval.as_secs_f64() * (1.0 + jitter);
        self.next_after = Duration::from_secs_f64(secs.max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_overlay() {
        let mut overlay = DisabledOverlay;
        assert!(!overlay.is_reachable().await);
        assert!(!overlay.rotate_identity().await);
    }

    #[test]
    fn test_rotation_interval_within_jitter_band() {
        let base = Duration::from_secs(300);
        for _ in 0..50 {
            let schedule = RotationSchedule::new(base);
            let interval = schedule.current_interval();
            assert!(interval >= Duration::from_secs(240));
            assert!(interval <= Duration::from_secs(360));
        }
    }

    #[test]
    fn test_rotation_due_after_interval() {
        let mut schedule = RotationSchedule::new(Duration::from_secs(10));
        let now = Instant::now();
        assert!(!schedule.due(now));
        assert!(schedule.due(now + Duration::from_secs(13)));

        schedule.mark_rotated(now + Duration::from_secs(13));
        assert!(!schedule.due(now + Duration::from_secs(14)));
    }
}

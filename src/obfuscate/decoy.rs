//! Decoy message injection and recognition.
//!
//! Decoys are fabricated request-class messages whose lengths follow the
//! same distribution as real traffic, sent to obscure true communication
//! volume. Responses are never decoys. A receiver recognizes a decoy by its
//! marker prefix and drops it before application logic; the sender of a
//! decoy never expects nor processes a meaningful reply.

use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::core::{DECOY_MARKER, DECOY_MIN_LEN, ObfuscationProfile};

/// Decides when to fabricate decoys and recognizes them on receipt.
#[derive(Debug, Clone)]
pub struct DecoyInjector {
    probability: f64,
}

impl DecoyInjector {
    /// Create an injector from a profile's decoy probability.
    pub fn new(profile: &ObfuscationProfile) -> Self {
        Self {
            probability: profile.decoy_probability,
        }
    }

    /// Bernoulli draw deciding whether the next request should be replaced
    /// by a decoy. Only consulted on the request send path.
    pub fn should_inject(&self) -> bool {
        rand::thread_rng().gen_bool(self.probability)
    }

    /// Fabricate a decoy payload.
    ///
    /// The length is drawn from a Gaussian centered on `target_mean_size`
    /// with standard deviation `target_mean_size / 3`, clamped to
    /// `[20, 2 * target_mean_size]`, and filled with random bytes behind the
    /// decoy marker.
    pub fn create_decoy(&self, target_mean_size: usize) -> Vec<u8> {
        let mean = target_mean_size as f64;
        let sigma = mean / 3.0;
        let mut rng = rand::thread_rng();

        let sampled = match Normal::new(mean, sigma) {
            Ok(dist) => dist.sample(&mut rng),
            Err(_) => mean,
        };
        let ceiling = (target_mean_size.saturating_mul(2)) as f64;
        let len = sampled.min(ceiling).max(DECOY_MIN_LEN as f64) as usize;

        let mut payload = vec![0u8; len];
        rng.fill_bytes(&mut payload);

        let mut out = Vec::with_capacity(DECOY_MARKER.len() + len);
        out.extend_from_slice(DECOY_MARKER);
        out.extend_from_slice(&payload);

        debug!(len, "fabricated decoy message");
        out
    }

    /// Whether `msg` is a decoy, i.e. starts with the decoy marker.
    pub fn is_decoy(&self, msg: &[u8]) -> bool {
        msg.starts_with(DECOY_MARKER)
    }

    /// The configured decoy probability.
    pub fn probability(&self) -> f64 {
        self.probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscate::PaddingCodec;

    fn injector(probability: f64) -> DecoyInjector {
        DecoyInjector::new(
            &ObfuscationProfile::builder()
                .decoy_probability(probability)
                .build(),
        )
    }

    #[test]
    fn test_created_decoys_are_recognized() {
        let injector = injector(0.2);
        for mean in [30usize, 100, 500] {
            let decoy = injector.create_decoy(mean);
            assert!(injector.is_decoy(&decoy));
        }
    }

    #[test]
    fn test_decoy_length_bounds() {
        let injector = injector(0.2);
        for _ in 0..100 {
            let decoy = injector.create_decoy(100);
            let payload_len = decoy.len() - DECOY_MARKER.len();
            assert!(
                (DECOY_MIN_LEN..=200).contains(&payload_len),
                "decoy payload {} out of bounds",
                payload_len
            );
        }
    }

    #[test]
    fn test_decoy_floor_dominates_small_means() {
        // With a tiny mean the floor of 20 still applies.
        let injector = injector(0.2);
        for _ in 0..20 {
            let decoy = injector.create_decoy(5);
            assert!(decoy.len() - DECOY_MARKER.len() >= DECOY_MIN_LEN);
        }
    }

    #[test]
    fn test_padded_real_message_is_not_decoy() {
        let injector = injector(1.0);
        let codec = PaddingCodec::new(
            &ObfuscationProfile::builder()
                .padding_probability(1.0)
                .padding_bounds(10, 10)
                .build(),
        );
        let padded = codec.pad(b"real message");
        assert!(!injector.is_decoy(&padded));
    }

    #[test]
    fn test_should_inject_extremes() {
        assert!(!injector(0.0).should_inject());
        assert!(injector(1.0).should_inject());
    }
}

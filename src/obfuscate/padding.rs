//! Probabilistic message padding.
//!
//! With configurable probability, a message is extended with a delimiter and
//! a random-length block of random bytes, so that observed sizes no longer
//! correspond to payload sizes. Both transforms are total: `unpad` of a
//! never-padded message returns it unchanged.

use rand::{Rng, RngCore};
use tracing::debug;

use crate::core::{ObfuscationProfile, PADDING_DELIMITER};

/// Adds and removes length-disguising filler on single messages.
///
/// A payload that legitimately contains [`PADDING_DELIMITER`] is truncated at
/// the first occurrence on decode; there is no escaping mechanism. See the
/// marker discussion in [`crate::core`] constants.
#[derive(Debug, Clone)]
pub struct PaddingCodec {
    probability: f64,
    min: usize,
    max: usize,
}

impl PaddingCodec {
    /// Create a codec from a profile's padding settings.
    pub fn new(profile: &ObfuscationProfile) -> Self {
        Self {
            probability: profile.padding_probability,
            min: profile.padding_min,
            max: profile.padding_max,
        }
    }

    /// Probabilistically append padding to `msg`.
    ///
    /// With probability `padding_probability`, the result is
    /// `msg || delimiter || filler` where the filler length is drawn
    /// uniformly from the configured bounds; otherwise `msg` is returned
    /// unchanged.
    pub fn pad(&self, msg: &[u8]) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.probability) {
            return msg.to_vec();
        }

        let filler_len = rng.gen_range(self.min..=self.max);
        let mut filler = vec![0u8; filler_len];
        rng.fill_bytes(&mut filler);

        let mut out = Vec::with_capacity(msg.len() + PADDING_DELIMITER.len() + filler_len);
        out.extend_from_slice(msg);
        out.extend_from_slice(PADDING_DELIMITER);
        out.extend_from_slice(&filler);

        debug!(filler_len, "appended padding");
        out
    }

    /// Strip padding if present.
    ///
    /// Splits on the first occurrence of the delimiter and discards
    /// everything after it; a message without the delimiter is returned
    /// unchanged. Total over arbitrary byte sequences.
    pub fn unpad<'a>(&self, msg: &'a [u8]) -> &'a [u8] {
        match find_token(msg, PADDING_DELIMITER) {
            Some(at) => &msg[..at],
            None => msg,
        }
    }

    /// The configured padding probability.
    pub fn probability(&self) -> f64 {
        self.probability
    }
}

/// First index of `token` inside `haystack`, if any.
pub(crate) fn find_token(haystack: &[u8], token: &[u8]) -> Option<usize> {
    if token.is_empty() || haystack.len() < token.len() {
        return None;
    }
    haystack.windows(token.len()).position(|w| w == token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(probability: f64, min: usize, max: usize) -> PaddingCodec {
        PaddingCodec::new(
            &ObfuscationProfile::builder()
                .padding_probability(probability)
                .padding_bounds(min, max)
                .build(),
        )
    }

    #[test]
    fn test_pad_exact_layout() {
        // padding_probability=1.0 and bounds (10,10) give a fully
        // deterministic layout: payload + delimiter + 10 filler bytes.
        let codec = codec(1.0, 10, 10);
        let padded = codec.pad(b"hi");

        assert_eq!(padded.len(), 2 + PADDING_DELIMITER.len() + 10);
        assert_eq!(&padded[..2], b"hi");
        assert_eq!(&padded[2..2 + PADDING_DELIMITER.len()], PADDING_DELIMITER);
        assert_eq!(codec.unpad(&padded), b"hi");
    }

    #[test]
    fn test_pad_never_when_probability_zero() {
        let codec = codec(0.0, 10, 10);
        for _ in 0..20 {
            assert_eq!(codec.pad(b"payload"), b"payload");
        }
    }

    #[test]
    fn test_unpad_without_delimiter_is_identity() {
        let codec = codec(1.0, 10, 10);
        assert_eq!(codec.unpad(b"no markers here"), b"no markers here");
        assert_eq!(codec.unpad(b""), b"");
    }

    #[test]
    fn test_unpad_restores_prefix() {
        let codec = codec(1.0, 0, 200);
        let messages: [&[u8]; 4] = [b"", b"x", b"hello world", &[0u8, 255, 1, 254, 7]];
        for msg in messages {
            let padded = codec.pad(msg);
            assert_eq!(codec.unpad(&padded), msg);
        }
    }

    #[test]
    fn test_unpad_splits_on_first_delimiter() {
        let mut msg = b"head".to_vec();
        msg.extend_from_slice(PADDING_DELIMITER);
        msg.extend_from_slice(b"tail");
        msg.extend_from_slice(PADDING_DELIMITER);
        msg.extend_from_slice(b"more");

        let codec = codec(0.5, 1, 2);
        assert_eq!(codec.unpad(&msg), b"head");
    }

    #[test]
    fn test_pad_length_within_bounds() {
        let codec = codec(1.0, 5, 50);
        for _ in 0..50 {
            let padded = codec.pad(b"abc");
            let filler = padded.len() - 3 - PADDING_DELIMITER.len();
            assert!((5..=50).contains(&filler), "filler {} out of bounds", filler);
        }
    }
}

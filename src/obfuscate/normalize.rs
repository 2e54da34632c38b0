//! History-derived size normalization.
//!
//! Fixed-size buckets are cheap but wasteful; buckets derived from recent
//! traffic adapt to the actual profile at the cost of per-instance mutable
//! state. The normalizer keeps the last [`HISTORY_CAPACITY`] observed
//! lengths in a bounded ring buffer and rounds each outgoing message up to
//! the smallest power of two at or above their mean.

use std::collections::VecDeque;

use tracing::debug;

use crate::core::{HISTORY_CAPACITY, NORMALIZE_FILL_BYTE, SIZE_DELIMITER};

use super::padding::find_token;

/// Bounded ring buffer of recently observed message lengths.
///
/// Owned by exactly one [`SizeNormalizer`]; sharing a normalizer process-wide
/// to build an aggregate size profile is a deployment choice made by the
/// embedding application, not by this type.
#[derive(Debug, Clone)]
pub struct SizeHistory {
    lengths: VecDeque<usize>,
    capacity: usize,
}

impl SizeHistory {
    /// Create a history with the protocol's default capacity.
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Create a history with an explicit capacity (non-zero).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lengths: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Record an observed length, evicting the oldest entry when full.
    pub fn record(&mut self, len: usize) {
        if self.lengths.len() == self.capacity {
            self.lengths.pop_front();
        }
        self.lengths.push_back(len);
    }

    /// Arithmetic mean of the recorded lengths, if any.
    pub fn mean(&self) -> Option<f64> {
        if self.lengths.is_empty() {
            return None;
        }
        let sum: usize = self.lengths.iter().sum();
        Some(sum as f64 / self.lengths.len() as f64)
    }

    /// Number of recorded lengths.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Whether no lengths have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

impl Default for SizeHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Rounds message lengths up to a bucket derived from recent traffic.
#[derive(Debug, Clone, Default)]
pub struct SizeNormalizer {
    history: SizeHistory,
}

impl SizeNormalizer {
    /// Create a normalizer with empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `msg` to the current target bucket.
    ///
    /// The first call only seeds the history and returns the message
    /// unchanged. Afterwards the target is the smallest power of two at or
    /// above the mean of the history *excluding* the current message; the
    /// current raw length is recorded after the target is computed. Messages
    /// shorter than the target gain `target - len` filler bytes behind the
    /// size delimiter (the delimiter itself is constant overhead on every
    /// normalized message and is excluded from the bucket accounting);
    /// longer messages pass through untouched — truncation would corrupt
    /// payload.
    pub fn normalize(&mut self, msg: &[u8]) -> Vec<u8> {
        let Some(mean) = self.history.mean() else {
            self.history.record(msg.len());
            return msg.to_vec();
        };
        self.history.record(msg.len());

        let target = power_of_two_ceil(mean);
        if msg.len() >= target {
            return msg.to_vec();
        }

        let filler_len = target - msg.len();
        let mut out = Vec::with_capacity(msg.len() + SIZE_DELIMITER.len() + filler_len);
        out.extend_from_slice(msg);
        out.extend_from_slice(SIZE_DELIMITER);
        out.resize(out.len() + filler_len, NORMALIZE_FILL_BYTE);

        debug!(from = msg.len(), to = target, "normalized message size");
        out
    }

    /// Strip size-normalization filler if present.
    ///
    /// Total over arbitrary byte sequences: a message without the size
    /// delimiter is returned unchanged.
    pub fn denormalize<'a>(&self, msg: &'a [u8]) -> &'a [u8] {
        match find_token(msg, SIZE_DELIMITER) {
            Some(at) => &msg[..at],
            None => msg,
        }
    }

    /// Current bucket target, if the history has any observations.
    pub fn current_target(&self) -> Option<usize> {
        self.history.mean().map(power_of_two_ceil)
    }

    /// Mean of the recorded lengths, if any.
    pub fn mean(&self) -> Option<f64> {
        self.history.mean()
    }

    /// Read-only view of the history.
    pub fn history(&self) -> &SizeHistory {
        &self.history
    }
}

/// Smallest power of two greater than or equal to `value`.
fn power_of_two_ceil(value: f64) -> usize {
    if value <= 1.0 {
        return 1;
    }
    let exp = value.log2().ceil() as u32;
    1usize << exp.min(usize::BITS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_seeds_history() {
        let mut normalizer = SizeNormalizer::new();
        let msg = vec![b'A'; 5];
        assert_eq!(normalizer.normalize(&msg), msg);
        assert_eq!(normalizer.history().len(), 1);
    }

    #[test]
    fn test_second_call_pads_to_target() {
        // History [5] gives mean 5, target 8; a 5-byte message gains 3
        // filler bytes behind the size delimiter.
        let mut normalizer = SizeNormalizer::new();
        let msg = vec![b'A'; 5];
        normalizer.normalize(&msg);

        let out = normalizer.normalize(&msg);
        assert_eq!(out.len(), 5 + SIZE_DELIMITER.len() + 3);
        assert_eq!(&out[..5], msg.as_slice());
        assert_eq!(&out[5..5 + SIZE_DELIMITER.len()], SIZE_DELIMITER);
        assert!(out[5 + SIZE_DELIMITER.len()..]
            .iter()
            .all(|&b| b == NORMALIZE_FILL_BYTE));
        assert_eq!(normalizer.denormalize(&out), msg.as_slice());
    }

    #[test]
    fn test_never_shrinks() {
        let mut normalizer = SizeNormalizer::new();
        normalizer.normalize(&[0u8; 4]); // seed, mean 4 → target 4
        let big = vec![7u8; 64];
        assert_eq!(normalizer.normalize(&big), big);
    }

    #[test]
    fn test_target_is_power_of_two_at_least_mean() {
        let mut normalizer = SizeNormalizer::new();
        for len in [3usize, 17, 90, 200, 33] {
            normalizer.normalize(&vec![0u8; len]);
            if let Some(target) = normalizer.current_target() {
                let mean = normalizer.mean().unwrap();
                assert!(target.is_power_of_two());
                assert!(target as f64 >= mean);
            }
        }
    }

    #[test]
    fn test_target_excludes_current_message() {
        // Mean must come from the history before the current message is
        // recorded: with history [8], a 1024-byte message still targets 8.
        let mut normalizer = SizeNormalizer::new();
        normalizer.normalize(&[0u8; 8]); // seed
        let big = vec![0u8; 1024];
        let out = normalizer.normalize(&big);
        assert_eq!(out, big); // 1024 >= 8, unchanged
        // But the 1024 was recorded: mean is now (8 + 1024) / 2 = 516.
        assert_eq!(normalizer.current_target(), Some(1024));
    }

    #[test]
    fn test_denormalize_without_delimiter_is_identity() {
        let normalizer = SizeNormalizer::new();
        assert_eq!(normalizer.denormalize(b"plain"), b"plain");
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = SizeHistory::with_capacity(3);
        for len in [1, 2, 3, 4] {
            history.record(len);
        }
        assert_eq!(history.len(), 3);
        // Oldest (1) evicted: mean of [2, 3, 4].
        assert_eq!(history.mean(), Some(3.0));
    }

    #[test]
    fn test_history_capped_at_protocol_capacity() {
        let mut normalizer = SizeNormalizer::new();
        for _ in 0..(HISTORY_CAPACITY + 50) {
            normalizer.normalize(&[0u8; 16]);
        }
        assert_eq!(normalizer.history().len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_power_of_two_ceil() {
        assert_eq!(power_of_two_ceil(0.0), 1);
        assert_eq!(power_of_two_ceil(1.0), 1);
        assert_eq!(power_of_two_ceil(5.0), 8);
        assert_eq!(power_of_two_ceil(8.0), 8);
        assert_eq!(power_of_two_ceil(9.0), 16);
        assert_eq!(power_of_two_ceil(1000.0), 1024);
    }
}

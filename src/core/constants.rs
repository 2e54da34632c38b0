//! Protocol constants for the VEIL obfuscation layer.
//!
//! Wire marker tokens are part of the peer-to-peer contract and MUST match
//! bit-for-bit between encoder and decoder on both sides.

use std::time::Duration;

// =============================================================================
// WIRE MARKERS
// =============================================================================
//
// The markers are fixed human-readable byte sequences. A passive observer who
// can see plaintext (i.e. before the secure channel encrypts it) can
// fingerprint the protocol by them, and a payload that legitimately contains
// a marker is corrupted on decode — there is no escaping mechanism. Both
// weaknesses are accepted for wire compatibility; changing the tokens is a
// protocol-version decision.

/// Delimiter separating real payload from probabilistic padding filler.
pub const PADDING_DELIMITER: &[u8] = b"||PADDING||";

/// Delimiter separating payload from size-normalization filler.
pub const SIZE_DELIMITER: &[u8] = b"||SIZE||";

/// Prefix marking a fabricated decoy message.
pub const DECOY_MARKER: &[u8] = b"||DUMMY||";

/// Prefix marking an in-band hop-negotiation control message.
pub const HOP_MARKER: &[u8] = b"||HOP||";

// =============================================================================
// SIZE NORMALIZATION
// =============================================================================

/// Number of recent message lengths retained for bucket derivation.
pub const HISTORY_CAPACITY: usize = 100;

/// Byte used as size-normalization filler.
pub const NORMALIZE_FILL_BYTE: u8 = b'X';

// =============================================================================
// DECOY MESSAGES
// =============================================================================

/// Lower bound on a decoy payload length, regardless of the target mean.
pub const DECOY_MIN_LEN: usize = 20;

/// Fallback mean decoy length when no traffic has been observed yet.
pub const DECOY_DEFAULT_MEAN: usize = 100;

// =============================================================================
// FREQUENCY HOPPING
// =============================================================================

/// Smallest port offset a hop can select (0 means "base port, no hop yet").
pub const HOP_OFFSET_MIN: u16 = 1;

/// Largest port offset a hop can select.
pub const HOP_OFFSET_MAX: u16 = 10;

/// Minimum wall time between opportunistic hop checks on the client path.
pub const HOP_CHECK_THROTTLE: Duration = Duration::from_secs(5);

/// Lead time announced in a hop proposal before the switch takes effect.
pub const HOP_EFFECTIVE_LEAD: Duration = Duration::from_secs(2);

/// Tick of the server's dedicated hop loop.
pub const HOP_LOOP_TICK: Duration = Duration::from_secs(1);

/// Default base port the offset is applied to.
pub const DEFAULT_BASE_PORT: u16 = 5684;

/// Default bound on the server's in-memory message store.
pub const DEFAULT_STORE_CAPACITY: usize = 1024;

// =============================================================================
// PROFILE DEFAULTS
// =============================================================================

/// Default minimum pre-send delay.
pub const DEFAULT_DELAY_MIN: Duration = Duration::from_millis(50);

/// Default maximum pre-send delay.
pub const DEFAULT_DELAY_MAX: Duration = Duration::from_millis(500);

/// Default probability of appending padding to a message.
pub const DEFAULT_PADDING_PROBABILITY: f64 = 0.7;

/// Default minimum padding filler length in bytes.
pub const DEFAULT_PADDING_MIN: usize = 50;

/// Default maximum padding filler length in bytes.
pub const DEFAULT_PADDING_MAX: usize = 500;

/// Default minimum interval between frequency hops.
pub const DEFAULT_HOP_MIN: Duration = Duration::from_secs(30);

/// Default maximum interval between frequency hops.
pub const DEFAULT_HOP_MAX: Duration = Duration::from_secs(120);

/// Default fixed-cadence interval (zero disables fixed-cadence pacing).
pub const DEFAULT_FIXED_INTERVAL: Duration = Duration::ZERO;

/// Default minimum cadence jitter.
pub const DEFAULT_JITTER_MIN: Duration = Duration::from_millis(100);

/// Default maximum cadence jitter.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(500);

/// Default probability of replacing a request with a decoy.
pub const DEFAULT_DECOY_PROBABILITY: f64 = 0.2;

// =============================================================================
// PROFILE CORRECTION SLACK
// =============================================================================
//
// When a caller supplies an inverted bound pair (min > max), the max is
// raised to min + slack instead of rejecting the configuration.

/// Slack applied when correcting an inverted delay bound pair.
pub const DELAY_CORRECTION_SLACK: Duration = Duration::from_millis(500);

/// Slack applied when correcting an inverted padding bound pair (bytes).
pub const PADDING_CORRECTION_SLACK: usize = 100;

/// Slack applied when correcting an inverted hop-interval bound pair.
pub const HOP_CORRECTION_SLACK: Duration = Duration::from_secs(30);

// =============================================================================
// OVERLAY (ANONYMIZING NETWORK) INTEGRATION
// =============================================================================

/// Default interval between overlay identity rotations.
pub const DEFAULT_IDENTITY_ROTATION_INTERVAL: Duration = Duration::from_secs(300);

/// Fractional jitter (+/-) applied to the identity-rotation interval.
pub const IDENTITY_ROTATION_JITTER: f64 = 0.2;

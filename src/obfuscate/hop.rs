//! Frequency hopping: periodic port rotation and its in-band negotiation.
//!
//! Each peer owns a [`FrequencyHopCoordinator`] that decides *when* the
//! communication port should change: on every periodic check the elapsed
//! time since the last hop is compared against a freshly redrawn random
//! threshold from the configured interval bounds, so no fixed schedule is
//! observable from outside. The coordinator only emits a new offset; the
//! caller performs the side-specific rebind (client: new destination port,
//! server: tear down and rebind the listener, carrying application state
//! over).
//!
//! Left alone, the two peers draw their hop timing independently and can
//! diverge onto different ports with no recovery path beyond a failed
//! connection attempt. [`HopNegotiation`] removes that failure mode: the
//! side whose timer fires proposes "switch to offset N after T" over the
//! *current* port, the peer acknowledges, and both commit only once the
//! proposal has been accepted and its effective time has arrived.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::core::{
    HOP_CHECK_THROTTLE, HOP_MARKER, HOP_OFFSET_MAX, HOP_OFFSET_MIN, HopDecodeError,
    ObfuscationProfile,
};

/// Phase of the hop state machine. `Hopping` is only observable inside a
/// check that emits an offset; the coordinator returns to `Idle` before the
/// check returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopPhase {
    /// Waiting for the hop threshold to elapse.
    Idle,
    /// A hop is being emitted.
    Hopping,
}

/// Per-peer hop timer and offset drawer.
///
/// One instance per peer role; client and server instances are independent
/// and never shared.
#[derive(Debug, Clone)]
pub struct FrequencyHopCoordinator {
    hop_min: Duration,
    hop_max: Duration,
    /// Instant of the last emitted hop (or construction).
    last_hop: Instant,
    /// Offset emitted by the most recent hop; 0 until the first hop.
    offset: u16,
    phase: HopPhase,
    /// Instant of the last throttled check, for the opportunistic path.
    last_check: Option<Instant>,
}

impl FrequencyHopCoordinator {
    /// Create a coordinator from a profile's hop interval bounds.
    pub fn new(profile: &ObfuscationProfile) -> Self {
        Self {
            hop_min: profile.hop_min,
            hop_max: profile.hop_max,
            last_hop: Instant::now(),
            offset: 0,
            phase: HopPhase::Idle,
            last_check: None,
        }
    }

    /// Periodic check: emit a new port offset if the hop threshold elapsed.
    ///
    /// The threshold is redrawn uniformly from the interval bounds on every
    /// check. On a hop the internal timer resets and the new offset — drawn
    /// uniformly from `[1, 10]` — is returned; otherwise the current port
    /// stays in use.
    pub fn check(&mut self) -> Option<u16> {
        self.check_at(Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&mut self, now: Instant) -> Option<u16> {
        let threshold = uniform_duration(self.hop_min, self.hop_max);
        if now.saturating_duration_since(self.last_hop) <= threshold {
            return None;
        }

        self.phase = HopPhase::Hopping;
        let offset = rand::thread_rng().gen_range(HOP_OFFSET_MIN..=HOP_OFFSET_MAX);
        self.offset = offset;
        self.last_hop = now;
        info!(offset, "frequency hop");
        self.phase = HopPhase::Idle;
        Some(offset)
    }

    /// Opportunistic check for the client send path, throttled to at most
    /// one real check per [`HOP_CHECK_THROTTLE`] of wall time.
    pub fn check_throttled(&mut self) -> Option<u16> {
        self.check_throttled_at(Instant::now())
    }

    /// [`check_throttled`](Self::check_throttled) against an explicit clock
    /// reading.
    pub fn check_throttled_at(&mut self, now: Instant) -> Option<u16> {
        if let Some(prev) = self.last_check
            && now.saturating_duration_since(prev) < HOP_CHECK_THROTTLE
        {
            return None;
        }
        self.last_check = Some(now);
        self.check_at(now)
    }

    /// Offset drawn by the most recent hop (0 before the first hop).
    pub fn current_offset(&self) -> u16 {
        self.offset
    }

    /// Current phase; always [`HopPhase::Idle`] between checks.
    pub fn phase(&self) -> HopPhase {
        self.phase
    }

    /// Draw a sleep interval for a dedicated hop loop.
    pub fn draw_interval(&self) -> Duration {
        uniform_duration(self.hop_min, self.hop_max)
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

// ---------------------------------------------------------------------------
// In-band negotiation wire messages
// ---------------------------------------------------------------------------

/// Negotiation message kind: proposal.
const KIND_PROPOSAL: u8 = 0x01;
/// Negotiation message kind: acceptance.
const KIND_ACCEPT: u8 = 0x02;

/// Wire size of a proposal: marker + kind + offset (LE16) + effective ms (LE32).
const PROPOSAL_WIRE_SIZE: usize = HOP_MARKER.len() + 1 + 2 + 4;
/// Wire size of an acceptance: marker + kind + offset (LE16).
const ACCEPT_WIRE_SIZE: usize = HOP_MARKER.len() + 1 + 2;

/// Whether a raw inbound message is a hop-negotiation control message.
pub fn is_negotiation(msg: &[u8]) -> bool {
    msg.starts_with(HOP_MARKER)
}

/// "Switch to `base_port + offset` once `effective_in` has elapsed."
///
/// Sent over the *current* port by the side whose hop timer fired.
///
/// Wire format:
/// ```text
/// +0   marker `||HOP||`
/// +7   kind (0x01)
/// +8   port offset (2 bytes LE16)
/// +10  effective-in milliseconds (4 bytes LE32)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopProposal {
    /// Proposed port offset in `[1, 10]`.
    pub offset: u16,
    /// Lead time before the switch takes effect.
    pub effective_in: Duration,
}

impl HopProposal {
    /// Encode to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let millis = u32::try_from(self.effective_in.as_millis()).unwrap_or(u32::MAX);
        let mut buf = Vec::with_capacity(PROPOSAL_WIRE_SIZE);
        buf.extend_from_slice(HOP_MARKER);
        buf.push(KIND_PROPOSAL);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&millis.to_le_bytes());
        buf
    }

    /// Decode from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, HopDecodeError> {
        let body = negotiation_body(data, KIND_PROPOSAL)?;
        if body.len() < 6 {
            return Err(HopDecodeError::TooShort {
                expected: PROPOSAL_WIRE_SIZE,
                actual: data.len(),
            });
        }
        let offset = u16::from_le_bytes(body[0..2].try_into().expect("length checked above"));
        if !(HOP_OFFSET_MIN..=HOP_OFFSET_MAX).contains(&offset) {
            return Err(HopDecodeError::OffsetOutOfRange(offset));
        }
        let millis = u32::from_le_bytes(body[2..6].try_into().expect("length checked above"));
        Ok(Self {
            offset,
            effective_in: Duration::from_millis(millis as u64),
        })
    }
}

/// Acknowledgment of a [`HopProposal`], echoing the offset.
///
/// Wire format:
/// ```text
/// +0   marker `||HOP||`
/// +7   kind (0x02)
/// +8   port offset (2 bytes LE16)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopAccept {
    /// Accepted port offset.
    pub offset: u16,
}

impl HopAccept {
    /// Encode to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ACCEPT_WIRE_SIZE);
        buf.extend_from_slice(HOP_MARKER);
        buf.push(KIND_ACCEPT);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf
    }

    /// Decode from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, HopDecodeError> {
        let body = negotiation_body(data, KIND_ACCEPT)?;
        if body.len() < 2 {
            return Err(HopDecodeError::TooShort {
                expected: ACCEPT_WIRE_SIZE,
                actual: data.len(),
            });
        }
        let offset = u16::from_le_bytes(body[0..2].try_into().expect("length checked above"));
        if !(HOP_OFFSET_MIN..=HOP_OFFSET_MAX).contains(&offset) {
            return Err(HopDecodeError::OffsetOutOfRange(offset));
        }
        Ok(Self { offset })
    }
}

/// Validate the marker and kind byte, returning the field bytes.
fn negotiation_body(data: &[u8], expected_kind: u8) -> Result<&[u8], HopDecodeError> {
    if !data.starts_with(HOP_MARKER) {
        return Err(HopDecodeError::NotNegotiation);
    }
    let rest = &data[HOP_MARKER.len()..];
    let Some((&kind, body)) = rest.split_first() else {
        return Err(HopDecodeError::TooShort {
            expected: HOP_MARKER.len() + 1,
            actual: data.len(),
        });
    };
    if kind != expected_kind {
        return Err(HopDecodeError::UnknownKind(kind));
    }
    Ok(body)
}

// ---------------------------------------------------------------------------
// Pairing state for the two-message handshake
// ---------------------------------------------------------------------------

/// A proposed hop waiting for acknowledgment and/or its effective time.
#[derive(Debug, Clone, Copy)]
struct PendingHop {
    offset: u16,
    effective_at: Instant,
    acked: bool,
}

/// Drives the two-message hop handshake on one peer.
///
/// The initiating side calls [`propose`](Self::propose) when its coordinator
/// fires and [`on_accept`](Self::on_accept) when the peer acknowledges; the
/// responding side calls [`on_proposal`](Self::on_proposal). Both sides poll
/// [`commit_due`](Self::commit_due) and switch ports only when it yields an
/// offset — an unacknowledged proposal expires via
/// [`abandon`](Self::abandon) and leaves both peers on the old port.
#[derive(Debug, Clone, Default)]
pub struct HopNegotiation {
    pending: Option<PendingHop>,
}

impl HopNegotiation {
    /// Create an idle negotiation state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initiator: record a proposal for `offset` effective after
    /// `effective_in`, returning the wire message to send to the peer.
    pub fn propose(&mut self, offset: u16, effective_in: Duration) -> HopProposal {
        self.pending = Some(PendingHop {
            offset,
            effective_at: Instant::now() + effective_in,
            acked: false,
        });
        debug!(offset, "proposing hop");
        HopProposal {
            offset,
            effective_in,
        }
    }

    /// Responder: accept a received proposal, returning the acknowledgment
    /// to send back. The responder considers the hop agreed as soon as it
    /// acknowledges.
    pub fn on_proposal(&mut self, proposal: &HopProposal, now: Instant) -> HopAccept {
        self.pending = Some(PendingHop {
            offset: proposal.offset,
            effective_at: now + proposal.effective_in,
            acked: true,
        });
        debug!(offset = proposal.offset, "accepting hop proposal");
        HopAccept {
            offset: proposal.offset,
        }
    }

    /// Initiator: process the peer's acknowledgment. Returns `false` (and
    /// abandons the proposal) when the echoed offset does not match.
    pub fn on_accept(&mut self, accept: &HopAccept) -> bool {
        match self.pending {
            Some(ref mut pending) if pending.offset == accept.offset => {
                pending.acked = true;
                true
            }
            _ => {
                warn!(offset = accept.offset, "unexpected hop acknowledgment");
                self.pending = None;
                false
            }
        }
    }

    /// Commit the agreed hop once its effective time has arrived.
    ///
    /// Returns the offset to switch to exactly once per agreed hop.
    pub fn commit_due(&mut self, now: Instant) -> Option<u16> {
        match self.pending {
            Some(pending) if pending.acked && now >= pending.effective_at => {
                self.pending = None;
                Some(pending.offset)
            }
            _ => None,
        }
    }

    /// Drop an in-flight proposal (e.g. the peer never acknowledged); both
    /// peers stay on the old port.
    pub fn abandon(&mut self) {
        if self.pending.take().is_some() {
            debug!("abandoning hop proposal");
        }
    }

    /// Whether a hop is currently proposed or agreed but not yet committed.
    pub fn in_flight(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(min: Duration, max: Duration) -> FrequencyHopCoordinator {
        FrequencyHopCoordinator::new(&ObfuscationProfile::builder().hop_bounds(min, max).build())
    }

    #[test]
    fn test_no_hop_below_threshold() {
        // With min == max the threshold is deterministic: elapsed time below
        // it never emits an offset, no matter how often we check.
        let mut hop = coordinator(Duration::from_secs(60), Duration::from_secs(60));
        let start = Instant::now();
        for i in 0..50 {
            assert_eq!(hop.check_at(start + Duration::from_millis(i * 100)), None);
        }
        assert_eq!(hop.current_offset(), 0);
        assert_eq!(hop.phase(), HopPhase::Idle);
    }

    #[test]
    fn test_hop_when_forced_past_max() {
        let mut hop = coordinator(Duration::from_secs(30), Duration::from_secs(60));
        let start = Instant::now();

        let offset = hop.check_at(start + Duration::from_secs(61));
        let offset = offset.expect("elapsed time beyond hop_max must emit");
        assert!((HOP_OFFSET_MIN..=HOP_OFFSET_MAX).contains(&offset));
        assert_eq!(hop.current_offset(), offset);

        // The timer reset: an immediate re-check emits nothing.
        assert_eq!(hop.check_at(start + Duration::from_secs(61)), None);
    }

    #[test]
    fn test_check_throttled() {
        let mut hop = coordinator(Duration::from_millis(1), Duration::from_millis(1));
        let start = Instant::now();

        // First throttled check runs (and hops, threshold is 1 ms).
        assert!(hop.check_throttled_at(start + Duration::from_secs(1)).is_some());
        // Within the throttle window nothing runs, even though the tiny
        // threshold has elapsed again.
        assert_eq!(
            hop.check_throttled_at(start + Duration::from_secs(3)),
            None
        );
        // Past the window the check runs again.
        assert!(hop
            .check_throttled_at(start + Duration::from_secs(7))
            .is_some());
    }

    #[test]
    fn test_proposal_roundtrip() {
        let proposal = HopProposal {
            offset: 7,
            effective_in: Duration::from_millis(2000),
        };
        let encoded = proposal.encode();
        assert!(is_negotiation(&encoded));
        assert_eq!(HopProposal::decode(&encoded).unwrap(), proposal);
    }

    #[test]
    fn test_accept_roundtrip() {
        let accept = HopAccept { offset: 3 };
        let encoded = accept.encode();
        assert!(is_negotiation(&encoded));
        assert_eq!(HopAccept::decode(&encoded).unwrap(), accept);
    }

    #[test]
    fn test_decode_rejects_non_negotiation() {
        assert_eq!(
            HopProposal::decode(b"||DUMMY||junk"),
            Err(HopDecodeError::NotNegotiation)
        );
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let mut encoded = HopProposal {
            offset: 2,
            effective_in: Duration::from_secs(1),
        }
        .encode();
        encoded.truncate(encoded.len() - 3);
        assert!(matches!(
            HopProposal::decode(&encoded),
            Err(HopDecodeError::TooShort { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_kind() {
        let accept = HopAccept { offset: 2 }.encode();
        assert!(matches!(
            HopProposal::decode(&accept),
            Err(HopDecodeError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_decode_rejects_out_of_range_offset() {
        let mut encoded = HopProposal {
            offset: 5,
            effective_in: Duration::from_secs(1),
        }
        .encode();
        // Corrupt the offset field to 99.
        let at = HOP_MARKER.len() + 1;
        encoded[at..at + 2].copy_from_slice(&99u16.to_le_bytes());
        assert_eq!(
            HopProposal::decode(&encoded),
            Err(HopDecodeError::OffsetOutOfRange(99))
        );
    }

    #[test]
    fn test_negotiation_happy_path() {
        let mut initiator = HopNegotiation::new();
        let mut responder = HopNegotiation::new();
        let now = Instant::now();

        let proposal = initiator.propose(4, Duration::from_millis(0));
        let accept = responder.on_proposal(&proposal, now);
        assert!(initiator.on_accept(&accept));

        // Effective immediately: both sides commit the same offset once.
        let later = Instant::now() + Duration::from_millis(1);
        assert_eq!(initiator.commit_due(later), Some(4));
        assert_eq!(initiator.commit_due(later), None);
        assert_eq!(responder.commit_due(later), Some(4));
    }

    #[test]
    fn test_negotiation_not_committed_before_effective_time() {
        let mut initiator = HopNegotiation::new();
        let proposal = initiator.propose(2, Duration::from_secs(60));
        let accept = HopAccept {
            offset: proposal.offset,
        };
        assert!(initiator.on_accept(&accept));
        assert_eq!(initiator.commit_due(Instant::now()), None);
        assert!(initiator.in_flight());
    }

    #[test]
    fn test_negotiation_unacked_never_commits() {
        let mut initiator = HopNegotiation::new();
        initiator.propose(2, Duration::from_millis(0));
        assert_eq!(
            initiator.commit_due(Instant::now() + Duration::from_secs(1)),
            None
        );
        initiator.abandon();
        assert!(!initiator.in_flight());
    }

    #[test]
    fn test_negotiation_mismatched_accept() {
        let mut initiator = HopNegotiation::new();
        initiator.propose(2, Duration::from_millis(0));
        assert!(!initiator.on_accept(&HopAccept { offset: 9 }));
        assert!(!initiator.in_flight());
    }
}

//! The per-message obfuscation pipeline.
//!
//! [`ObfuscationFacade`] composes the padding codec, size normalizer, decoy
//! injector, pacing scheduler and hop coordinator into the two pipelines the
//! transport-facing code invokes: outbound (client request path, server
//! response path) and inbound. It also exposes the read-only status snapshot
//! used for operator-facing reporting.

use tracing::debug;

use crate::core::{DECOY_DEFAULT_MEAN, ObfuscationProfile};

use super::decoy::DecoyInjector;
use super::hop::FrequencyHopCoordinator;
use super::normalize::SizeNormalizer;
use super::pacing::PacingScheduler;
use super::padding::PaddingCodec;

/// A message shaped for transmission.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// The bytes to hand to the transport.
    pub bytes: Vec<u8>,
    /// Port offset the transport should currently send to.
    pub port_offset: u16,
    /// Whether the original message was replaced by a decoy; the caller must
    /// not treat the eventual reply as meaningful.
    pub is_decoy: bool,
}

/// Result of the inbound pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A real payload, stripped of all obfuscation.
    Payload(Vec<u8>),
    /// A decoy; drop before application logic.
    Decoy,
}

/// Read-only snapshot of the active obfuscation parameters.
///
/// Purely observational, for operator-facing status reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ObfuscationStatus {
    /// Port offset currently in use (0 = base port).
    pub port_offset: u16,
    /// Active padding probability.
    pub padding_probability: f64,
    /// Active pre-send delay bounds.
    pub delay_bounds: (std::time::Duration, std::time::Duration),
    /// Active decoy probability.
    pub decoy_probability: f64,
    /// Fixed-cadence interval (zero = disabled).
    pub fixed_interval: std::time::Duration,
    /// Whether frequency hopping is enabled.
    pub hop_enabled: bool,
}

/// Composes the obfuscation components into the per-message pipeline.
///
/// One facade per session; all mutable state inside (size history, pacing
/// state, hop state) has this facade as its single writer.
#[derive(Debug)]
pub struct ObfuscationFacade {
    profile: ObfuscationProfile,
    padding: PaddingCodec,
    normalizer: SizeNormalizer,
    decoy: DecoyInjector,
    pacing: PacingScheduler,
    hop: FrequencyHopCoordinator,
    /// Offset actually in use for sends; distinct from the coordinator's
    /// drawn offset so negotiated hops commit only once agreed.
    active_offset: u16,
}

impl ObfuscationFacade {
    /// Create a facade for one session from a profile.
    pub fn new(profile: ObfuscationProfile) -> Self {
        Self {
            padding: PaddingCodec::new(&profile),
            normalizer: SizeNormalizer::new(),
            decoy: DecoyInjector::new(&profile),
            pacing: PacingScheduler::new(&profile),
            hop: FrequencyHopCoordinator::new(&profile),
            active_offset: 0,
            profile,
        }
    }

    /// Shape an outbound message without applying any timing: optional decoy
    /// replacement (requests only), padding, then size normalization.
    pub fn shape_outbound(&mut self, msg: &[u8], is_request: bool) -> Outbound {
        let is_decoy = is_request && self.decoy.should_inject();
        let body = if is_decoy {
            let mean = self
                .normalizer
                .mean()
                .map(|m| m as usize)
                .unwrap_or(DECOY_DEFAULT_MEAN);
            debug!("replacing request with decoy");
            self.decoy.create_decoy(mean)
        } else {
            msg.to_vec()
        };

        let padded = self.padding.pad(&body);
        let bytes = self.normalizer.normalize(&padded);

        Outbound {
            bytes,
            port_offset: self.active_offset,
            is_decoy,
        }
    }

    /// Full outbound pipeline: pre-send delay, cadence wait, then shaping.
    ///
    /// The suspension points are cooperative; dropping the future cancels
    /// the send and the message never reaches the transport.
    #[cfg(feature = "transport")]
    pub async fn prepare_outbound(&mut self, msg: &[u8], is_request: bool) -> Outbound {
        self.pacing.apply_presend_delay().await;
        self.pacing.pace().await;
        self.shape_outbound(msg, is_request)
    }

    /// Inbound pipeline: strip normalization, strip padding, detect decoys.
    ///
    /// Total over arbitrary byte sequences — messages without markers pass
    /// through as plain payloads ("no obfuscation was applied" is never an
    /// error).
    pub fn process_inbound(&self, bytes: &[u8]) -> Inbound {
        let shed = self.normalizer.denormalize(bytes);
        let unpadded = self.padding.unpad(shed);
        if self.decoy.is_decoy(unpadded) {
            debug!("dropping inbound decoy");
            Inbound::Decoy
        } else {
            Inbound::Payload(unpadded.to_vec())
        }
    }

    /// Throttled opportunistic hop check for the request path. Returns a
    /// *candidate* offset; nothing changes until [`commit_offset`]
    /// (negotiated deployments commit only after the peer acknowledges).
    ///
    /// [`commit_offset`]: Self::commit_offset
    pub fn poll_hop_throttled(&mut self) -> Option<u16> {
        if !self.profile.hop_enabled {
            return None;
        }
        self.hop.check_throttled()
    }

    /// Unthrottled hop check for a dedicated loop (server side).
    pub fn poll_hop(&mut self) -> Option<u16> {
        if !self.profile.hop_enabled {
            return None;
        }
        self.hop.check()
    }

    /// Put a hop into effect: subsequent outbound messages carry `offset`.
    pub fn commit_offset(&mut self, offset: u16) {
        self.active_offset = offset;
    }

    /// Port offset currently in use (0 = base port).
    pub fn port_offset(&self) -> u16 {
        self.active_offset
    }

    /// Read-only status snapshot for operator reporting.
    pub fn status(&self) -> ObfuscationStatus {
        ObfuscationStatus {
            port_offset: self.active_offset,
            padding_probability: self.profile.padding_probability,
            delay_bounds: (self.profile.delay_min, self.profile.delay_max),
            decoy_probability: self.profile.decoy_probability,
            fixed_interval: self.profile.fixed_interval,
            hop_enabled: self.profile.hop_enabled,
        }
    }

    /// The profile this facade was built from.
    pub fn profile(&self) -> &ObfuscationProfile {
        &self.profile
    }
}

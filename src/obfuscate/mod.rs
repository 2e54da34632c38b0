//! VEIL Protocol - Obfuscation Pipeline
//!
//! This module implements the per-message transforms and timing machinery of
//! the obfuscation layer:
//!
//! - **Padding**: [`PaddingCodec`] probabilistic length-disguising filler
//! - **Size normalization**: [`SizeNormalizer`] history-derived power-of-two
//!   buckets over a bounded [`SizeHistory`]
//! - **Decoys**: [`DecoyInjector`] fabricated messages hiding true volume
//! - **Pacing**: [`PacingScheduler`] jittered delays and fixed-cadence waits
//! - **Frequency hopping**: [`FrequencyHopCoordinator`] port rotation, with
//!   in-band [`HopProposal`]/[`HopAccept`] negotiation
//! - **Facade**: [`ObfuscationFacade`] composing the above into the outbound
//!   and inbound pipelines
//!
//! # Architecture
//!
//! ```text
//! outbound:  pacing → decoy? → pad → normalize → transport
//! inbound:   transport → denormalize → unpad → decoy check → application
//! ```
//!
//! All mutable state (size history, pacing state, hop state) is owned by
//! exactly one instance per session and must not be shared between call
//! sites without external synchronization. The transforms themselves are
//! total over arbitrary byte sequences and never panic.

mod decoy;
mod facade;
mod hop;
mod normalize;
mod padding;
mod pacing;

pub use decoy::DecoyInjector;
pub use facade::{Inbound, ObfuscationFacade, ObfuscationStatus, Outbound};
pub use hop::{
    FrequencyHopCoordinator, HopAccept, HopNegotiation, HopPhase, HopProposal, is_negotiation,
};
pub use normalize::{SizeHistory, SizeNormalizer};
pub use padding::PaddingCodec;
pub use pacing::PacingScheduler;

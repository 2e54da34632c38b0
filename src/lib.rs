//! # VEIL Protocol
//!
//! **V**olume & **E**ndpoint **I**ndistinguishability **L**ayer
//!
//! VEIL is a metadata-resistance layer placed in front of a request/response
//! transport. It defeats traffic-analysis techniques that work even against
//! encrypted channels:
//!
//! - **Size correlation**: probabilistic padding and history-derived size
//!   normalization disguise true message lengths
//! - **Timing correlation**: jittered pre-send delays and optional
//!   fixed-cadence pacing flatten inter-arrival patterns
//! - **Volume analysis**: decoy messages obscure true communication volume
//! - **Endpoint fingerprinting**: coordinated port rotation (frequency
//!   hopping) resists fixed-endpoint correlation
//!
//! VEIL is a defense-in-depth layer: it assumes an already-encrypted
//! secure-datagram transport underneath (see [`transport`]) and adds no
//! cryptography of its own. It deliberately does not address every
//! traffic-analysis technique — packet-count correlation over long windows
//! is out of scope.
//!
//! ## Feature Flags
//!
//! - `transport` (default): Transport seam and async suspension points
//! - `client` (default): High-level client API (request path)
//! - `server` (default): High-level server API (response path, hop rebind)
//!
//! ## Modules
//!
//! - [`core`]: Profile, constants, and error types (always included)
//! - [`obfuscate`]: Per-message transforms and timing/hop machinery
//! - [`transport`]: Collaborator seams (requires `transport` feature)
//! - [`client`] / [`server`]: Peer APIs (feature-gated)
//!
//! ## Example Usage
//!
//! ```rust
//! use veil_protocol::prelude::*;
//!
//! // Build a profile (normally loaded from the environment)
//! let profile = ObfuscationProfile::builder()
//!     .padding_probability(1.0)
//!     .padding_bounds(10, 10)
//!     .build();
//!
//! let codec = PaddingCodec::new(&profile);
//! let padded = codec.pad(b"hi");
//! assert_eq!(codec.unpad(&padded), b"hi");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Obfuscation pipeline (always included; async appliers are feature-gated)
pub mod obfuscate;

// Transport seams (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use crate::core::*;

    // Obfuscation pipeline
    pub use crate::obfuscate::{
        DecoyInjector, FrequencyHopCoordinator, HopAccept, HopNegotiation, HopPhase, HopProposal,
        Inbound, ObfuscationFacade, ObfuscationStatus, Outbound, PacingScheduler, PaddingCodec,
        SizeHistory, SizeNormalizer,
    };

    // Transport seams (when enabled)
    #[cfg(feature = "transport")]
    pub use crate::transport::{
        DisabledOverlay, ListenerFactory, OverlayNetwork, RequestResponder, RotationSchedule,
        SecureListener, SecureTransport,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{ObfuscationProfile, TransportError, VeilError};
pub use crate::obfuscate::{ObfuscationFacade, PaddingCodec, SizeNormalizer};

//! VEIL Protocol - Collaborator Seams
//!
//! The obfuscation layer neither creates nor inspects the secure channel: it
//! consumes a narrow interface over an external secure-datagram transport
//! (an opaque byte pipe with a changeable destination port) and, optionally,
//! an anonymizing-overlay daemon. This module defines those seams:
//!
//! - [`SecureTransport`]: client-side byte pipe (`send`/`receive`/`close`)
//! - [`ListenerFactory`] / [`SecureListener`] / [`RequestResponder`]:
//!   server-side endpoint lifecycle, rebindable per frequency hop
//! - [`OverlayNetwork`]: reachability probe and identity rotation for an
//!   external mixing network
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Application Logic               │
//! ├─────────────────────────────────────────┤
//! │         Obfuscation Layer               │  ← this crate
//! │   padding, sizing, decoys, pacing, hops │
//! ├─────────────────────────────────────────┤
//! │     Secure Datagram Transport           │  ← behind these seams
//! │   (handshake, record encryption)        │
//! ├─────────────────────────────────────────┤
//! │   Anonymizing Overlay (optional)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Transport errors pass through the obfuscation layer unchanged; retry
//! policy belongs to the caller. Callers sizing request timeouts must
//! accommodate `delay_max + fixed_interval + jitter_max` of obfuscation
//! latency on top of network time.

mod overlay;

pub use overlay::{DisabledOverlay, OverlayNetwork, RotationSchedule};

use crate::core::TransportError;

/// Client-side seam over the secure-datagram transport.
///
/// The transport owns connection lifecycle and credentials; the obfuscation
/// layer only hands it shaped bytes and a current port offset. The offset is
/// relative to the base port agreed out of band.
pub trait SecureTransport {
    /// Send a shaped message to the destination at the given port offset.
    fn send(
        &mut self,
        port_offset: u16,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Await the next inbound message. The transport applies its own
    /// timeout and surfaces it as [`TransportError::Timeout`].
    fn receive(&mut self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Tear down the channel.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Server-side seam: binds fresh listening endpoints.
///
/// A frequency hop tears the current listener down and binds a fresh one on
/// the new port; the factory is what makes that rebind possible.
pub trait ListenerFactory {
    /// The listener type this factory produces.
    type Listener: SecureListener;

    /// Bind a listening endpoint on `port`.
    fn bind(
        &self,
        port: u16,
    ) -> impl Future<Output = Result<Self::Listener, TransportError>> + Send;
}

/// A bound listening endpoint accepting obfuscated requests.
pub trait SecureListener: Send {
    /// Reply handle for a single accepted request.
    type Responder: RequestResponder;

    /// Await the next request: its raw bytes plus a one-shot reply handle.
    ///
    /// Must be cancellation-safe: the server polls `accept` under a timeout
    /// so it can interleave hop and shutdown bookkeeping, and a dropped
    /// `accept` future must not lose a request.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<(Vec<u8>, Self::Responder), TransportError>> + Send;

    /// Tear down this endpoint. Requests addressed to it afterwards fail at
    /// the transport (connection refused); they are not migrated.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// One-shot reply handle for an accepted request.
pub trait RequestResponder: Send {
    /// Send the shaped response bytes back to the requester.
    fn respond(
        self,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Optional opaque hint about the requesting peer (e.g. a source
    /// address rendered by the transport). Used only to derive anonymized
    /// display labels; never logged or stored verbatim.
    fn peer_hint(&self) -> Option<&str> {
        None
    }
}

//! Error types for the VEIL obfuscation layer.
//!
//! Configuration problems are deliberately absent here: out-of-range profile
//! values are clamped with a logged warning at construction and are never
//! fatal. Likewise, missing markers on received messages mean "no obfuscation
//! was applied" and decode as plain payloads — the padding, normalization and
//! decoy transforms are total over arbitrary byte sequences.

use thiserror::Error;

/// Errors surfaced by the secure-datagram transport collaborator.
///
/// These pass through the obfuscation layer unchanged; retry policy belongs
/// to the caller. Hop desynchronization is not distinguishable from ordinary
/// network failure at this layer — it manifests as [`TransportError::Refused`]
/// after a peer rebinds.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No reply arrived within the transport's own timeout.
    #[error("receive timed out")]
    Timeout,

    /// The destination port refused the connection.
    #[error("connection refused on port {0}")]
    Refused(u16),

    /// The channel was closed.
    #[error("transport closed")]
    Closed,

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from decoding a hop-negotiation control message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HopDecodeError {
    /// Input buffer is too short to contain a valid negotiation message.
    #[error("buffer too short: expected {expected}, got {actual}")]
    TooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// The buffer does not start with the hop-negotiation marker.
    #[error("not a hop-negotiation message")]
    NotNegotiation,

    /// Unknown negotiation message kind.
    #[error("unknown negotiation kind: 0x{0:02x}")]
    UnknownKind(u8),

    /// The proposed port offset is outside the hop range.
    #[error("port offset {0} outside the hop range")]
    OffsetOutOfRange(u16),
}

/// Top-level VEIL errors.
#[derive(Debug, Error)]
pub enum VeilError {
    /// Transport error, surfaced unchanged.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Hop negotiation decode error.
    #[error("hop negotiation error: {0}")]
    HopDecode(#[from] HopDecodeError),
}

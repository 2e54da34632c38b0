//! High-level VEIL client API.
//!
//! Provides [`VeilClient`] wrapping a [`SecureTransport`] with the full
//! obfuscation pipeline on the request path: throttled hop checks with
//! negotiated rotation, pacing, decoy replacement, padding, and size
//! normalization on the way out; denormalization, unpadding, and decoy
//! detection on the way back.

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::{HOP_EFFECTIVE_LEAD, HopDecodeError, ObfuscationProfile, TransportError};
use crate::obfuscate::{HopAccept, HopNegotiation, Inbound, ObfuscationFacade, ObfuscationStatus};
use crate::transport::{OverlayNetwork, SecureTransport};

/// Errors that can occur in the VEIL client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error, surfaced unchanged (retry belongs to the caller).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The peer's hop acknowledgment could not be decoded.
    #[error("hop negotiation error: {0}")]
    HopNegotiation(#[from] HopDecodeError),
}

/// A VEIL protocol client: the request path of the obfuscation layer.
///
/// Owns one session's obfuscation state; create one client per logical
/// session and do not share it between tasks without external
/// synchronization. Dropping an in-flight [`request`](Self::request) future
/// cancels any pending pacing wait and the message is never sent.
pub struct VeilClient<T: SecureTransport> {
    transport: T,
    facade: ObfuscationFacade,
    negotiation: HopNegotiation,
    user_label: String,
}

impl<T: SecureTransport> VeilClient<T> {
    /// Create a client over an established secure transport.
    pub fn new(transport: T, profile: ObfuscationProfile) -> Self {
        Self {
            transport,
            facade: ObfuscationFacade::new(profile),
            negotiation: HopNegotiation::new(),
            user_label: anonymous_label(),
        }
    }

    /// Override the anonymized user label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.user_label = label.into();
        self
    }

    /// Send a request through the obfuscation pipeline and await the reply.
    ///
    /// Returns `Ok(None)` when the reply is a decoy, or when this request
    /// was itself replaced by a decoy (the sender of a decoy never processes
    /// the reply). Transport errors surface unchanged.
    pub async fn request(&mut self, payload: &[u8]) -> Result<Option<Vec<u8>>, ClientError> {
        self.drive_hop().await?;

        let out = self.facade.prepare_outbound(payload, true).await;
        self.transport.send(out.port_offset, &out.bytes).await?;
        let reply = self.transport.receive().await?;

        match self.facade.process_inbound(&reply) {
            Inbound::Decoy => {
                debug!("discarding decoy reply");
                Ok(None)
            }
            Inbound::Payload(_) if out.is_decoy => {
                debug!("discarding reply to decoy request");
                Ok(None)
            }
            Inbound::Payload(bytes) => Ok(Some(bytes)),
        }
    }

    /// Commit a due negotiated hop and, at most once per throttle window,
    /// run the opportunistic hop check and drive the proposal handshake.
    async fn drive_hop(&mut self) -> Result<(), ClientError> {
        if let Some(offset) = self.negotiation.commit_due(Instant::now()) {
            info!(offset, "switching to negotiated port offset");
            self.facade.commit_offset(offset);
        }

        if self.negotiation.in_flight() {
            return Ok(());
        }
        let Some(candidate) = self.facade.poll_hop_throttled() else {
            return Ok(());
        };

        // Propose the hop over the current port and wait for the peer's
        // acknowledgment before anything changes.
        let proposal = self.negotiation.propose(candidate, HOP_EFFECTIVE_LEAD);
        let current = self.facade.port_offset();
        self.transport.send(current, &proposal.encode()).await?;

        match self.transport.receive().await {
            Ok(reply) => match HopAccept::decode(&reply) {
                Ok(accept) if self.negotiation.on_accept(&accept) => {
                    debug!(offset = accept.offset, "hop proposal acknowledged");
                }
                Ok(accept) => {
                    warn!(offset = accept.offset, "mismatched hop acknowledgment");
                }
                Err(err) => {
                    warn!(%err, "undecodable hop acknowledgment, abandoning hop");
                    self.negotiation.abandon();
                }
            },
            Err(err) => {
                warn!(%err, "no hop acknowledgment, staying on current port");
                self.negotiation.abandon();
            }
        }
        Ok(())
    }

    /// Read-only obfuscation status for operator reporting.
    pub fn status(&self) -> ObfuscationStatus {
        self.facade.status()
    }

    /// Anonymized display label for this client.
    pub fn user_label(&self) -> &str {
        &self.user_label
    }

    /// Request a fresh identity from the anonymizing overlay, if one is
    /// configured. Operator-driven; unrelated to port hopping.
    pub async fn rotate_overlay_identity<O: OverlayNetwork>(&self, overlay: &mut O) -> bool {
        if !overlay.is_reachable().await {
            warn!("overlay not reachable, identity rotation skipped");
            return false;
        }
        overlay.rotate_identity().await
    }

    /// Tear down the underlying transport.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.transport.close().await?;
        Ok(())
    }
}

/// Hash-free anonymized label: avoids tying the session to any host
/// identity by construction.
fn anonymous_label() -> String {
    use rand::Rng;
    format!("user-{:04}", rand::thread_rng().gen_range(0..10_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DECOY_MARKER, HOP_MARKER};
    use crate::obfuscate::HopProposal;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// In-memory transport scripted with canned replies.
    struct ScriptedTransport {
        replies: VecDeque<Vec<u8>>,
        sent: Vec<(u16, Vec<u8>)>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Vec<u8>>) -> Self {
            Self {
                replies: replies.into(),
                sent: Vec::new(),
            }
        }
    }

    impl SecureTransport for ScriptedTransport {
        async fn send(&mut self, port_offset: u16, bytes: &[u8]) -> Result<(), TransportError> {
            self.sent.push((port_offset, bytes.to_vec()));
            Ok(())
        }

        async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
            self.replies.pop_front().ok_or(TransportError::Timeout)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn quiet_profile() -> ObfuscationProfile {
        ObfuscationProfile::builder()
            .delay_bounds(Duration::ZERO, Duration::ZERO)
            .padding_probability(0.0)
            .decoy_probability(0.0)
            .hop_enabled(false)
            .build()
    }

    #[tokio::test]
    async fn test_request_roundtrip() {
        let transport = ScriptedTransport::new(vec![b"pong".to_vec()]);
        let mut client = VeilClient::new(transport, quiet_profile());

        let reply = client.request(b"ping").await.unwrap();
        assert_eq!(reply, Some(b"pong".to_vec()));
    }

    #[tokio::test]
    async fn test_decoy_reply_discarded() {
        let mut decoy_reply = DECOY_MARKER.to_vec();
        decoy_reply.extend_from_slice(b"noise");
        let transport = ScriptedTransport::new(vec![decoy_reply]);
        let mut client = VeilClient::new(transport, quiet_profile());

        let reply = client.request(b"ping").await.unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_decoy_request_discards_real_reply() {
        let profile = ObfuscationProfile::builder()
            .delay_bounds(Duration::ZERO, Duration::ZERO)
            .padding_probability(0.0)
            .decoy_probability(1.0)
            .hop_enabled(false)
            .build();
        let transport = ScriptedTransport::new(vec![b"meaningful".to_vec()]);
        let mut client = VeilClient::new(transport, profile);

        let reply = client.request(b"ping").await.unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_transport_timeout_surfaces() {
        let transport = ScriptedTransport::new(vec![]);
        let mut client = VeilClient::new(transport, quiet_profile());

        let err = client.request(b"ping").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_unacknowledged_proposal_keeps_current_port() {
        // Hop bounds of zero make the throttled check fire on the first
        // request; the scripted peer never acknowledges.
        let profile = ObfuscationProfile::builder()
            .delay_bounds(Duration::ZERO, Duration::ZERO)
            .padding_probability(0.0)
            .decoy_probability(0.0)
            .hop_bounds(Duration::ZERO, Duration::ZERO)
            .build();

        let transport = ScriptedTransport::new(vec![]);
        let mut client = VeilClient::new(transport, profile);

        // The ack times out, the proposal is abandoned, and the request
        // itself then fails on the empty script — all on the old port.
        let err = client.request(b"ping").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Timeout)));
        assert_eq!(client.status().port_offset, 0);
        assert!(!client.negotiation.in_flight());

        // The proposal did go out on the wire, on the current port.
        let (port, bytes) = &client.transport.sent[0];
        assert_eq!(*port, 0);
        assert!(bytes.starts_with(HOP_MARKER));
        let proposal = HopProposal::decode(bytes).unwrap();
        assert!((1..=10).contains(&proposal.offset));
    }

    #[tokio::test]
    async fn test_negotiated_hop_commit_applied() {
        let transport = ScriptedTransport::new(vec![b"ok".to_vec()]);
        let mut client = VeilClient::new(transport, quiet_profile());

        // An already-acknowledged hop, effective immediately.
        let proposal = client.negotiation.propose(5, Duration::ZERO);
        assert!(client.negotiation.on_accept(&HopAccept {
            offset: proposal.offset
        }));

        let reply = client.request(b"ping").await.unwrap();
        assert_eq!(reply, Some(b"ok".to_vec()));
        assert_eq!(client.status().port_offset, 5);
        assert_eq!(client.transport.sent[0].0, 5);
    }

    #[tokio::test]
    async fn test_close_tears_down_transport() {
        let transport = ScriptedTransport::new(vec![]);
        let client = VeilClient::new(transport, quiet_profile());
        client.close().await.unwrap();
    }

    #[test]
    fn test_user_label_shape() {
        let label = anonymous_label();
        assert!(label.starts_with("user-"));
        assert_eq!(label.len(), "user-".len() + 4);
    }
}

//! High-level VEIL server API.
//!
//! Provides [`VeilServer`] wrapping a [`ListenerFactory`] with the response
//! path of the obfuscation layer: inbound de-obfuscation, decoy discarding,
//! shaped responses, and the hop-driven listener rebind that carries the
//! in-memory [`MessageStore`] across ports.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::core::{
    DEFAULT_BASE_PORT, HOP_LOOP_TICK, ObfuscationProfile, TransportError,
};
use crate::obfuscate::{
    HopNegotiation, HopProposal, Inbound, ObfuscationFacade, ObfuscationStatus, is_negotiation,
};
use crate::transport::{ListenerFactory, RequestResponder, SecureListener};

use super::store::MessageStore;

/// Payload of the throwaway acknowledgment sent for decoy requests, so the
/// exchange stays shaped like a real one.
const THROWAWAY_ACK: &[u8] = b"received";

/// Errors that can occur in the VEIL server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Transport error, surfaced unchanged.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base port; hops rebind to `base_port + offset`.
    pub base_port: u16,
    /// Obfuscation profile for the response path.
    pub profile: ObfuscationProfile,
    /// Bound on the in-memory message store.
    pub store_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            profile: ObfuscationProfile::default(),
            store_capacity: crate::core::DEFAULT_STORE_CAPACITY,
        }
    }
}

/// Handle to stop a running server.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: oneshot::Sender<()>,
}

impl ShutdownHandle {
    /// Signal the server to stop after its current request.
    pub fn shutdown(self) {
        let _ = self.tx.send(());
    }
}

/// A VEIL protocol server.
///
/// One server instance per listening endpoint lineage: the hop machinery
/// rebinds the endpoint, but the obfuscation state and the message store
/// live in the server and survive every rebind. Requests addressed to the
/// old port after a rebind fail at the transport (connection refused) and
/// are not migrated.
pub struct VeilServer<F: ListenerFactory> {
    config: ServerConfig,
    factory: F,
    facade: ObfuscationFacade,
    negotiation: HopNegotiation,
    store: Arc<Mutex<MessageStore>>,
    shutdown_rx: oneshot::Receiver<()>,
    /// Once a peer has negotiated a hop, the independent timer stands down.
    negotiated: bool,
}

impl<F: ListenerFactory> VeilServer<F> {
    /// Create a server and its shutdown handle.
    pub fn new(factory: F, config: ServerConfig) -> (Self, ShutdownHandle) {
        let (tx, rx) = oneshot::channel();
        let facade = ObfuscationFacade::new(config.profile.clone());
        let store = Arc::new(Mutex::new(MessageStore::with_capacity(
            config.store_capacity,
        )));
        (
            Self {
                config,
                factory,
                facade,
                negotiation: HopNegotiation::new(),
                store,
                shutdown_rx: rx,
                negotiated: false,
            },
            ShutdownHandle { tx },
        )
    }

    /// Shared handle to the message store (retained across rebinds).
    pub fn store_handle(&self) -> Arc<Mutex<MessageStore>> {
        Arc::clone(&self.store)
    }

    /// Read-only obfuscation status for operator reporting.
    pub fn status(&self) -> ObfuscationStatus {
        self.facade.status()
    }

    /// Run the accept loop until shut down.
    ///
    /// `handler` produces the response payload for each real (non-decoy)
    /// request; the obfuscation layer shapes it before it leaves. The loop
    /// interleaves three duties: serving requests, committing negotiated
    /// hops, and — until a peer negotiates — running the independent hop
    /// timer that tears the listener down and rebinds it on the new port.
    pub async fn serve<H>(mut self, mut handler: H) -> Result<(), ServerError>
    where
        H: FnMut(&[u8], &MessageStore) -> Vec<u8> + Send,
    {
        let mut listener = self
            .factory
            .bind(self.config.base_port + self.facade.port_offset())
            .await?;
        info!(
            port = self.config.base_port + self.facade.port_offset(),
            "server listening"
        );

        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                info!("server shutting down");
                listener.close().await.ok();
                return Ok(());
            }

            // Hop bookkeeping: negotiated commits take precedence; the
            // independent timer only runs while no peer has negotiated.
            let due = self.negotiation.commit_due(Instant::now());
            let hop_offset = match due {
                Some(offset) => Some(offset),
                None if !self.negotiated => self.facade.poll_hop(),
                None => None,
            };
            if let Some(offset) = hop_offset {
                self.facade.commit_offset(offset);
                listener.close().await.ok();
                let port = self.config.base_port + offset;
                listener = self.factory.bind(port).await?;
                info!(port, "frequency hop: listener rebound");
            }

            let accepted =
                match tokio::time::timeout(HOP_LOOP_TICK, listener.accept()).await {
                    Err(_tick) => continue,
                    Ok(Err(err)) => return Err(err.into()),
                    Ok(Ok(accepted)) => accepted,
                };
            let (bytes, responder) = accepted;

            if is_negotiation(&bytes) {
                self.handle_negotiation(&bytes, responder).await?;
                continue;
            }

            match self.facade.process_inbound(&bytes) {
                Inbound::Decoy => {
                    // Answer decoys with a shaped throwaway ack so the
                    // exchange is indistinguishable from a real one.
                    let out = self.facade.prepare_outbound(THROWAWAY_ACK, false).await;
                    responder.respond(&out.bytes).await?;
                }
                Inbound::Payload(payload) => {
                    let peer = anonymize_peer(responder.peer_hint());
                    let response = {
                        let mut store = self.store.lock().expect("store mutex poisoned");
                        store.push(peer, payload.clone());
                        handler(&payload, &store)
                    };
                    let out = self.facade.prepare_outbound(&response, false).await;
                    responder.respond(&out.bytes).await?;
                }
            }
        }
    }

    /// Accept a hop proposal: acknowledge it and let the commit machinery
    /// rebind once the effective time arrives.
    async fn handle_negotiation<R: RequestResponder>(
        &mut self,
        bytes: &[u8],
        responder: R,
    ) -> Result<(), ServerError> {
        match HopProposal::decode(bytes) {
            Ok(proposal) => {
                self.negotiated = true;
                let accept = self.negotiation.on_proposal(&proposal, Instant::now());
                responder.respond(&accept.encode()).await?;
            }
            Err(err) => {
                warn!(%err, "undecodable hop negotiation message");
                let out = self.facade.prepare_outbound(THROWAWAY_ACK, false).await;
                responder.respond(&out.bytes).await?;
            }
        }
        Ok(())
    }
}

/// Derive an anonymized display label from an optional transport hint.
///
/// The hint never appears in logs or the store; only a small hash of it
/// does.
fn anonymize_peer(hint: Option<&str>) -> String {
    match hint {
        Some(hint) => {
            let mut hasher = DefaultHasher::new();
            hint.hash(&mut hasher);
            format!("user-{:03}", hasher.finish() % 1000)
        }
        None => "user-unknown".to_string(),
    }
}

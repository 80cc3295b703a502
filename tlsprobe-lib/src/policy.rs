//! Verification policies handed to the TLS probes.

use crate::cert::Certificate;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fmt;

/// Certificate and private key presented to the remote during a handshake.
pub struct ClientIdentity {
    /// Name the identity was resolved from.
    pub name: String,
    /// Certificate chain, leaf first.
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl Clone for ClientIdentity {
    fn clone(&self) -> Self {
        ClientIdentity {
            name: self.name.clone(),
            chain: self.chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("name", &self.name)
            .field("certificates", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// How much of the peer's identity a handshake verifies.
///
/// Built fresh for every probe and never persisted.
#[derive(Debug, Clone, Default)]
pub struct VerificationPolicy {
    /// Verify the chain against the trust anchors.
    pub verify_peer: bool,
    /// Verify that the leaf is valid for the endpoint host.
    pub verify_peer_name: bool,
    /// Keep the peer's certificate chain after the handshake.
    pub capture_chain: bool,
    pub client_identity: Option<ClientIdentity>,
    /// Additional trust anchor accepted by the operator.
    pub extra_root: Option<Certificate>,
    /// Leaf CN accepted by the operator in place of the endpoint host.
    pub accepted_cn: Option<String>,
}

impl VerificationPolicy {
    /// Handshake without any certificate verification.
    pub fn insecure(client_identity: Option<ClientIdentity>) -> Self {
        VerificationPolicy {
            client_identity,
            ..Default::default()
        }
    }

    /// Full default verification against the configured trust store.
    pub fn secure(client_identity: Option<ClientIdentity>) -> Self {
        VerificationPolicy {
            verify_peer: true,
            verify_peer_name: true,
            client_identity,
            ..Default::default()
        }
    }

    /// Insecure handshake that keeps the presented chain.
    pub fn capture(client_identity: Option<ClientIdentity>) -> Self {
        VerificationPolicy {
            capture_chain: true,
            client_identity,
            ..Default::default()
        }
    }

    pub fn with_extra_root(mut self, root: Certificate) -> Self {
        self.extra_root = Some(root);
        self
    }

    pub fn with_accepted_cn(mut self, cn: String) -> Self {
        self.accepted_cn = Some(cn);
        self
    }
}

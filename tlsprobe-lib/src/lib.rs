//! tlsprobe-lib: Progressive connectivity and TLS trust validation.
//!
//! Before a remote HTTP(S) endpoint is registered as a resource, a validation
//! pass establishes in escalating steps that the host is reachable over TCP,
//! that it speaks TLS at all, what certificate chain it presents, and that a
//! fully verified handshake succeeds. Each failure produces the minimal set of
//! operator overrides that would let the pass continue.

mod cert;
mod display;
mod endpoint;
mod identity;
mod overrides;
mod policy;
pub mod probe;
mod trust_store;
mod validate;

pub use cert::{Certificate, CertificateChain, CertificateSummary};
pub use display::{display_chain, display_text, to_json};
pub use endpoint::{resolve_endpoint, Endpoint, Scheme};
pub use identity::{DirectoryIdentities, IdentityResolver, NoIdentities};
pub use overrides::{required_overrides, review_overrides, FailureKind, Override, OverrideSet};
pub use policy::{ClientIdentity, VerificationPolicy};
pub use probe::{NetworkProber, ProbeConfig, Prober};
pub use trust_store::{find_system_ca_bundle, TrustStore};
pub use validate::{DiscoveredTrust, ValidationOutcome, ValidationRequest, Validator};

/// Errors returned by tlsprobe-lib.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Malformed endpoint: {0}")]
    MalformedEndpoint(String),

    #[error("{0}")]
    Connectivity(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    #[error("Failed to capture certificate chain: {0}")]
    CertificateChain(String),

    #[error("{0}")]
    CertificateTrust(String),

    #[error("TLS client identity: {0}")]
    Identity(String),

    #[error("Trust store error: {0}")]
    TrustStore(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// The stage of the decision procedure this error belongs to.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::MalformedEndpoint(_) => FailureKind::MalformedEndpoint,
            ProbeError::Connectivity(_) | ProbeError::Io(_) => FailureKind::Connectivity,
            ProbeError::TlsHandshake(_) => FailureKind::TlsHandshake,
            ProbeError::CertificateChain(_) => FailureKind::CertificateChain,
            ProbeError::CertificateTrust(_) => FailureKind::CertificateTrust,
            ProbeError::Identity(_) | ProbeError::TrustStore(_) | ProbeError::Json(_) => {
                FailureKind::Configuration
            }
        }
    }
}

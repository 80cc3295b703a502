//! Network probes run by a validation pass.
//!
//! Every probe is a single blocking attempt bounded by the configured
//! timeout. A probe opens its connection, does its work and closes the
//! connection again; nothing is kept between probes.

mod chain;
mod tcp;
mod tls;
mod verifier;

use crate::cert::CertificateChain;
use crate::endpoint::Endpoint;
use crate::policy::{ClientIdentity, VerificationPolicy};
use crate::trust_store::TrustStore;
use crate::ProbeError;
use std::time::Duration;

/// Default bound for each probe.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The probes a validation pass sequences.
pub trait Prober {
    /// Open and immediately close a TCP connection.
    fn probe_tcp(&self, endpoint: &Endpoint) -> Result<(), ProbeError>;

    /// Complete a TLS handshake under `policy`, then close.
    fn probe_tls(&self, endpoint: &Endpoint, policy: &VerificationPolicy)
        -> Result<(), ProbeError>;

    /// Complete an unverified handshake and return the presented chain.
    fn inspect_chain(
        &self,
        endpoint: &Endpoint,
        client_identity: Option<&ClientIdentity>,
    ) -> Result<CertificateChain, ProbeError>;
}

/// Settings shared by all probes of a [`NetworkProber`].
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Bound for connecting and for each read or write of the handshake.
    pub timeout: Duration,
    /// Anchors for the verified handshake.
    pub trust_store: TrustStore,
}

impl ProbeConfig {
    pub fn new(timeout: Duration, trust_store: TrustStore) -> Self {
        ProbeConfig {
            timeout,
            trust_store,
        }
    }
}

/// Probes real endpoints over the network.
#[derive(Debug, Clone)]
pub struct NetworkProber {
    config: ProbeConfig,
}

impl NetworkProber {
    pub fn new(config: ProbeConfig) -> Self {
        NetworkProber { config }
    }
}

impl Prober for NetworkProber {
    fn probe_tcp(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        tcp::probe(endpoint, self.config.timeout)
    }

    fn probe_tls(
        &self,
        endpoint: &Endpoint,
        policy: &VerificationPolicy,
    ) -> Result<(), ProbeError> {
        tls::handshake(endpoint, policy, &self.config).map(|_| ())
    }

    fn inspect_chain(
        &self,
        endpoint: &Endpoint,
        client_identity: Option<&ClientIdentity>,
    ) -> Result<CertificateChain, ProbeError> {
        chain::inspect(endpoint, client_identity, &self.config)
    }
}


//! Capture of the peer's certificate chain.

use super::tls;
use super::ProbeConfig;
use crate::cert::CertificateChain;
use crate::endpoint::Endpoint;
use crate::policy::{ClientIdentity, VerificationPolicy};
use crate::ProbeError;
use tracing::debug;

/// Handshake without verification and reduce the presented chain to a leaf
/// and, if the last certificate is self-signed, a root.
pub(super) fn inspect(
    endpoint: &Endpoint,
    client_identity: Option<&ClientIdentity>,
    config: &ProbeConfig,
) -> Result<CertificateChain, ProbeError> {
    let policy = VerificationPolicy::capture(client_identity.cloned());
    let presented = tls::handshake(endpoint, &policy, config).map_err(|e| match e {
        ProbeError::TlsHandshake(m) => ProbeError::CertificateChain(m),
        other => other,
    })?;

    debug!(
        host = %endpoint.host,
        certificates = presented.len(),
        "captured peer chain"
    );
    CertificateChain::from_der_chain(&presented)
}

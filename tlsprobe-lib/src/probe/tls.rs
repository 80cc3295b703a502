//! TLS handshakes under a verification policy.

use super::tcp;
use super::verifier::{NameAcceptance, NoVerification, PeerNameVerifier};
use super::ProbeConfig;
use crate::endpoint::Endpoint;
use crate::policy::VerificationPolicy;
use crate::ProbeError;
use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection};
use std::io::Write;
use std::net::Shutdown;
use std::sync::Arc;
use tracing::debug;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build the client configuration a policy describes.
pub(super) fn client_config(
    policy: &VerificationPolicy,
    config: &ProbeConfig,
) -> Result<ClientConfig, ProbeError> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::TlsHandshake(e.to_string()))?;

    let verifier: Arc<dyn ServerCertVerifier> = if policy.verify_peer {
        let roots = config.trust_store.root_store(policy.extra_root.as_ref())?;
        let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| ProbeError::TrustStore(e.to_string()))?;
        match (&policy.accepted_cn, policy.verify_peer_name) {
            (_, false) => Arc::new(PeerNameVerifier::new(webpki, NameAcceptance::AnyName)),
            (Some(cn), true) => {
                Arc::new(PeerNameVerifier::new(webpki, NameAcceptance::LeafCn(cn.clone())))
            }
            (None, true) => webpki,
        }
    } else {
        Arc::new(NoVerification::new(
            provider.signature_verification_algorithms,
        ))
    };

    let builder = builder
        .dangerous()
        .with_custom_certificate_verifier(verifier);

    match &policy.client_identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.chain.clone(), identity.key.clone_key())
            .map_err(|e| {
                ProbeError::Identity(format!("'{}' unusable: {}", identity.name, e))
            }),
        None => Ok(builder.with_no_client_auth()),
    }
}

/// Perform a handshake with `endpoint` and close the connection.
///
/// Returns the peer's chain (leaf first) when the policy captures it, an
/// empty vector otherwise. Failures are `TlsHandshake`, except for an
/// unusable trust store or client identity.
pub(super) fn handshake(
    endpoint: &Endpoint,
    policy: &VerificationPolicy,
    config: &ProbeConfig,
) -> Result<Vec<CertificateDer<'static>>, ProbeError> {
    debug!(
        host = %endpoint.host,
        port = endpoint.port,
        verify_peer = policy.verify_peer,
        verify_peer_name = policy.verify_peer_name,
        capture_chain = policy.capture_chain,
        client_identity = policy.client_identity.is_some(),
        "probing TLS"
    );

    let tls_config = client_config(policy, config)?;
    let server_name = ServerName::try_from(endpoint.host.clone())
        .map_err(|e| ProbeError::TlsHandshake(format!("{}: {}", endpoint.host, e)))?;
    let mut conn = ClientConnection::new(Arc::new(tls_config), server_name)
        .map_err(|e| ProbeError::TlsHandshake(e.to_string()))?;

    let fail =
        |e: std::io::Error| ProbeError::TlsHandshake(format!("{}: {}", endpoint.authority(), e));

    let mut sock = tcp::connect(endpoint, config.timeout).map_err(fail)?;
    sock.set_read_timeout(Some(config.timeout)).map_err(fail)?;
    sock.set_write_timeout(Some(config.timeout)).map_err(fail)?;

    while conn.is_handshaking() {
        conn.complete_io(&mut sock).map_err(fail)?;
    }
    // The final flight may still be queued once the handshake completes.
    while conn.wants_write() {
        conn.write_tls(&mut sock).map_err(fail)?;
    }

    let chain = if policy.capture_chain {
        conn.peer_certificates()
            .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    conn.send_close_notify();
    let _ = conn.write_tls(&mut sock);
    let _ = sock.flush();
    let _ = sock.shutdown(Shutdown::Both);

    Ok(chain)
}

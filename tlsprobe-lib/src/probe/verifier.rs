//! Server certificate verifiers behind the verification policies.

use crate::cert::Certificate;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, Error, SignatureScheme};
use std::sync::Arc;
use tracing::debug;

/// Accepts any certificate chain. Handshake signatures are still checked
/// against the presented leaf.
#[derive(Debug)]
pub(super) struct NoVerification {
    algorithms: WebPkiSupportedAlgorithms,
}

impl NoVerification {
    pub(super) fn new(algorithms: WebPkiSupportedAlgorithms) -> Self {
        NoVerification { algorithms }
    }
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Which names other than the endpoint host a verified chain may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum NameAcceptance {
    /// The name is not checked at all.
    AnyName,
    /// A leaf whose subject CN equals this value is accepted.
    LeafCn(String),
}

/// Full chain verification with a relaxed name check.
///
/// The inner verifier checks the name only after the chain has verified, so
/// a name error here always comes from an otherwise trusted chain.
#[derive(Debug)]
pub(super) struct PeerNameVerifier {
    inner: Arc<WebPkiServerVerifier>,
    accept: NameAcceptance,
}

impl PeerNameVerifier {
    pub(super) fn new(inner: Arc<WebPkiServerVerifier>, accept: NameAcceptance) -> Self {
        PeerNameVerifier { inner, accept }
    }

    fn accepts(&self, end_entity: &CertificateDer<'_>) -> bool {
        match &self.accept {
            NameAcceptance::AnyName => true,
            NameAcceptance::LeafCn(cn) => Certificate::from_der(end_entity)
                .ok()
                .and_then(|c| c.subject_cn)
                .is_some_and(|presented| presented == *cn),
        }
    }
}

fn is_name_mismatch(e: &CertificateError) -> bool {
    matches!(
        e,
        CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. }
    )
}

impl ServerCertVerifier for PeerNameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(Error::InvalidCertificate(ref e))
                if is_name_mismatch(e) && self.accepts(end_entity) =>
            {
                debug!(accept = ?self.accept, "name mismatch accepted");
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

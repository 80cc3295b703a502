//! Peer certificates as captured during a handshake.

use crate::ProbeError;
use base64::Engine;
use digest::Digest;
use serde::Serialize;
use x509_parser::prelude::*;

/// A DER certificate with the names the trust decision looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    raw_der: Vec<u8>,
    /// First CN of the subject, if any.
    pub subject_cn: Option<String>,
    /// First CN of the issuer, if any.
    pub issuer_cn: Option<String>,
    /// notBefore as a Unix timestamp.
    pub not_before: i64,
    /// notAfter as a Unix timestamp.
    pub not_after: i64,
}

impl Certificate {
    /// Parse a single DER certificate. Trailing bytes are dropped.
    pub fn from_der(input: &[u8]) -> Result<Self, ProbeError> {
        let (remaining, x509) = X509Certificate::from_der(input)
            .map_err(|e| ProbeError::CertificateChain(format!("invalid certificate: {}", e)))?;

        let cert_len = input.len() - remaining.len();
        let raw_der = input.get(..cert_len).unwrap_or(input).to_vec();

        Ok(Certificate {
            raw_der,
            subject_cn: first_cn(x509.subject()),
            issuer_cn: first_cn(x509.issuer()),
            not_before: x509.validity().not_before.timestamp(),
            not_after: x509.validity().not_after.timestamp(),
        })
    }

    /// Whether subject CN and issuer CN are the same.
    ///
    /// This is a name comparison only; the signature is not checked. Two
    /// absent CNs compare equal.
    pub fn is_self_signed(&self) -> bool {
        self.subject_cn == self.issuer_cn
    }

    pub fn der(&self) -> &[u8] {
        &self.raw_der
    }

    /// SHA-256 over the DER bytes as colon-separated uppercase hex.
    pub fn sha256_fingerprint(&self) -> String {
        sha2::Sha256::digest(&self.raw_der)
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn to_pem(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.raw_der);
        let body = encoded
            .as_bytes()
            .chunks(64)
            .filter_map(|c| std::str::from_utf8(c).ok())
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            body
        )
    }

    pub fn summary(&self) -> CertificateSummary {
        CertificateSummary {
            subject_cn: self.subject_cn.clone(),
            issuer_cn: self.issuer_cn.clone(),
            sha256_fingerprint: self.sha256_fingerprint(),
            not_before: format_timestamp(self.not_before),
            not_after: format_timestamp(self.not_after),
            pem: self.to_pem(),
        }
    }
}

/// A presented chain reduced to what the trust decision needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    pub leaf: Certificate,
    /// The last certificate of the chain, kept only when the chain has more
    /// than one certificate and that last certificate is self-signed.
    pub root: Option<Certificate>,
}

impl CertificateChain {
    /// Build from DER certificates in presentation order (leaf first).
    pub fn from_der_chain<C: AsRef<[u8]>>(chain: &[C]) -> Result<Self, ProbeError> {
        let leaf_der = chain
            .first()
            .ok_or_else(|| ProbeError::CertificateChain("peer presented no certificates".into()))?;
        let leaf = Certificate::from_der(leaf_der.as_ref())?;

        let root = match chain.last() {
            Some(last) if chain.len() > 1 => {
                let candidate = Certificate::from_der(last.as_ref())?;
                candidate.is_self_signed().then_some(candidate)
            }
            _ => None,
        };

        Ok(CertificateChain { leaf, root })
    }
}

/// Operator-facing view of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    pub subject_cn: Option<String>,
    pub issuer_cn: Option<String>,
    pub sha256_fingerprint: String,
    pub not_before: String,
    pub not_after: String,
    #[serde(skip)]
    pub pem: String,
}

fn first_cn(name: &X509Name) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|s| s.to_string())
}

fn format_timestamp(ts: i64) -> String {
    match ::time::OffsetDateTime::from_unix_timestamp(ts) {
        Ok(dt) => format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            dt.year(),
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        ),
        Err(_) => format!("{}", ts),
    }
}

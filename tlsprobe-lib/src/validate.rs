//! The trust decision procedure.
//!
//! A validation pass runs, in order: endpoint resolution, a TCP probe, and
//! for https endpoints an unverified handshake, an optional root CA
//! discovery and a verified handshake. The operator's granted overrides
//! short-circuit or extend that sequence; every failure stops the pass and
//! reports the overrides that would get it past that point.

use crate::cert::CertificateSummary;
use crate::endpoint::resolve_endpoint;
use crate::identity::{IdentityResolver, NoIdentities};
use crate::overrides::{required_overrides, review_overrides, FailureKind, Override, OverrideSet};
use crate::policy::VerificationPolicy;
use crate::probe::Prober;
use crate::ProbeError;
use serde::Serialize;
use tracing::{info, warn};

/// Input of one validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationRequest {
    /// `http[s]://<HOST>[:<PORT>][/<BASE_LOCATION>]`
    pub baseurl: String,
    /// Name of the TLS client identity to present, if any.
    pub client_identity: Option<String>,
    /// Overrides the operator has granted so far.
    pub granted: OverrideSet,
}

impl ValidationRequest {
    pub fn new(baseurl: impl Into<String>) -> Self {
        ValidationRequest {
            baseurl: baseurl.into(),
            ..Default::default()
        }
    }

    pub fn with_client_identity(mut self, name: impl Into<String>) -> Self {
        self.client_identity = Some(name.into());
        self
    }

    pub fn grant(mut self, o: Override) -> Self {
        self.granted.insert(o);
        self
    }
}

/// Leaf and root CA found by root discovery, for the operator to review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredTrust {
    pub leaf: CertificateSummary,
    pub root: CertificateSummary,
}

/// Result of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub errors: Vec<String>,
    /// Overrides to offer the operator; empty when accepted.
    pub required_overrides: OverrideSet,
    /// Overrides confirming `discovered`, offered when the verified
    /// handshake failed after a root CA was discovered.
    #[serde(skip_serializing_if = "OverrideSet::is_empty")]
    pub review_overrides: OverrideSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovered: Option<DiscoveredTrust>,
}

impl ValidationOutcome {
    fn accepted(discovered: Option<DiscoveredTrust>) -> Self {
        ValidationOutcome {
            accepted: true,
            errors: Vec::new(),
            required_overrides: OverrideSet::new(),
            review_overrides: OverrideSet::new(),
            discovered,
        }
    }

    fn rejected(kind: FailureKind, error: ProbeError) -> Self {
        ValidationOutcome {
            accepted: false,
            errors: vec![error.to_string()],
            required_overrides: required_overrides(kind),
            review_overrides: OverrideSet::new(),
            discovered: None,
        }
    }
}

/// Runs validation passes with a prober and a client identity resolver.
#[derive(Debug, Clone)]
pub struct Validator<P, I = NoIdentities> {
    prober: P,
    identities: I,
}

impl<P: Prober> Validator<P, NoIdentities> {
    /// A validator that cannot resolve any client identity.
    pub fn without_identities(prober: P) -> Self {
        Validator::new(prober, NoIdentities)
    }
}

impl<P: Prober, I: IdentityResolver> Validator<P, I> {
    pub fn new(prober: P, identities: I) -> Self {
        Validator { prober, identities }
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    pub fn identities(&self) -> &I {
        &self.identities
    }

    /// Run one validation pass.
    pub fn validate(&self, request: &ValidationRequest) -> ValidationOutcome {
        let outcome = self.run(request);
        if outcome.accepted {
            info!(baseurl = %request.baseurl, "endpoint accepted");
        } else {
            info!(
                baseurl = %request.baseurl,
                required = %outcome.required_overrides,
                errors = ?outcome.errors,
                "endpoint rejected"
            );
        }
        outcome
    }

    fn run(&self, request: &ValidationRequest) -> ValidationOutcome {
        let granted = &request.granted;

        if granted.contains(Override::ForceCreation) {
            return ValidationOutcome::accepted(None);
        }

        let endpoint = match resolve_endpoint(&request.baseurl) {
            Ok(endpoint) => endpoint,
            Err(e) => return ValidationOutcome::rejected(e.kind(), e),
        };

        if let Err(e) = self.prober.probe_tcp(&endpoint) {
            return ValidationOutcome::rejected(FailureKind::Connectivity, e);
        }

        if !endpoint.scheme.is_secure() {
            return ValidationOutcome::accepted(None);
        }

        let identity = match &request.client_identity {
            Some(name) => match self.identities.resolve(name) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!(identity = %name, error = %e, "client identity unavailable");
                    return ValidationOutcome::rejected(FailureKind::Configuration, e);
                }
            },
            None => None,
        };

        let insecure = VerificationPolicy::insecure(identity.clone());
        if let Err(e) = self.prober.probe_tls(&endpoint, &insecure) {
            let kind = stage_kind(&e, FailureKind::TlsHandshake);
            return ValidationOutcome::rejected(kind, e);
        }

        if granted.contains(Override::TlsServerInsecure) {
            return ValidationOutcome::accepted(None);
        }

        let mut secure = VerificationPolicy::secure(identity.clone());
        let mut discovered = None;

        if granted.contains(Override::TlsServerDiscoverRootca) {
            let chain = match self.prober.inspect_chain(&endpoint, identity.as_ref()) {
                Ok(chain) => chain,
                Err(e) => {
                    let kind = stage_kind(&e, FailureKind::CertificateChain);
                    return ValidationOutcome::rejected(kind, e);
                }
            };

            if chain.leaf.is_self_signed() {
                return ValidationOutcome::rejected(
                    FailureKind::CertificateTrust,
                    ProbeError::CertificateTrust(
                        "The remote didn't provide any non-self-signed TLS certificate".into(),
                    ),
                );
            }

            let Some(root) = chain.root else {
                return ValidationOutcome::rejected(
                    FailureKind::CertificateTrust,
                    ProbeError::CertificateTrust(
                        "The remote didn't provide any root CA certificate".into(),
                    ),
                );
            };

            info!(
                root_cn = root.subject_cn.as_deref().unwrap_or(""),
                leaf_cn = chain.leaf.subject_cn.as_deref().unwrap_or(""),
                fingerprint = %root.sha256_fingerprint(),
                "root CA discovered"
            );
            discovered = Some(DiscoveredTrust {
                leaf: chain.leaf.summary(),
                root: root.summary(),
            });

            if granted.contains(Override::TlsServerAcceptCn) {
                if let Some(cn) = chain.leaf.subject_cn {
                    secure = secure.with_accepted_cn(cn);
                }
            }
            if granted.contains(Override::TlsServerAcceptRootca) {
                secure = secure.with_extra_root(root);
            }
        }

        match self.prober.probe_tls(&endpoint, &secure) {
            Ok(()) => ValidationOutcome::accepted(discovered),
            Err(e) => {
                let mut outcome = ValidationOutcome::rejected(FailureKind::SecureHandshake, e);
                if discovered.is_some() {
                    outcome.review_overrides = review_overrides(granted);
                }
                outcome.discovered = discovered;
                outcome
            }
        }
    }
}

/// Failures caused by local configuration keep their own kind; everything
/// else is attributed to the stage that ran.
fn stage_kind(e: &ProbeError, stage: FailureKind) -> FailureKind {
    match e.kind() {
        FailureKind::Configuration => FailureKind::Configuration,
        _ => stage,
    }
}

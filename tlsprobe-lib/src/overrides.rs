//! Operator overrides and the failure-to-override mapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An explicit operator-granted exception to one validation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Override {
    /// Accept the resource without any connectivity validation.
    ForceCreation,
    /// Don't validate the remote's certificate chain at all.
    TlsServerInsecure,
    /// Discover the root CA the remote presents.
    TlsServerDiscoverRootca,
    /// Trust the discovered root CA for the verified handshake.
    TlsServerAcceptRootca,
    /// Accept the discovered leaf CN in place of the URL host.
    TlsServerAcceptCn,
}

impl Override {
    /// The full vocabulary, in declaration order.
    pub const ALL: [Override; 5] = [
        Override::ForceCreation,
        Override::TlsServerInsecure,
        Override::TlsServerDiscoverRootca,
        Override::TlsServerAcceptRootca,
        Override::TlsServerAcceptCn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Override::ForceCreation => "force_creation",
            Override::TlsServerInsecure => "tls_server_insecure",
            Override::TlsServerDiscoverRootca => "tls_server_discover_rootca",
            Override::TlsServerAcceptRootca => "tls_server_accept_rootca",
            Override::TlsServerAcceptCn => "tls_server_accept_cn",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Override::ForceCreation => "Force Changes",
            Override::TlsServerInsecure => "Insecure Connection",
            Override::TlsServerDiscoverRootca => "Discover Root CA",
            Override::TlsServerAcceptRootca => "Accept the remote's root CA",
            Override::TlsServerAcceptCn => "Accept the remote's CN",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Override::ForceCreation => "Enforce changes without connectivity validation",
            Override::TlsServerInsecure => {
                "Don't validate the remote's TLS certificate chain at all"
            }
            Override::TlsServerDiscoverRootca => {
                "Discover the remote's TLS certificate's root CA \
                 (makes sense only in case of an isolated PKI)"
            }
            Override::TlsServerAcceptRootca => "Trust the remote's TLS certificate's root CA",
            Override::TlsServerAcceptCn => "Accept the remote's TLS certificate's CN",
        }
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Override {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Override::ALL
            .iter()
            .copied()
            .find(|o| o.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown override '{}' (expected one of: {})",
                    s,
                    Override::ALL
                        .iter()
                        .map(|o| o.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// A set of overrides in presentation order.
///
/// Membership is what matters to the decision procedure; the order is the
/// order in which a presentation layer should offer the overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Override>", into = "Vec<Override>")]
pub struct OverrideSet {
    items: Vec<Override>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override at the end of the presentation order. Returns `false`
    /// if it was already present.
    pub fn insert(&mut self, o: Override) -> bool {
        if self.items.contains(&o) {
            return false;
        }
        self.items.push(o);
        true
    }

    pub fn contains(&self, o: Override) -> bool {
        self.items.contains(&o)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Override> + '_ {
        self.items.iter().copied()
    }

    /// `(order, override)` pairs, order counting from zero.
    pub fn ordered(&self) -> impl Iterator<Item = (usize, Override)> + '_ {
        self.iter().enumerate()
    }
}

impl FromIterator<Override> for OverrideSet {
    fn from_iter<I: IntoIterator<Item = Override>>(iter: I) -> Self {
        let mut set = OverrideSet::new();
        for o in iter {
            set.insert(o);
        }
        set
    }
}

impl From<Vec<Override>> for OverrideSet {
    fn from(items: Vec<Override>) -> Self {
        items.into_iter().collect()
    }
}

impl From<OverrideSet> for Vec<Override> {
    fn from(set: OverrideSet) -> Self {
        set.items
    }
}

impl<const N: usize> From<[Override; N]> for OverrideSet {
    fn from(items: [Override; N]) -> Self {
        items.into_iter().collect()
    }
}

impl fmt::Display for OverrideSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, o) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", o)?;
        }
        write!(f, "}}")
    }
}

/// The point at which a validation pass stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The base URL could not be resolved to an endpoint.
    MalformedEndpoint,
    /// Local input that is not part of the endpoint, such as an unknown
    /// client identity, could not be used.
    Configuration,
    /// TCP connect failed.
    Connectivity,
    /// The handshake with verification disabled failed.
    TlsHandshake,
    /// The certificate chain could not be captured or parsed.
    CertificateChain,
    /// The captured chain has no usable root (self-signed leaf or no
    /// self-signed root candidate).
    CertificateTrust,
    /// The fully verified handshake failed.
    SecureHandshake,
}

/// The minimal set of overrides to offer after a failure of the given kind.
pub fn required_overrides(kind: FailureKind) -> OverrideSet {
    use Override::*;

    match kind {
        FailureKind::MalformedEndpoint | FailureKind::Configuration => OverrideSet::new(),
        FailureKind::Connectivity | FailureKind::TlsHandshake => [ForceCreation].into(),
        FailureKind::CertificateChain
        | FailureKind::CertificateTrust
        | FailureKind::SecureHandshake => {
            [ForceCreation, TlsServerInsecure, TlsServerDiscoverRootca].into()
        }
    }
}

/// Overrides that confirm a root CA discovered in the same pass, offered for
/// review next to the required set when the verified handshake still fails.
///
/// Overrides already in `granted` are left out.
pub fn review_overrides(granted: &OverrideSet) -> OverrideSet {
    [Override::TlsServerAcceptRootca, Override::TlsServerAcceptCn]
        .into_iter()
        .filter(|o| !granted.contains(*o))
        .collect()
}

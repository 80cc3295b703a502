//! Endpoint resolution from a resource's base URL.

use crate::ProbeError;
use serde::Serialize;
use std::fmt;
use url::{Host, Url};

/// URL scheme of a resource endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// Port used when the URL does not name one.
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn is_secure(self) -> bool {
        self == Scheme::Https
    }
}

/// The network endpoint a validation pass probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    /// Hostname or IP literal (IPv6 without brackets).
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
}

impl Endpoint {
    /// `host:port` with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.authority())
    }
}

/// Parse a base URL (`http[s]://<HOST>[:<PORT>][/<BASE_LOCATION>]`) into an
/// [`Endpoint`].
///
/// Path, query, fragment and credentials are ignored.
pub fn resolve_endpoint(raw: &str) -> Result<Endpoint, ProbeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::MalformedEndpoint("empty base URL".into()));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| ProbeError::MalformedEndpoint(format!("{}: {}", trimmed, e)))?;

    let scheme = match url.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => {
            return Err(ProbeError::MalformedEndpoint(format!(
                "unsupported scheme '{}' (expected http or https)",
                other
            )))
        }
    };

    let host = match url.host() {
        Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        _ => {
            return Err(ProbeError::MalformedEndpoint(format!(
                "{}: no host",
                trimmed
            )))
        }
    };

    // `Url::port` hides ports equal to the scheme default, so fall back to it.
    // Plain http without a port uses 80, not 443.
    let port = url.port().unwrap_or_else(|| scheme.default_port());

    Ok(Endpoint { host, port, scheme })
}

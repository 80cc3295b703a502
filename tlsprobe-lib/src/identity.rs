//! Resolution of named TLS client identities.

use crate::policy::ClientIdentity;
use crate::ProbeError;
use std::path::{Path, PathBuf};

/// Resolves an identity reference to certificate and key material.
pub trait IdentityResolver {
    /// Look up an identity by name.
    fn resolve(&self, reference: &str) -> Result<ClientIdentity, ProbeError>;

    /// Names of all identities that can be resolved, sorted.
    fn list(&self) -> Vec<String>;
}

impl<T: IdentityResolver + ?Sized> IdentityResolver for Box<T> {
    fn resolve(&self, reference: &str) -> Result<ClientIdentity, ProbeError> {
        (**self).resolve(reference)
    }

    fn list(&self) -> Vec<String> {
        (**self).list()
    }
}

/// A resolver without any identities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentities;

impl IdentityResolver for NoIdentities {
    fn resolve(&self, reference: &str) -> Result<ClientIdentity, ProbeError> {
        Err(ProbeError::Identity(format!("'{}' not found", reference)))
    }

    fn list(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Identities stored as `<dir>/<name>.pem`.
///
/// Each file holds the certificate chain (leaf first) and the private key,
/// both PEM-encoded.
#[derive(Debug, Clone)]
pub struct DirectoryIdentities {
    dir: PathBuf,
}

impl DirectoryIdentities {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryIdentities { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, reference: &str) -> Result<PathBuf, ProbeError> {
        let valid = !reference.is_empty()
            && !reference.starts_with('.')
            && reference
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
        if !valid {
            return Err(ProbeError::Identity(format!(
                "invalid identity name '{}'",
                reference
            )));
        }
        Ok(self.dir.join(format!("{}.pem", reference)))
    }
}

impl IdentityResolver for DirectoryIdentities {
    fn resolve(&self, reference: &str) -> Result<ClientIdentity, ProbeError> {
        let path = self.path_for(reference)?;
        if !path.is_file() {
            return Err(ProbeError::Identity(format!("'{}' not found", reference)));
        }
        let data = std::fs::read(&path)
            .map_err(|e| ProbeError::Identity(format!("{}: {}", path.display(), e)))?;
        parse_identity(reference, &data)
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = walkdir::WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pem"))
            })
            .filter_map(|e| {
                e.path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
            })
            .filter(|name| self.path_for(name).is_ok())
            .collect();
        names.sort();
        names
    }
}

/// Parse a PEM bundle holding a certificate chain and one private key.
fn parse_identity(name: &str, pem: &[u8]) -> Result<ClientIdentity, ProbeError> {
    let chain = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProbeError::Identity(format!("'{}': bad certificate: {}", name, e)))?;
    if chain.is_empty() {
        return Err(ProbeError::Identity(format!(
            "'{}' contains no certificate",
            name
        )));
    }

    let key = rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| ProbeError::Identity(format!("'{}': bad private key: {}", name, e)))?
        .ok_or_else(|| ProbeError::Identity(format!("'{}' contains no private key", name)))?;

    Ok(ClientIdentity {
        name: name.to_string(),
        chain,
        key,
    })
}

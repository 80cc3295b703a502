//! Trust anchors for the verified handshake.
//!
//! Provides [`TrustStore`] for loading CA certificates, matching OpenSSL's
//! trust store discovery behavior, and turning them into a rustls root store.

use crate::cert::Certificate;
use crate::ProbeError;
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use x509_parser::prelude::*;

/// Well-known CA bundle file paths, in order of preference.
const KNOWN_CA_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt", // Debian/Ubuntu
    "/etc/pki/tls/certs/ca-bundle.crt",   // RHEL/CentOS/Fedora
    "/etc/ssl/ca-bundle.pem",             // openSUSE
    "/etc/ssl/cert.pem",                  // macOS, Alpine
];

/// Well-known CA certificate directory paths.
const KNOWN_CA_DIR_PATHS: &[&str] = &["/etc/ssl/certs"];

/// `.pem`, `.crt`, `.cer` and OpenSSL hash links (`XXXXXXXX.N`).
fn is_pem_cert_file(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };
    matches!(ext, "pem" | "crt" | "cer")
        || (ext.len() == 1 && ext.bytes().next().is_some_and(|b| b.is_ascii_digit()))
}

/// A set of trusted CA certificates.
#[derive(Clone, Default)]
pub struct TrustStore {
    certs: Vec<CertificateDer<'static>>,
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore")
            .field("count", &self.certs.len())
            .finish()
    }
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the system trust store.
    ///
    /// Searches, in order: `SSL_CERT_FILE`, the bundle found by
    /// `openssl-probe`, [`KNOWN_CA_BUNDLE_PATHS`], then `SSL_CERT_DIR`, the
    /// directory found by `openssl-probe` and [`KNOWN_CA_DIR_PATHS`].
    pub fn system() -> Result<Self, ProbeError> {
        let mut store = TrustStore::new();

        if let Some(bundle_path) = find_system_ca_bundle() {
            if let Ok(data) = std::fs::read(&bundle_path) {
                let added = store.add_pem_bundle(&data)?;
                if added > 0 {
                    debug!(path = %bundle_path.display(), count = added, "loaded system CA bundle");
                    return Ok(store);
                }
            }
        }

        let probe = openssl_probe::probe();
        let dir_candidates = std::env::var("SSL_CERT_DIR")
            .ok()
            .into_iter()
            .chain(
                probe
                    .cert_dir
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned()),
            )
            .chain(KNOWN_CA_DIR_PATHS.iter().map(|s| (*s).to_string()));

        for dir in dir_candidates {
            let dir_path = Path::new(&dir);
            if let Ok(added) = store.add_pem_directory(dir_path) {
                if added > 0 {
                    debug!(path = %dir_path.display(), count = added, "loaded system CA directory");
                    return Ok(store);
                }
            }
        }

        warn!("no system trust store found");
        Err(ProbeError::TrustStore("no system trust store found".into()))
    }

    /// Create a trust store from a PEM bundle.
    pub fn from_pem(pem_data: &[u8]) -> Result<Self, ProbeError> {
        let mut store = TrustStore::new();
        if store.add_pem_bundle(pem_data)? == 0 {
            return Err(ProbeError::TrustStore(
                "no certificates found in PEM input".into(),
            ));
        }
        Ok(store)
    }

    /// Create a trust store from a PEM file path.
    pub fn from_pem_file(path: &Path) -> Result<Self, ProbeError> {
        let data = std::fs::read(path)
            .map_err(|e| ProbeError::TrustStore(format!("{}: {}", path.display(), e)))?;
        Self::from_pem(&data)
    }

    /// Add a DER-encoded certificate. Duplicates are ignored.
    pub fn add_der(&mut self, der: &[u8]) -> Result<(), ProbeError> {
        X509Certificate::from_der(der)
            .map_err(|e| ProbeError::TrustStore(format!("invalid CA certificate: {}", e)))?;
        if !self.contains(der) {
            self.certs.push(CertificateDer::from(der.to_vec()));
        }
        Ok(())
    }

    /// Add all certificates from a PEM bundle. Returns the number of
    /// certificates added, skipping those that fail to parse.
    pub fn add_pem_bundle(&mut self, pem_data: &[u8]) -> Result<usize, ProbeError> {
        let mut added = 0;
        for pem in Pem::iter_from_buffer(pem_data) {
            match pem {
                Ok(pem) if pem.label == "CERTIFICATE" || pem.label == "TRUSTED CERTIFICATE" => {
                    if self.add_der(&pem.contents).is_ok() {
                        added += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // Trailing garbage after the last certificate is tolerated.
                    if added > 0 {
                        break;
                    }
                    return Err(ProbeError::TrustStore(format!(
                        "failed to parse PEM: {}",
                        e
                    )));
                }
            }
        }
        Ok(added)
    }

    /// Load certificates from a directory of PEM files (like OpenSSL's
    /// `-CApath`).
    pub fn add_pem_directory(&mut self, dir: &Path) -> Result<usize, ProbeError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| ProbeError::TrustStore(format!("{}: {}", dir.display(), e)))?;
        let mut total = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_pem_cert_file(&path) {
                if let Ok(data) = std::fs::read(&path) {
                    if let Ok(added) = self.add_pem_bundle(&data) {
                        total += added;
                    }
                }
            }
        }
        Ok(total)
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn contains(&self, der: &[u8]) -> bool {
        self.certs.iter().any(|c| c.as_ref() == der)
    }

    /// Build a rustls root store from this store plus an optional extra
    /// anchor. Certificates rustls cannot use as anchors are skipped.
    pub fn root_store(&self, extra: Option<&Certificate>) -> Result<RootCertStore, ProbeError> {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(self.certs.iter().cloned());
        if ignored > 0 {
            debug!(ignored, "skipped unusable trust anchors");
        }

        if let Some(root) = extra {
            roots
                .add(CertificateDer::from(root.der().to_vec()))
                .map_err(|e| ProbeError::TrustStore(format!("discovered root CA: {}", e)))?;
        }

        if roots.is_empty() {
            return Err(ProbeError::TrustStore(format!(
                "no usable trust anchors ({} loaded)",
                added
            )));
        }
        Ok(roots)
    }
}

/// Find the system CA bundle path (same location OpenSSL uses).
pub fn find_system_ca_bundle() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SSL_CERT_FILE") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Some(p);
        }
    }

    let probe = openssl_probe::probe();
    if let Some(file) = probe.cert_file {
        let path = PathBuf::from(&file);
        if path.exists() {
            return Some(path);
        }
    }

    KNOWN_CA_BUNDLE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cert::tests::self_signed;

    #[test]
    fn from_pem_loads_every_certificate() {
        let a = self_signed("CA one", true);
        let b = self_signed("CA two", true);
        let bundle = format!("{}{}", a.cert.pem(), b.cert.pem());
        let store = TrustStore::from_pem(bundle.as_bytes()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains(a.cert.der()));
    }

    #[test]
    fn duplicates_are_ignored() {
        let a = self_signed("CA", true);
        let bundle = format!("{}{}", a.cert.pem(), a.cert.pem());
        let store = TrustStore::from_pem(bundle.as_bytes()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn non_certificate_blocks_are_skipped() {
        let a = self_signed("CA", true);
        let bundle = format!("{}{}", a.key.serialize_pem(), a.cert.pem());
        let store = TrustStore::from_pem(bundle.as_bytes()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_pem_is_an_error() {
        assert!(matches!(
            TrustStore::from_pem(b""),
            Err(ProbeError::TrustStore(_))
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = TrustStore::from_pem_file(Path::new("/nonexistent/ca.pem")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ca.pem"));
    }

    #[test]
    fn directory_loading() {
        let tmp = tempfile::tempdir().unwrap();
        let a = self_signed("dir CA", true);
        std::fs::write(tmp.path().join("a.crt"), a.cert.pem()).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), a.cert.pem()).unwrap();
        let mut store = TrustStore::new();
        assert_eq!(store.add_pem_directory(tmp.path()).unwrap(), 1);
    }

    #[test]
    fn root_store_includes_extra_anchor() {
        let store = TrustStore::new();
        assert!(store.root_store(None).is_err());

        let extra = self_signed("discovered", true);
        let cert = Certificate::from_der(extra.cert.der()).unwrap();
        let roots = store.root_store(Some(&cert)).unwrap();
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn hash_link_names_are_cert_files() {
        assert!(is_pem_cert_file(Path::new("/etc/ssl/certs/a1b2c3d4.0")));
        assert!(is_pem_cert_file(Path::new("ca.pem")));
        assert!(!is_pem_cert_file(Path::new("ca.key")));
        assert!(!is_pem_cert_file(Path::new("README")));
    }
}

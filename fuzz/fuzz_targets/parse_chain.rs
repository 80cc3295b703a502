#![no_main]

use libfuzzer_sys::fuzz_target;
use tlsprobe_lib::{Certificate, CertificateChain};

fuzz_target!(|data: &[u8]| {
    // Treat the input as a single certificate and as a two-element chain.
    if let Ok(cert) = Certificate::from_der(data) {
        let _ = cert.is_self_signed();
        let _ = cert.sha256_fingerprint();
        let summary = cert.summary();
        assert!(summary.pem.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    let mid = data.len() / 2;
    let (first, second) = data.split_at(mid);
    if let Ok(chain) = CertificateChain::from_der_chain(&[first, second]) {
        if let Some(root) = &chain.root {
            assert!(root.is_self_signed());
        }
        let _ = tlsprobe_lib::display_chain(&chain);
    }
});

#![no_main]

use libfuzzer_sys::fuzz_target;
use tlsprobe_lib::{resolve_endpoint, Override, OverrideSet, ValidationRequest};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(endpoint) = resolve_endpoint(raw) {
        assert!(!endpoint.host.is_empty(), "empty host from {raw:?}");
        assert!(!endpoint.host.starts_with('['), "bracketed host from {raw:?}");
        let _ = endpoint.authority();
        let _ = endpoint.to_string();
    }

    // Override names never panic, whatever the input.
    let _ = raw.parse::<Override>();
    let granted: OverrideSet = raw.split(',').filter_map(|s| s.parse().ok()).collect();
    let _ = ValidationRequest {
        baseurl: raw.to_string(),
        client_identity: None,
        granted,
    };
});

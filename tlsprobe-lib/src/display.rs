//! Human-readable and JSON formatting of validation outcomes.

use crate::cert::{CertificateChain, CertificateSummary};
use crate::validate::ValidationOutcome;
use crate::ProbeError;

/// Format an outcome as human-readable text.
pub fn display_text(outcome: &ValidationOutcome) -> String {
    let mut out = String::new();

    if outcome.accepted {
        out.push_str("Result: ACCEPTED\n");
    } else {
        out.push_str("Result: REJECTED\n");
    }

    if !outcome.errors.is_empty() {
        out.push_str("Errors:\n");
        for e in &outcome.errors {
            out.push_str(&format!("  - {}\n", e));
        }
    }

    if !outcome.required_overrides.is_empty() {
        out.push_str("Overrides that would let validation continue:\n");
        for (order, o) in outcome.required_overrides.ordered() {
            out.push_str(&format!("  {}. {} ({})\n", order + 1, o.label(), o));
        }
    }

    if let Some(discovered) = &outcome.discovered {
        out.push_str("Discovered root CA:\n");
        format_summary(&mut out, &discovered.root, "    ");
        out.push_str("  Presented by:\n");
        format_summary(&mut out, &discovered.leaf, "    ");
    }

    if !outcome.review_overrides.is_empty() {
        out.push_str("Overrides that confirm the discovered root CA:\n");
        for o in outcome.review_overrides.iter() {
            out.push_str(&format!("  - {} ({})\n", o.label(), o));
        }
    }

    out
}

/// Format an inspected chain as human-readable text, with the root in PEM.
pub fn display_chain(chain: &CertificateChain) -> String {
    let mut out = String::new();

    out.push_str("Leaf:\n");
    format_summary(&mut out, &chain.leaf.summary(), "  ");

    match &chain.root {
        Some(root) => {
            let summary = root.summary();
            out.push_str("Root CA:\n");
            format_summary(&mut out, &summary, "  ");
            out.push_str(&summary.pem);
        }
        None if chain.leaf.is_self_signed() => {
            out.push_str("Root CA: none (leaf is self-signed)\n");
        }
        None => out.push_str("Root CA: not presented\n"),
    }

    out
}

fn format_summary(out: &mut String, s: &CertificateSummary, indent: &str) {
    let cn = |v: &Option<String>| v.clone().unwrap_or_else(|| "(none)".into());
    out.push_str(&format!("{}Subject CN: {}\n", indent, cn(&s.subject_cn)));
    out.push_str(&format!("{}Issuer CN:  {}\n", indent, cn(&s.issuer_cn)));
    out.push_str(&format!("{}Not Before: {}\n", indent, s.not_before));
    out.push_str(&format!("{}Not After:  {}\n", indent, s.not_after));
    out.push_str(&format!("{}SHA-256:    {}\n", indent, s.sha256_fingerprint));
}

/// Serialize an outcome to pretty-printed JSON.
pub fn to_json(outcome: &ValidationOutcome) -> Result<String, ProbeError> {
    Ok(serde_json::to_string_pretty(outcome)?)
}

//! End-to-end validation passes against servers on the loopback interface.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, ServerConnection};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tlsprobe_lib::{
    resolve_endpoint, DirectoryIdentities, NetworkProber, Override, OverrideSet, ProbeConfig,
    Prober, TrustStore, ValidationOutcome, ValidationRequest, Validator,
};

struct Issued {
    cert: rcgen::Certificate,
    key: KeyPair,
}

fn params(cn: &str, names: &[&str], ca: bool) -> CertificateParams {
    let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    let mut params = CertificateParams::new(names).unwrap();
    params.distinguished_name = rcgen::DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, cn);
    if ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    }
    params
}

fn root_ca(cn: &str) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = params(cn, &[], true).self_signed(&key).unwrap();
    Issued { cert, key }
}

fn issue(cn: &str, names: &[&str], ca: bool, issuer: &Issued) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = params(cn, names, ca)
        .signed_by(&key, &issuer.cert, &issuer.key)
        .unwrap();
    Issued { cert, key }
}

fn self_signed_server(cn: &str) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = params(cn, &[cn], false).self_signed(&key).unwrap();
    Issued { cert, key }
}

fn serve(mut stream: TcpStream, config: Arc<ServerConfig>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let Ok(mut conn) = ServerConnection::new(config) else {
        return;
    };
    while conn.is_handshaking() {
        if conn.complete_io(&mut stream).is_err() {
            return;
        }
    }
    // Flush session tickets and wait for close_notify.
    let _ = conn.complete_io(&mut stream);
}

fn server_identity(chain: &[&Issued]) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
    let certs = chain.iter().map(|i| i.cert.der().clone()).collect();
    let leaf_key = &chain.first().expect("chain has a leaf").key;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));
    (certs, key)
}

/// Start a TLS server presenting `chain` (leaf first). Returns its port.
fn tls_server(chain: &[&Issued]) -> u16 {
    let (certs, key) = server_identity(chain);
    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .unwrap();
    listen(Arc::new(config))
}

/// Start a TLS 1.2 server that requires a client certificate issued by
/// `client_ca`. Under TLS 1.2 the server's Finished follows client
/// certificate verification, so a rejected client sees the failure.
fn mtls_server(chain: &[&Issued], client_ca: &Issued) -> u16 {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut roots = RootCertStore::empty();
    roots.add(client_ca.cert.der().clone()).unwrap();
    let client_verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .unwrap();

    let (certs, key) = server_identity(chain);
    let config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12])
        .unwrap()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(certs, key)
        .unwrap();
    listen(Arc::new(config))
}

fn listen(config: Arc<ServerConfig>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let config = config.clone();
            thread::spawn(move || serve(stream, config));
        }
    });
    port
}

/// A listener that answers every connection with plain HTTP.
fn plain_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for mut stream in listener.incoming().flatten() {
            let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n");
            let _ = stream.flush();
        }
    });
    port
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn store_with(anchors: &[&Issued]) -> TrustStore {
    let mut store = TrustStore::new();
    for a in anchors {
        store.add_der(a.cert.der()).unwrap();
    }
    store
}

/// A validator whose trust store holds only an unrelated CA.
fn validator() -> Validator<NetworkProber> {
    validator_trusting(&[&root_ca("Unrelated CA")])
}

fn validator_trusting(anchors: &[&Issued]) -> Validator<NetworkProber> {
    let config = ProbeConfig::new(Duration::from_secs(5), store_with(anchors));
    Validator::without_identities(NetworkProber::new(config))
}

fn https(port: u16) -> ValidationRequest {
    ValidationRequest::new(format!("https://127.0.0.1:{}", port))
}

fn set(items: &[Override]) -> OverrideSet {
    items.iter().copied().collect()
}

fn trust_options() -> OverrideSet {
    set(&[
        Override::ForceCreation,
        Override::TlsServerInsecure,
        Override::TlsServerDiscoverRootca,
    ])
}

fn assert_rejected(outcome: &ValidationOutcome, required: OverrideSet) {
    assert!(!outcome.accepted, "unexpectedly accepted");
    assert_eq!(outcome.required_overrides, required, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.errors.len(), 1);
}

#[test]
fn closed_port_offers_force() {
    let port = closed_port();
    let outcome = validator().validate(&https(port));
    assert_rejected(&outcome, set(&[Override::ForceCreation]));
    assert!(outcome.errors[0].contains(&port.to_string()));
}

#[test]
fn force_accepts_closed_port() {
    let outcome = validator().validate(&https(closed_port()).grant(Override::ForceCreation));
    assert!(outcome.accepted);
}

#[test]
fn plain_http_is_accepted() {
    let port = plain_server();
    let request = ValidationRequest::new(format!("http://127.0.0.1:{}/api", port));
    let outcome = validator().validate(&request);
    assert!(outcome.accepted, "errors: {:?}", outcome.errors);
}

#[test]
fn plain_listener_fails_tls() {
    let port = plain_server();
    let outcome = validator().validate(&https(port).grant(Override::TlsServerInsecure));
    assert_rejected(&outcome, set(&[Override::ForceCreation]));
    assert!(outcome.errors[0].starts_with("TLS handshake failed"));
}

#[test]
fn self_signed_server_offers_trust_options() {
    let server = self_signed_server("127.0.0.1");
    let port = tls_server(&[&server]);
    let v = validator();

    let outcome = v.validate(&https(port));
    assert_rejected(&outcome, trust_options());
    assert!(outcome.discovered.is_none());

    let outcome = v.validate(&https(port).grant(Override::TlsServerDiscoverRootca));
    assert_rejected(&outcome, trust_options());
    assert_eq!(
        outcome.errors,
        vec!["The remote didn't provide any non-self-signed TLS certificate"]
    );

    let outcome = v.validate(&https(port).grant(Override::TlsServerInsecure));
    assert!(outcome.accepted);
}

#[test]
fn isolated_pki_discovery_and_acceptance() {
    let root = root_ca("Lab Root CA");
    let leaf = issue("127.0.0.1", &["127.0.0.1"], false, &root);
    let port = tls_server(&[&leaf, &root]);
    let v = validator();

    let outcome = v.validate(&https(port).grant(Override::TlsServerDiscoverRootca));
    assert_rejected(&outcome, trust_options());
    assert_eq!(
        outcome.review_overrides,
        set(&[Override::TlsServerAcceptRootca, Override::TlsServerAcceptCn])
    );
    let discovered = outcome.discovered.unwrap();
    assert_eq!(discovered.root.subject_cn.as_deref(), Some("Lab Root CA"));
    assert_eq!(discovered.leaf.subject_cn.as_deref(), Some("127.0.0.1"));
    assert!(discovered.root.pem.starts_with("-----BEGIN CERTIFICATE-----"));

    let outcome = v.validate(
        &https(port)
            .grant(Override::TlsServerDiscoverRootca)
            .grant(Override::TlsServerAcceptRootca),
    );
    assert!(outcome.accepted, "errors: {:?}", outcome.errors);
    assert!(outcome.discovered.is_some());
}

#[test]
fn accept_rootca_without_discovery_is_ignored() {
    let root = root_ca("Lab Root CA");
    let leaf = issue("127.0.0.1", &["127.0.0.1"], false, &root);
    let port = tls_server(&[&leaf, &root]);

    let outcome = validator().validate(&https(port).grant(Override::TlsServerAcceptRootca));
    assert_rejected(&outcome, trust_options());
}

#[test]
fn accept_cn_tolerates_name_mismatch() {
    let root = root_ca("Appliance CA");
    let leaf = issue("appliance.lab", &["appliance.lab"], false, &root);
    let port = tls_server(&[&leaf, &root]);
    let v = validator();

    let discover_and_trust = https(port)
        .grant(Override::TlsServerDiscoverRootca)
        .grant(Override::TlsServerAcceptRootca);

    let outcome = v.validate(&discover_and_trust);
    assert_rejected(&outcome, trust_options());
    assert_eq!(outcome.review_overrides, set(&[Override::TlsServerAcceptCn]));

    let outcome = v.validate(&discover_and_trust.clone().grant(Override::TlsServerAcceptCn));
    assert!(outcome.accepted, "errors: {:?}", outcome.errors);
}

#[test]
fn intermediate_only_chain_has_no_root() {
    let root = root_ca("Hidden Root");
    let intermediate = issue("Issuing CA", &[], true, &root);
    let leaf = issue("127.0.0.1", &["127.0.0.1"], false, &intermediate);
    let port = tls_server(&[&leaf, &intermediate]);

    let outcome = validator().validate(&https(port).grant(Override::TlsServerDiscoverRootca));
    assert_rejected(&outcome, trust_options());
    assert_eq!(
        outcome.errors,
        vec!["The remote didn't provide any root CA certificate"]
    );
}

#[test]
fn trusted_server_is_accepted() {
    let root = root_ca("Corporate Root");
    let leaf = issue("127.0.0.1", &["127.0.0.1"], false, &root);
    let port = tls_server(&[&leaf]);

    let outcome = validator_trusting(&[&root]).validate(&https(port));
    assert_eq!(
        outcome,
        ValidationOutcome {
            accepted: true,
            errors: vec![],
            required_overrides: OverrideSet::new(),
            review_overrides: OverrideSet::new(),
            discovered: None,
        }
    );
}

#[test]
fn trusted_server_wrong_name_is_rejected() {
    let root = root_ca("Corporate Root");
    let leaf = issue("other.example", &["other.example"], false, &root);
    let port = tls_server(&[&leaf]);

    let outcome = validator_trusting(&[&root]).validate(&https(port));
    assert_rejected(&outcome, trust_options());
}

#[test]
fn inspector_reports_presented_chain() {
    let root = root_ca("Lab Root CA");
    let leaf = issue("127.0.0.1", &["127.0.0.1"], false, &root);
    let port = tls_server(&[&leaf, &root]);

    let prober = NetworkProber::new(ProbeConfig::new(Duration::from_secs(5), TrustStore::new()));
    let endpoint = resolve_endpoint(&format!("https://127.0.0.1:{}", port)).unwrap();
    let chain = prober.inspect_chain(&endpoint, None).unwrap();
    assert_eq!(chain.leaf.subject_cn.as_deref(), Some("127.0.0.1"));
    assert_eq!(chain.leaf.issuer_cn.as_deref(), Some("Lab Root CA"));
    assert_eq!(chain.leaf.der(), leaf.cert.der().as_ref());
    assert_eq!(chain.root.unwrap().der(), root.cert.der().as_ref());
}

#[test]
fn repeated_passes_agree() {
    let server = self_signed_server("127.0.0.1");
    let port = tls_server(&[&server]);
    let v = validator();
    let request = https(port).grant(Override::TlsServerDiscoverRootca);
    assert_eq!(v.validate(&request), v.validate(&request));
}

#[test]
fn client_certificate_required_by_server() {
    let server_root = root_ca("Service Root");
    let leaf = issue("127.0.0.1", &["127.0.0.1"], false, &server_root);
    let client_ca = root_ca("Agent CA");
    let agent = issue("agent", &[], false, &client_ca);
    let port = mtls_server(&[&leaf], &client_ca);

    let dir = tempfile::tempdir().unwrap();
    let pem = format!("{}{}", agent.cert.pem(), agent.key.serialize_pem());
    std::fs::write(dir.path().join("agent.pem"), pem).unwrap();

    let config = ProbeConfig::new(Duration::from_secs(5), store_with(&[&server_root]));
    let v = Validator::new(NetworkProber::new(config), DirectoryIdentities::new(dir.path()));

    let outcome = v.validate(&https(port));
    assert_rejected(&outcome, set(&[Override::ForceCreation]));
    assert!(outcome.errors[0].starts_with("TLS handshake failed"));

    let outcome = v.validate(&https(port).with_client_identity("agent"));
    assert!(outcome.accepted, "errors: {:?}", outcome.errors);
}

#[test]
fn foreign_client_certificate_is_refused() {
    let server_root = root_ca("Service Root");
    let leaf = issue("127.0.0.1", &["127.0.0.1"], false, &server_root);
    let client_ca = root_ca("Agent CA");
    let stranger = self_signed_server("stranger");
    let port = mtls_server(&[&leaf], &client_ca);

    let dir = tempfile::tempdir().unwrap();
    let pem = format!("{}{}", stranger.cert.pem(), stranger.key.serialize_pem());
    std::fs::write(dir.path().join("stranger.pem"), pem).unwrap();

    let config = ProbeConfig::new(Duration::from_secs(5), store_with(&[&server_root]));
    let v = Validator::new(NetworkProber::new(config), DirectoryIdentities::new(dir.path()));
    let outcome = v.validate(&https(port).with_client_identity("stranger"));
    assert_rejected(&outcome, set(&[Override::ForceCreation]));
}

//! tlsprobe: Check that a remote HTTP(S) endpoint is reachable and trusted.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rayon::prelude::*;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tlsprobe_lib::probe::DEFAULT_TIMEOUT;
use tlsprobe_lib::{
    DirectoryIdentities, IdentityResolver, NetworkProber, NoIdentities, Override, ProbeConfig,
    Prober, TrustStore, ValidationOutcome, ValidationRequest, Validator,
};
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "tlsprobe",
    about = "Validate connectivity and TLS trust of a remote HTTP(S) endpoint",
    long_about = "tlsprobe checks, in escalating steps, that a remote endpoint is reachable\n\
                  over TCP, that it speaks TLS, what certificate chain it presents and that\n\
                  a fully verified handshake succeeds.\n\n\
                  When a step fails, the overrides that would let validation continue are\n\
                  listed. Grant them with --grant and run the check again.",
    after_help = "EXAMPLES:\n\
                  \n  tlsprobe check https://api.example.com\
                  \n  tlsprobe check --grant tls_server_discover_rootca https://10.0.0.5:8443\
                  \n  tlsprobe check --grant tls_server_discover_rootca \\\
                  \n      --grant tls_server_accept_rootca https://10.0.0.5:8443\
                  \n  tlsprobe check --json http://10.0.0.5:8080\
                  \n  tlsprobe batch endpoints.txt\
                  \n  tlsprobe chain https://10.0.0.5:8443\
                  \n  tlsprobe overrides"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG is used otherwise.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one validation pass (exit 0 = accepted, 2 = rejected)
    Check {
        /// Base URL: http[s]://<HOST>[:<PORT>][/<BASE_LOCATION>]
        url: String,
        #[command(flatten)]
        probe: ProbeArgs,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Validate every URL listed in a file, in parallel (exit 2 if any is rejected)
    #[command(after_help = "FILE holds one base URL per line. Empty lines and lines starting\n\
                            with '#' are skipped. Reads from stdin if FILE is omitted.")]
    Batch {
        /// File with one base URL per line. Reads from stdin if omitted.
        file: Option<PathBuf>,
        #[command(flatten)]
        probe: ProbeArgs,
        /// Only print rejected endpoints
        #[arg(long)]
        failures_only: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show the certificate chain an https endpoint presents, without verifying it
    Chain {
        /// Base URL: https://<HOST>[:<PORT>]
        url: String,
        #[command(flatten)]
        probe: ProbeArgs,
    },
    /// List the client identities found in a directory
    Identities {
        /// Directory holding <name>.pem identity files
        #[arg(long, value_name = "DIR")]
        identity_dir: PathBuf,
    },
    /// List the overrides an operator can grant
    Overrides,
}

#[derive(Args)]
struct ProbeArgs {
    /// Per-probe timeout, 60s by default (plain numbers are seconds; humantime units accepted)
    #[arg(long, value_name = "DURATION")]
    timeout: Option<String>,
    /// Grant an override (repeatable, or comma-separated)
    #[arg(long, value_name = "OVERRIDE", value_delimiter = ',')]
    grant: Vec<Override>,
    /// Name of the TLS client identity to present
    #[arg(long, value_name = "NAME")]
    identity: Option<String>,
    /// Directory holding <name>.pem identity files
    #[arg(long, value_name = "DIR")]
    identity_dir: Option<PathBuf>,
    /// PEM file containing trusted CA certificates (default: system trust store)
    #[arg(long = "CAfile", visible_alias = "ca-file", value_name = "FILE")]
    ca_file: Option<PathBuf>,
    /// Directory of trusted CA certificates in PEM format
    #[arg(long = "CApath", visible_alias = "ca-path", value_name = "DIR")]
    ca_path: Option<PathBuf>,
}

type Identities = Box<dyn IdentityResolver + Send + Sync>;

impl ProbeArgs {
    fn trust_store(&self) -> Result<TrustStore> {
        let mut store = match &self.ca_file {
            Some(path) => TrustStore::from_pem_file(path)?,
            None => TrustStore::system().unwrap_or_else(|e| {
                warn!("verified handshakes will fail: {}", e);
                TrustStore::new()
            }),
        };
        if let Some(dir) = &self.ca_path {
            store.add_pem_directory(dir)?;
        }
        Ok(store)
    }

    fn timeout(&self) -> Result<Duration> {
        match &self.timeout {
            Some(s) => parse_duration(s),
            None => Ok(DEFAULT_TIMEOUT),
        }
    }

    fn validator(&self) -> Result<Validator<NetworkProber, Identities>> {
        let config = ProbeConfig::new(self.timeout()?, self.trust_store()?);
        let identities: Identities = match &self.identity_dir {
            Some(dir) => Box::new(DirectoryIdentities::new(dir)),
            None => Box::new(NoIdentities),
        };
        Ok(Validator::new(NetworkProber::new(config), identities))
    }

    fn request(&self, url: &str) -> ValidationRequest {
        ValidationRequest {
            baseurl: url.to_string(),
            client_identity: self.identity.clone(),
            granted: self.grant.iter().copied().collect(),
        }
    }
}

/// Maximum size of a batch input (1 MiB).
const MAX_INPUT_BYTES: u64 = 1024 * 1024;

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => {
            let meta = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat file: {}", path.display()))?;
            if meta.len() > MAX_INPUT_BYTES {
                anyhow::bail!(
                    "File too large ({} bytes, max {} bytes): {}",
                    meta.len(),
                    MAX_INPUT_BYTES,
                    path.display()
                );
            }
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file: {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .take(MAX_INPUT_BYTES)
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

/// URLs of a batch file: one per line, skipping blanks and `#` comments.
fn batch_urls(input: &str) -> Vec<&str> {
    input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

/// Parse a duration string using humantime format.
///
/// Plain numbers (e.g. "30") are seconds. Otherwise, standard humantime
/// units are accepted: `ms`, `s`, `m`, `h`, etc. Zero is rejected.
fn parse_duration(s: &str) -> Result<Duration> {
    let d = if s.chars().all(|c| c.is_ascii_digit()) {
        Duration::from_secs(s.parse().context("Invalid duration value")?)
    } else {
        humantime::parse_duration(s).with_context(|| format!("Invalid duration: '{s}'"))?
    };
    if d.is_zero() {
        anyhow::bail!("Timeout must be greater than zero");
    }
    Ok(d)
}

/// One-line summary used by batch mode.
fn batch_detail(outcome: &ValidationOutcome) -> String {
    if outcome.accepted {
        return "ACCEPTED".to_string();
    }
    let mut detail = format!("REJECTED ({})", outcome.errors.join("; "));
    if !outcome.required_overrides.is_empty() {
        detail.push_str(&format!(" overrides: {}", outcome.required_overrides));
    }
    if !outcome.review_overrides.is_empty() {
        detail.push_str(&format!(" review: {}", outcome.review_overrides));
    }
    detail
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Check { url, probe, json } => {
            let validator = probe.validator()?;
            let outcome = validator.validate(&probe.request(url));

            if *json {
                println!("{}", tlsprobe_lib::to_json(&outcome)?);
            } else {
                print!("{}", tlsprobe_lib::display_text(&outcome));
            }
            if !outcome.accepted {
                std::process::exit(2);
            }
        }
        Commands::Batch {
            file,
            probe,
            failures_only,
            json,
        } => {
            let input = read_input(file.as_ref())?;
            let urls = batch_urls(&input);
            let validator = probe.validator()?;

            let results: Vec<(&str, ValidationOutcome)> = urls
                .par_iter()
                .map(|url| (*url, validator.validate(&probe.request(url))))
                .collect();
            let failures = results.iter().filter(|(_, o)| !o.accepted).count();

            if *json {
                let entries: Vec<serde_json::Value> = results
                    .iter()
                    .filter(|(_, o)| !*failures_only || !o.accepted)
                    .map(|(url, o)| serde_json::json!({ "baseurl": url, "outcome": o }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for (url, outcome) in &results {
                    if outcome.accepted {
                        if !*failures_only {
                            println!("{}: {}", url, batch_detail(outcome));
                        }
                    } else {
                        eprintln!("{}: {}", url, batch_detail(outcome));
                    }
                }
            }
            if failures > 0 {
                std::process::exit(2);
            }
        }
        Commands::Chain { url, probe } => {
            let endpoint = tlsprobe_lib::resolve_endpoint(url)?;
            if !endpoint.scheme.is_secure() {
                anyhow::bail!("{} is not an https URL", endpoint);
            }
            let validator = probe.validator()?;
            let identity = match &probe.identity {
                Some(name) => Some(validator.identities().resolve(name)?),
                None => None,
            };
            let chain = validator
                .prober()
                .inspect_chain(&endpoint, identity.as_ref())?;
            print!("{}", tlsprobe_lib::display_chain(&chain));
        }
        Commands::Identities { identity_dir } => {
            let identities = DirectoryIdentities::new(identity_dir);
            if !identities.dir().is_dir() {
                anyhow::bail!("Not a directory: {}", identity_dir.display());
            }
            for name in identities.list() {
                println!("{}", name);
            }
        }
        Commands::Overrides => {
            for o in Override::ALL {
                println!("{:<28}{}", o.as_str(), o.label());
                println!("{:<28}{}", "", o.description());
            }
        }
    }

    Ok(())
}

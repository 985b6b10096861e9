//! trustharness - conformance runner for a trust-metadata client
//!
//! Builds the client, waits for the trust service, runs the standard
//! scenario pipeline against it, and writes a success marker when every
//! scenario passes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use trustharness_core::HarnessConfig;
use trustharness_core::config::{DEFAULT_SERVER, SettleMode};

mod driver;

/// trustharness - conformance runner for a trust-metadata client
#[derive(Parser, Debug)]
#[command(name = "trustharness")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Identity (GUN) to test; randomly generated if not provided
    #[arg(short = 'r', long = "reponame")]
    identity: Option<String>,

    /// Trust server to connect to
    #[arg(short, long)]
    server: Option<String>,

    /// Username for the token endpoint and client login prompts
    #[arg(short, long, env = "TRUSTHARNESS_USERNAME")]
    username: Option<String>,

    /// Password for `--username`
    #[arg(short, long, env = "TRUSTHARNESS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CA certificate for the server; fetched from `<server>/ca` if omitted
    #[arg(long)]
    tlscacert: Option<PathBuf>,

    /// Trust client binary
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Directory holding the delegation certificate and key
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Use an existing client binary instead of building one
    #[arg(long)]
    skip_build: bool,

    /// Where to write the success marker
    #[arg(long)]
    success_marker: Option<PathBuf>,

    /// How to wait for the change feed after mutations
    #[arg(long, value_enum)]
    settle: Option<SettleArg>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SettleArg {
    /// Sleep once before each feed query
    Fixed,
    /// Poll until the expected records appear
    Poll,
}

impl From<SettleArg> for SettleMode {
    fn from(arg: SettleArg) -> Self {
        match arg {
            SettleArg::Fixed => Self::Fixed,
            SettleArg::Poll => Self::Poll,
        }
    }
}

impl Cli {
    /// Loads the configuration file, if any, and applies flag overrides.
    fn load_config(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => HarnessConfig::new(DEFAULT_SERVER),
        };

        if let Some(server) = &self.server {
            config.server = server.trim().to_string();
        }
        if let Some(identity) = &self.identity {
            config.identity = Some(identity.clone());
        }
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(SecretString::from(password.clone()));
        }
        if let Some(path) = &self.tlscacert {
            config.tls_ca_cert = Some(path.clone());
        }
        if let Some(path) = &self.binary {
            config.client_binary = Some(path.clone());
        }
        if let Some(path) = &self.fixtures {
            config.fixtures_dir = Some(path.clone());
        }
        if let Some(path) = &self.success_marker {
            config.success_marker = path.clone();
        }
        if let Some(mode) = self.settle {
            config.settle.mode = mode.into();
        }
        if self.skip_build {
            config.build.enabled = false;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = cli.load_config()?;
    let repo_root = std::env::current_dir().context("failed to determine working directory")?;
    driver::run(&config, &repo_root)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use trustharness_core::SettlePolicy;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("trustharness").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_config_file() {
        let config = parse(&[]).load_config().unwrap();
        assert_eq!(config.server, DEFAULT_SERVER);
        assert!(config.identity.is_none());
        assert!(config.build.enabled);
        assert_eq!(
            config.settle.policy(),
            SettlePolicy::Poll {
                interval: Duration::from_secs(2),
                timeout: Duration::from_secs(90),
            }
        );
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(
            &path,
            "server = \"https://from-file:4443\"\nidentity = \"file-gun\"\n",
        )
        .unwrap();

        let config = parse(&[
            "-c",
            path.to_str().unwrap(),
            "-s",
            " https://Override:4443/Notary/ ",
            "-r",
            "flag-gun",
            "--skip-build",
            "--settle",
            "fixed",
        ])
        .load_config()
        .unwrap();

        assert_eq!(config.server, "https://Override:4443/Notary");
        assert_eq!(config.identity.as_deref(), Some("flag-gun"));
        assert!(!config.build.enabled);
        assert_eq!(
            config.settle.policy(),
            SettlePolicy::Fixed(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_server_path_case_is_preserved() {
        let config = parse(&["-s", "https://Host:4443/Notary/"]).load_config().unwrap();
        assert_eq!(config.server, "https://Host:4443/Notary");
    }

    #[test]
    fn test_credentials_from_flags() {
        let config = parse(&["-u", "alice", "-p", "s3cret"]).load_config().unwrap();
        let credentials = config.credentials().unwrap();
        assert_eq!(credentials.username, "alice");
        assert_eq!(credentials.password.expose_secret(), "s3cret");
    }

    #[test]
    fn test_unknown_settle_mode_is_rejected() {
        assert!(
            Cli::try_parse_from(["trustharness", "--settle", "sometimes"]).is_err()
        );
    }

    #[test]
    fn test_non_http_server_is_rejected() {
        let error = parse(&["-s", "notary-server:4443"]).load_config().unwrap_err();
        assert!(format!("{error:#}").contains("http(s) URL"));
    }
}

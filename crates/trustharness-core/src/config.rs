//! Harness configuration.
//!
//! Configuration is read from a TOML file and then overridden by
//! command-line flags. Every field except `server` has a default, so the
//! smallest valid file is a single line:
//!
//! ```toml
//! server = "https://notary-server:4443"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::changefeed::SettlePolicy;
use crate::client::Credentials;

/// Trust server used when neither a config file nor a flag names one.
pub const DEFAULT_SERVER: &str = "https://notary-server:4443";

/// Default `service`/`realm` query value of the token endpoint.
pub const DEFAULT_TOKEN_SERVICE: &str = "dtr";

/// Default location of the success sentinel.
pub const DEFAULT_SUCCESS_MARKER: &str = "/test_output/SUCCESS";

/// Go package built into the trust client binary.
pub const DEFAULT_CLIENT_PACKAGE: &str = "github.com/theupdateframework/notary/cmd/notary";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are individually valid but inconsistent.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Base URL of the remote trust service.
    pub server: String,

    /// Identity (GUN) under test; generated when absent.
    #[serde(default)]
    pub identity: Option<String>,

    /// Basic-auth user for the token endpoint and the trust client.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Trust client binary.
    #[serde(default)]
    pub client_binary: Option<PathBuf>,

    /// CA certificate passed as `--tlscacert`; fetched from the server when
    /// absent.
    #[serde(default)]
    pub tls_ca_cert: Option<PathBuf>,

    /// Directory holding the delegation certificate and key.
    #[serde(default)]
    pub fixtures_dir: Option<PathBuf>,

    /// `service` query value of the token endpoint.
    #[serde(default = "default_token_service")]
    pub token_service: String,

    /// Where the success sentinel is written.
    #[serde(default = "default_success_marker")]
    pub success_marker: PathBuf,

    /// Change-feed settling.
    #[serde(default)]
    pub settle: SettleConfig,

    /// Startup liveness polling.
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Client binary build step.
    #[serde(default)]
    pub build: BuildConfig,
}

fn default_token_service() -> String {
    DEFAULT_TOKEN_SERVICE.to_string()
}

fn default_success_marker() -> PathBuf {
    PathBuf::from(DEFAULT_SUCCESS_MARKER)
}

/// How the harness waits for the change feed to catch up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleMode {
    /// One fixed sleep before each query.
    Fixed,
    /// Poll until the expected count appears or the timeout elapses.
    #[default]
    Poll,
}

/// Change-feed settling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettleConfig {
    /// Strategy.
    #[serde(default)]
    pub mode: SettleMode,
    /// Delay used by [`SettleMode::Fixed`].
    #[serde(default = "default_settle_delay")]
    pub delay_secs: u64,
    /// Poll interval used by [`SettleMode::Poll`].
    #[serde(default = "default_settle_interval")]
    pub interval_secs: u64,
    /// Poll deadline used by [`SettleMode::Poll`].
    #[serde(default = "default_settle_timeout")]
    pub timeout_secs: u64,
}

const fn default_settle_delay() -> u64 {
    60
}

const fn default_settle_interval() -> u64 {
    2
}

const fn default_settle_timeout() -> u64 {
    90
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            mode: SettleMode::default(),
            delay_secs: default_settle_delay(),
            interval_secs: default_settle_interval(),
            timeout_secs: default_settle_timeout(),
        }
    }
}

impl SettleConfig {
    /// Converts to the runtime policy.
    #[must_use]
    pub const fn policy(&self) -> SettlePolicy {
        match self.mode {
            SettleMode::Fixed => SettlePolicy::Fixed(Duration::from_secs(self.delay_secs)),
            SettleMode::Poll => SettlePolicy::Poll {
                interval: Duration::from_secs(self.interval_secs),
                timeout: Duration::from_secs(self.timeout_secs),
            },
        }
    }
}

/// Liveness polling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadinessConfig {
    /// Sleep between probes.
    #[serde(default = "default_readiness_interval")]
    pub interval_secs: u64,
    /// Give up after this long.
    #[serde(default = "default_readiness_timeout")]
    pub timeout_secs: u64,
}

const fn default_readiness_interval() -> u64 {
    1
}

const fn default_readiness_timeout() -> u64 {
    30
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_readiness_interval(),
            timeout_secs: default_readiness_timeout(),
        }
    }
}

impl ReadinessConfig {
    /// Probe interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Hard deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Client build step configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Whether to build the client before the run.
    #[serde(default = "default_build_enabled")]
    pub enabled: bool,
    /// Go package to build.
    #[serde(default = "default_build_package")]
    pub package: String,
}

const fn default_build_enabled() -> bool {
    true
}

fn default_build_package() -> String {
    DEFAULT_CLIENT_PACKAGE.to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            enabled: default_build_enabled(),
            package: default_build_package(),
        }
    }
}

impl HarnessConfig {
    /// A configuration with every default applied.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            identity: None,
            username: None,
            password: None,
            client_binary: None,
            tls_ca_cert: None,
            fixtures_dir: None,
            token_service: default_token_service(),
            success_marker: default_success_marker(),
            settle: SettleConfig::default(),
            readiness: ReadinessConfig::default(),
            build: BuildConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or contains unknown keys.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Checks cross-field consistency and normalises the server URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - the server URL is empty or not http(s)
    /// - only one of username and password is set
    /// - a polling interval is zero or longer than its timeout
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let server = self.server.trim().trim_end_matches('/').to_string();
        if server.is_empty() {
            return Err(ConfigError::Validation("server must not be empty".to_string()));
        }
        if !(server.starts_with("https://") || server.starts_with("http://")) {
            return Err(ConfigError::Validation(format!(
                "server must be an http(s) URL, got '{server}'"
            )));
        }
        self.server = server;

        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::Validation(
                "username and password must be supplied together".to_string(),
            ));
        }

        if let Some(identity) = &self.identity {
            if identity.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "identity must not be blank".to_string(),
                ));
            }
        }

        check_interval("settle", self.settle.interval_secs, self.settle.timeout_secs)?;
        check_interval(
            "readiness",
            self.readiness.interval_secs,
            self.readiness.timeout_secs,
        )?;
        Ok(())
    }

    /// Returns the configured identity or generates a random one.
    ///
    /// Random identities are 32 lowercase hex characters.
    #[must_use]
    pub fn resolve_identity(&self) -> String {
        self.identity
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
    }

    /// Credentials for the token endpoint and the client's login prompts.
    ///
    /// Trailing line endings are stripped from the password so both uses
    /// send the same value.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.trim().is_empty() => Some(Credentials {
                username: username.trim().to_string(),
                password: SecretString::from(
                    password
                        .expose_secret()
                        .trim_end_matches(['\r', '\n'])
                        .to_string(),
                ),
            }),
            _ => None,
        }
    }
}

fn check_interval(section: &str, interval: u64, timeout: u64) -> Result<(), ConfigError> {
    if interval == 0 {
        return Err(ConfigError::Validation(format!(
            "{section}.interval_secs must be greater than zero"
        )));
    }
    if interval > timeout {
        return Err(ConfigError::Validation(format!(
            "{section}.interval_secs ({interval}) exceeds {section}.timeout_secs ({timeout})"
        )));
    }
    Ok(())
}

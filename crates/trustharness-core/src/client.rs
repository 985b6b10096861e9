//! Typed invocation surface of the trust client.
//!
//! Every call is `<binary> -s <server> --tlscacert <ca> -d <dir> <subcommand>`
//! with the four role passphrases in the environment. When credentials are
//! configured they are answered on standard input after any caller-supplied
//! responses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tracing::{debug, info};

use crate::error::HarnessError;
use crate::executor::{CommandExecutor, Invocation, StdinScript};

/// Passphrase environment for the four signing-key roles.
pub const ROLE_PASSPHRASES: [(&str, &str); 4] = [
    ("NOTARY_ROOT_PASSPHRASE", "root_ponies"),
    ("NOTARY_TARGETS_PASSPHRASE", "targets_ponies"),
    ("NOTARY_SNAPSHOT_PASSPHRASE", "snapshot_ponies"),
    ("NOTARY_DELEGATION_PASSPHRASE", "user_ponies"),
];

/// Answer given to the root rotation confirmation prompt.
pub const ROOT_ROTATION_CONFIRMATION: &str = "yes";

/// Login for the remote service.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password, never logged.
    pub password: SecretString,
}

impl Credentials {
    fn as_script(&self) -> StdinScript {
        use secrecy::ExposeSecret;

        StdinScript::empty()
            .then("username", self.username.clone())
            .then("password", self.password.expose_secret())
    }
}

/// Drives the trust client through a [`CommandExecutor`].
pub struct TrustClient<E> {
    binary: PathBuf,
    server: String,
    tls_ca_cert: PathBuf,
    credentials: Option<Credentials>,
    executor: E,
}

impl<E: CommandExecutor> TrustClient<E> {
    /// Creates a client for one server.
    pub fn new(
        binary: impl Into<PathBuf>,
        server: impl Into<String>,
        tls_ca_cert: impl Into<PathBuf>,
        executor: E,
    ) -> Self {
        Self {
            binary: binary.into(),
            server: server.into(),
            tls_ca_cert: tls_ca_cert.into(),
            credentials: None,
            executor,
        }
    }

    /// Answers login prompts with `credentials` on every invocation.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// The underlying executor.
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Builds the full invocation for `args` against `trust_dir`.
    #[must_use]
    pub fn invocation(&self, trust_dir: &Path, args: &[&str], script: StdinScript) -> Invocation {
        let mut argv = vec![
            "-s".to_string(),
            self.server.clone(),
            "--tlscacert".to_string(),
            self.tls_ca_cert.display().to_string(),
            "-d".to_string(),
            trust_dir.display().to_string(),
        ];
        argv.extend(args.iter().map(ToString::to_string));

        let env: BTreeMap<String, SecretString> = ROLE_PASSPHRASES
            .iter()
            .map(|(name, value)| ((*name).to_string(), SecretString::from((*value).to_string())))
            .collect();

        let stdin = match &self.credentials {
            Some(credentials) => script.chain(&credentials.as_script()),
            None => script,
        };

        Invocation {
            program: self.binary.clone(),
            args: argv,
            env,
            stdin,
        }
    }

    /// Runs the client and returns its output.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailed`] on a non-zero exit status, or
    /// [`HarnessError::Launch`] if the client cannot be started.
    pub fn run(
        &self,
        trust_dir: &Path,
        args: &[&str],
        script: StdinScript,
    ) -> Result<String, HarnessError> {
        let invocation = self.invocation(trust_dir, args, script);
        let command = invocation.display_command();
        info!("$ {command}");

        let output = self.executor.execute(&invocation)?;
        debug!(output = %output.stdout, "client output");

        if output.succeeded() {
            Ok(output.stdout)
        } else {
            Err(HarnessError::CommandFailed {
                command,
                exit_code: output.exit_code,
                output: output.stdout,
            })
        }
    }

    fn run_plain(&self, trust_dir: &Path, args: &[&str]) -> Result<String, HarnessError> {
        self.run(trust_dir, args, StdinScript::empty())
    }

    /// `init <id>`
    pub fn init(&self, trust_dir: &Path, identity: &str) -> Result<String, HarnessError> {
        self.run_plain(trust_dir, &["init", identity])
    }

    /// `add <id> <name> <file> [-r <role>]`
    pub fn add(
        &self,
        trust_dir: &Path,
        identity: &str,
        name: &str,
        file: &Path,
        role: Option<&str>,
    ) -> Result<String, HarnessError> {
        let file = file.display().to_string();
        let mut args = vec!["add", identity, name, file.as_str()];
        if let Some(role) = role {
            args.extend(["-r", role]);
        }
        self.run_plain(trust_dir, &args)
    }

    /// `publish <id>`
    pub fn publish(&self, trust_dir: &Path, identity: &str) -> Result<String, HarnessError> {
        self.run_plain(trust_dir, &["publish", identity])
    }

    /// `list <id>`; also refreshes the directory's cached metadata.
    pub fn list(&self, trust_dir: &Path, identity: &str) -> Result<String, HarnessError> {
        self.run_plain(trust_dir, &["list", identity])
    }

    /// `verify <id> <name> -i <file> -q`
    pub fn verify(
        &self,
        trust_dir: &Path,
        identity: &str,
        name: &str,
        file: &Path,
    ) -> Result<String, HarnessError> {
        let file = file.display().to_string();
        self.run_plain(trust_dir, &["verify", identity, name, "-i", file.as_str(), "-q"])
    }

    /// `key rotate <id> <role> [-r]`
    pub fn rotate_key(
        &self,
        trust_dir: &Path,
        identity: &str,
        role: &str,
        remote: bool,
    ) -> Result<String, HarnessError> {
        let mut args = vec!["key", "rotate", identity, role];
        if remote {
            args.push("-r");
        }
        self.run_plain(trust_dir, &args)
    }

    /// `key rotate <id> root`, confirming the interactive prompt.
    pub fn rotate_root_key(&self, trust_dir: &Path, identity: &str) -> Result<String, HarnessError> {
        let script =
            StdinScript::empty().then("confirm root key rotation", ROOT_ROTATION_CONFIRMATION);
        self.run(trust_dir, &["key", "rotate", identity, "root"], script)
    }

    /// `key list`
    pub fn list_keys(&self, trust_dir: &Path) -> Result<String, HarnessError> {
        self.run_plain(trust_dir, &["key", "list"])
    }

    /// `key import <file> [-r <role>]`
    pub fn import_key(
        &self,
        trust_dir: &Path,
        file: &Path,
        role: Option<&str>,
    ) -> Result<String, HarnessError> {
        let file = file.display().to_string();
        let mut args = vec!["key", "import", file.as_str()];
        if let Some(role) = role {
            args.extend(["-r", role]);
        }
        self.run_plain(trust_dir, &args)
    }

    /// `delegation add <id> <role> <cert> --all-paths`
    pub fn add_delegation(
        &self,
        trust_dir: &Path,
        identity: &str,
        role: &str,
        cert: &Path,
    ) -> Result<String, HarnessError> {
        let cert = cert.display().to_string();
        self.run_plain(
            trust_dir,
            &["delegation", "add", identity, role, cert.as_str(), "--all-paths"],
        )
    }

    /// `delegation list <id>`
    pub fn list_delegations(&self, trust_dir: &Path, identity: &str) -> Result<String, HarnessError> {
        self.run_plain(trust_dir, &["delegation", "list", identity])
    }

    /// `delete --remote <id>`
    pub fn delete_remote(&self, trust_dir: &Path, identity: &str) -> Result<String, HarnessError> {
        self.run_plain(trust_dir, &["delete", "--remote", identity])
    }
}

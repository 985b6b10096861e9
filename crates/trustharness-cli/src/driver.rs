//! Run orchestration: build, readiness, CA, pipeline, success marker.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use tempfile::NamedTempFile;
use tracing::{info, warn};
use trustharness_core::scenario::{Fixtures, Pipeline, Tester};
use trustharness_core::{FeedProbe, HarnessConfig, HttpChangeFeed, ShellExecutor, TrustClient};
use xshell::{Shell, cmd};

/// Client binary location relative to the repository root.
const DEFAULT_BINARY: &str = "bin/notary";

/// Fixture directory relative to the repository root.
const DEFAULT_FIXTURES: &str = "fixtures";

/// Runs one full conformance pass.
pub fn run(config: &HarnessConfig, repo_root: &Path) -> Result<()> {
    let binary = config
        .client_binary
        .clone()
        .unwrap_or_else(|| repo_root.join(DEFAULT_BINARY));

    if config.build.enabled {
        build_client(repo_root, &binary, &config.build.package)?;
    } else {
        info!(binary = %binary.display(), "skipping client build");
    }

    let http = probe_client()?;
    wait_for_server(
        &http,
        &config.server,
        config.readiness.interval(),
        config.readiness.timeout(),
    )?;

    let fetched_ca = match &config.tls_ca_cert {
        Some(_) => None,
        None => Some(fetch_ca(&http, &config.server)?),
    };
    let ca_path: PathBuf = match (&config.tls_ca_cert, &fetched_ca) {
        (Some(path), _) => path.clone(),
        (None, Some(file)) => file.path().to_path_buf(),
        (None, None) => bail!("no CA certificate available"),
    };

    let outcome = run_pipeline(config, repo_root, binary, ca_path);
    if let Some(file) = fetched_ca {
        release_ca(file, outcome.is_ok());
    }
    outcome?;

    write_success_marker(&config.success_marker);
    Ok(())
}

fn run_pipeline(config: &HarnessConfig, repo_root: &Path, binary: PathBuf, ca_path: PathBuf) -> Result<()> {
    let identity = config.resolve_identity();
    let credentials = config.credentials();
    let fixtures_dir = config
        .fixtures_dir
        .clone()
        .unwrap_or_else(|| repo_root.join(DEFAULT_FIXTURES));

    let executor = ShellExecutor::new().context("failed to prepare command executor")?;
    let client = TrustClient::new(binary, config.server.as_str(), ca_path, executor)
        .with_credentials(credentials.clone());
    let feed = HttpChangeFeed::new(config.server.as_str(), config.token_service.as_str(), credentials)
        .context("failed to create change feed client")?;
    let probe = FeedProbe::new(feed, config.settle.policy());

    info!(identity = %identity, server = %config.server, "running conformance pipeline");
    let tester = Tester::new(identity.clone(), client, probe, Fixtures::in_dir(&fixtures_dir))
        .context("failed to prepare working directories")?;
    tester
        .run(&Pipeline::standard())
        .with_context(|| format!("conformance run for {identity} failed"))
}

/// Removes the fetched CA certificate after a passing run and keeps it on
/// disk after a failing one. Returns the kept path.
fn release_ca(file: NamedTempFile, passed: bool) -> Option<PathBuf> {
    if passed {
        if let Err(e) = file.close() {
            warn!(error = %e, "failed to remove fetched CA certificate");
        }
        return None;
    }
    match file.keep() {
        Ok((_, path)) => {
            warn!(path = %path.display(), "kept fetched CA certificate for inspection");
            Some(path)
        },
        Err(e) => {
            warn!(error = %e, "could not keep fetched CA certificate");
            None
        },
    }
}

/// Builds the client binary with `go build`.
fn build_client(repo_root: &Path, output: &Path, package: &str) -> Result<()> {
    info!(output = %output.display(), package, "building a new client binary");
    let sh = Shell::new().context("Failed to create shell")?;
    sh.change_dir(repo_root);
    cmd!(sh, "go build -o {output} {package}")
        .run()
        .context("failed to build the client binary")?;
    Ok(())
}

fn probe_client() -> Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(true)
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to create HTTP client")
}

/// Polls `server` until it answers any HTTP response.
fn wait_for_server(http: &Client, server: &str, interval: Duration, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    loop {
        match http.get(server).send() {
            Ok(response) => {
                info!(server, status = %response.status(), "server is up");
                return Ok(());
            },
            Err(e) => {
                if started.elapsed() >= timeout {
                    bail!(
                        "could not connect to {server} after {} seconds: {e}",
                        timeout.as_secs()
                    );
                }
                info!(server, "waiting for server to be available");
                std::thread::sleep(interval);
            },
        }
    }
}

/// Downloads the server's CA certificate into a temporary file.
fn fetch_ca(http: &Client, server: &str) -> Result<NamedTempFile> {
    let url = format!("{server}/ca");
    let response = http
        .get(&url)
        .send()
        .with_context(|| format!("failed to fetch CA certificate from {url}"))?;
    if response.status() != StatusCode::OK {
        bail!("fetching CA certificate from {url} returned {}", response.status());
    }
    let body = response
        .bytes()
        .with_context(|| format!("failed to read CA certificate from {url}"))?;

    let mut file = tempfile::Builder::new()
        .suffix(".crt")
        .tempfile()
        .context("failed to create CA certificate file")?;
    file.write_all(&body)
        .context("failed to write CA certificate file")?;
    info!(path = %file.path().display(), "fetched CA certificate");
    Ok(file)
}

/// Writes `OK` to `path`, world-readable. Failures are logged, not fatal.
fn write_success_marker(path: &Path) {
    if let Err(e) = std::fs::write(path, "OK") {
        warn!(path = %path.display(), error = %e, "could not write success marker");
        return;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777)) {
            warn!(path = %path.display(), error = %e, "could not set success marker permissions");
        }
    }
    info!(path = %path.display(), "wrote success marker");
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_success_marker_contents_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("SUCCESS");
        write_success_marker(&marker);
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "OK");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&marker).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o777);
        }
    }

    #[test]
    fn test_success_marker_write_failure_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_success_marker(&dir.path().join("missing").join("SUCCESS"));
    }

    #[test]
    fn test_wait_for_unreachable_server_times_out() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let error = wait_for_server(
            &probe_client().unwrap(),
            &format!("http://127.0.0.1:{port}"),
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .unwrap_err();
        assert!(error.to_string().contains("could not connect"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_any_response_counts_as_alive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let uri = server.uri();
        tokio::task::spawn_blocking(move || {
            wait_for_server(
                &probe_client().unwrap(),
                &uri,
                Duration::from_millis(10),
                Duration::from_secs(5),
            )
        })
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_ca_writes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ca"))
            .respond_with(ResponseTemplate::new(200).set_body_string("-----BEGIN CERTIFICATE-----\n"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let file = tokio::task::spawn_blocking(move || fetch_ca(&probe_client().unwrap(), &uri))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(file.path()).unwrap(),
            "-----BEGIN CERTIFICATE-----\n"
        );
        assert!(file.path().to_string_lossy().ends_with(".crt"));
    }

    #[test]
    fn test_fetched_ca_is_kept_after_failed_run() {
        let file = tempfile::Builder::new().suffix(".crt").tempfile().unwrap();
        let path = file.path().to_path_buf();

        let kept = release_ca(file, false).unwrap();
        assert_eq!(kept, path);
        assert!(kept.exists());
        std::fs::remove_file(kept).unwrap();
    }

    #[test]
    fn test_fetched_ca_is_removed_after_passing_run() {
        let file = tempfile::Builder::new().suffix(".crt").tempfile().unwrap();
        let path = file.path().to_path_buf();

        assert!(release_ca(file, true).is_none());
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_ca_rejects_non_ok_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ca"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let uri = server.uri();
        let error = tokio::task::spawn_blocking(move || fetch_ca(&probe_client().unwrap(), &uri))
            .await
            .unwrap()
            .unwrap_err();
        assert!(error.to_string().contains("204"));
    }
}

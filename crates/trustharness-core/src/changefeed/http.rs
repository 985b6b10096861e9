//! HTTP change-feed client.
//!
//! Each page query is preceded by a token exchange:
//!
//! ```text
//! GET <server>/auth/token?realm=<svc>&service=<svc>&scope=repository:<gun>:pull
//!     (basic auth)                                        -> {"token": "..."}
//! GET <server>/v2/<gun>/_trust/changefeed?change_id=<start>&records=<n>
//!     Authorization: Bearer <token>                       -> {"count": n, "records": [...]}
//! ```
//!
//! Without an identity the catalog-wide scope and feed are used instead.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::ChangeFeed;
use super::cursor::PageCursor;
use super::error::ChangeFeedError;
use super::record::ChangePage;
use crate::client::Credentials;

/// Change-feed client for a remote trust service.
pub struct HttpChangeFeed {
    server: String,
    token_service: String,
    credentials: Option<Credentials>,
    http_client: reqwest::blocking::Client,
}

impl HttpChangeFeed {
    /// Creates a client.
    ///
    /// Certificate verification is disabled: test deployments serve
    /// self-signed certificates.
    ///
    /// # Errors
    ///
    /// Returns an error when the server URL is empty or the HTTP client
    /// cannot be initialized.
    pub fn new(
        server: impl Into<String>,
        token_service: impl Into<String>,
        credentials: Option<Credentials>,
    ) -> Result<Self, ChangeFeedError> {
        let server = server.into().trim_end_matches('/').to_string();
        if server.trim().is_empty() {
            return Err(ChangeFeedError::InvalidInput {
                field: "server".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let http_client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|error| ChangeFeedError::Transport {
                url: server.clone(),
                message: error.to_string(),
            })?;

        Ok(Self {
            server,
            token_service: token_service.into(),
            credentials,
            http_client,
        })
    }

    /// Token endpoint for `identity`, or the catalog-wide scope.
    #[must_use]
    pub fn token_url(&self, identity: Option<&str>) -> String {
        let svc = &self.token_service;
        match identity {
            Some(gun) => format!(
                "{}/auth/token?realm={svc}&service={svc}&scope=repository:{gun}:pull",
                self.server
            ),
            None => format!("{}/auth/token?service={svc}&scope=registry:catalog:*", self.server),
        }
    }

    /// Feed endpoint for `identity` with the cursor's query.
    #[must_use]
    pub fn feed_url(&self, identity: Option<&str>, cursor: &PageCursor) -> String {
        let base = match identity {
            Some(gun) => format!("{}/v2/{gun}/_trust/changefeed", self.server),
            None => format!("{}/v2/_trust/changefeed", self.server),
        };
        format!("{base}?{}", cursor.query_string())
    }

    /// Exchanges the configured credentials for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success,
    /// or the body has no `token` field.
    pub fn authenticate(&self, identity: Option<&str>) -> Result<SecretString, ChangeFeedError> {
        #[derive(Debug, Deserialize)]
        struct TokenBody {
            #[serde(default)]
            token: Option<String>,
        }

        let url = self.token_url(identity);
        let mut request = self.http_client.get(&url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(
                &credentials.username,
                Some(credentials.password.expose_secret()),
            );
        }

        let body: TokenBody = Self::send_json(&url, request)?;
        body.token
            .filter(|token| !token.is_empty())
            .map(SecretString::from)
            .ok_or(ChangeFeedError::MissingField { field: "token" })
    }

    fn send_json<T: for<'de> Deserialize<'de>>(
        url: &str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<T, ChangeFeedError> {
        let response = request.send().map_err(|error| ChangeFeedError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(ChangeFeedError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.json().map_err(|error| ChangeFeedError::Decode {
            message: error.to_string(),
        })
    }
}

impl ChangeFeed for HttpChangeFeed {
    fn fetch_page(
        &self,
        identity: Option<&str>,
        cursor: &PageCursor,
    ) -> Result<ChangePage, ChangeFeedError> {
        let token = self.authenticate(identity)?;
        let url = self.feed_url(identity, cursor);
        debug!(%url, "querying change feed");

        let request = self.http_client.get(&url).bearer_auth(token.expose_secret());
        let page: ChangePage = Self::send_json(&url, request)?;
        debug!(count = page.count, "change feed page received");
        Ok(page)
    }
}

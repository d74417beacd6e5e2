//! OAuth client-credentials token exchange.
//!
//! `POST <token_url>` with a basic-auth header built from the client id and
//! secret and the form body `grant_type=client_credentials`. The returned
//! bearer is short-lived; nothing here tracks expiry, callers re-run
//! [`TokenProvider::fetch_token`] when they need a fresh one.

use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::{AuthConfig, Credentials};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint rejected the credentials ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("token response did not contain an access_token")]
    MissingToken,
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Short-lived bearer string.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

pub struct TokenProvider {
    client: reqwest::Client,
    token_url: String,
    credentials: Credentials,
}

impl TokenProvider {
    pub fn new(config: &AuthConfig, credentials: Credentials) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            token_url: config.token_url.clone(),
            credentials,
        })
    }

    fn basic_header(&self) -> String {
        let raw = format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        );
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw.as_bytes())
        )
    }

    /// Exchanges the client credentials for a bearer token.
    pub async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "*/*")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Authorization", self.basic_header())
            .body("grant_type=client_credentials")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = response.json().await?;
        match parsed.access_token {
            Some(token) if !token.is_empty() => {
                tracing::debug!("obtained access token");
                Ok(AccessToken(token))
            }
            _ => Err(AuthError::MissingToken),
        }
    }
}

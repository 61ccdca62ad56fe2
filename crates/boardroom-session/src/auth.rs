//! Credential collaborator: the controller never mints tokens itself, it asks
//! this seam for a fresh short-lived one before every connection attempt
//! (tokens may have expired between reconnects).

use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use serde::Deserialize;

/// Source of short-lived connection credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Return a token valid for one connection handshake.
    async fn fresh_token(&self) -> SessionResult<String>;
}

/// Fixed token, for development and tests.
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn fresh_token(&self) -> SessionResult<String> {
        Ok(self.token.clone())
    }
}

/// Exchanges a long-lived refresh token for a short-lived session token over
/// HTTPS.
pub struct HttpCredentialSource {
    client: reqwest::Client,
    token_url: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

impl HttpCredentialSource {
    pub fn new(token_url: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fresh_token(&self) -> SessionResult<String> {
        let response = self
            .client
            .post(&self.token_url)
            .json(&serde_json::json!({ "refresh_token": self.refresh_token }))
            .send()
            .await
            .map_err(|e| SessionError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SessionError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Auth(e.to_string()))?;
        Ok(body.token)
    }
}

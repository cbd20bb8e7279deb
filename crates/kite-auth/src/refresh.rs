use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::types::OAuthCredential;

const DEFAULT_EXPIRES_IN_SECS: u64 = 3_600;
const MAX_ERROR_BODY_CHARS: usize = 240;

/// Tokens returned by the token endpoint for a refresh grant.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Rotated refresh token; `None` keeps the previous one.
    pub refresh_token: Option<String>,
    pub expires_in_secs: u64,
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("rotated_refresh_token", &self.refresh_token.is_some())
            .field("expires_in_secs", &self.expires_in_secs)
            .finish_non_exhaustive()
    }
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credential: &OAuthCredential) -> Result<RefreshedToken, AuthError>;
}

/// `TokenRefresher` that POSTs a `refresh_token` grant to an OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    endpoint: String,
    default_client_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
}

impl HttpTokenRefresher {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.refresh_timeout_ms.max(1)))
            .build()
            .map_err(|error| AuthError::RefreshTransport {
                status: None,
                message: format!("failed to build http client: {error}"),
            })?;
        Ok(Self {
            client,
            endpoint: config.token_endpoint.clone(),
            default_client_id: config.client_id.clone(),
        })
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, credential: &OAuthCredential) -> Result<RefreshedToken, AuthError> {
        let client_id = credential
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.default_client_id);
        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "client_id": client_id,
            "refresh_token": credential.refresh_token,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| AuthError::RefreshTransport {
                status: None,
                message: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshTransport {
                status: Some(status.as_u16()),
                message: truncate_for_log(body.trim()),
            });
        }

        let payload = response
            .json::<TokenEndpointResponse>()
            .await
            .map_err(|error| AuthError::RefreshResponseInvalid(error.to_string()))?;
        let access_token = non_empty(payload.access_token).ok_or_else(|| {
            AuthError::RefreshResponseInvalid("response has no access_token".to_string())
        })?;

        Ok(RefreshedToken {
            access_token,
            refresh_token: non_empty(payload.refresh_token),
            expires_in_secs: payload.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_for_log(text: &str) -> String {
    if text.is_empty() {
        return "empty response body".to_string();
    }
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>() + "..."
}

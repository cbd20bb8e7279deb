use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const CREDENTIAL_STORE_SCHEMA_VERSION: u32 = 1;

/// Renewable OAuth credential as persisted in the store.
///
/// `expires_at_ms` is the margin-adjusted expiry computed when the token was
/// issued or refreshed, not the raw server-side expiry.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthCredential {
    #[serde(rename = "access", alias = "access_token")]
    pub access_token: String,
    #[serde(rename = "refresh", alias = "refresh_token")]
    pub refresh_token: String,
    #[serde(rename = "expires", alias = "expires_at_ms")]
    pub expires_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl fmt::Debug for OAuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at_ms", &self.expires_at_ms)
            .field("client_id", &self.client_id)
            .field("provider", &self.provider)
            .field("email", &self.email)
            .finish()
    }
}

/// One credential per profile, tagged by `type` on disk.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Credential {
    #[serde(rename = "api_key")]
    ApiKey {
        key: String,
        provider: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    #[serde(rename = "token")]
    BearerToken {
        token: String,
        #[serde(
            rename = "expires",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        expires_at_ms: Option<u64>,
        provider: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    #[serde(rename = "oauth")]
    OAuth(OAuthCredential),
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::ApiKey { .. } => CredentialKind::ApiKey,
            Credential::BearerToken { .. } => CredentialKind::Token,
            Credential::OAuth(_) => CredentialKind::OAuth,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Credential::ApiKey { provider, .. } | Credential::BearerToken { provider, .. } => {
                provider
            }
            Credential::OAuth(credential) => &credential.provider,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Credential::ApiKey { email, .. } | Credential::BearerToken { email, .. } => {
                email.as_deref()
            }
            Credential::OAuth(credential) => credential.email.as_deref(),
        }
    }

    pub fn expires_at_ms(&self) -> Option<u64> {
        match self {
            Credential::ApiKey { .. } => None,
            Credential::BearerToken { expires_at_ms, .. } => *expires_at_ms,
            Credential::OAuth(credential) => Some(credential.expires_at_ms),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::OAuth(credential) => f.debug_tuple("OAuth").field(credential).finish(),
            other => f
                .debug_struct(other.kind().as_str())
                .field("secret", &"[REDACTED]")
                .field("provider", &other.provider())
                .field("email", &other.email())
                .field("expires_at_ms", &other.expires_at_ms())
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    ApiKey,
    Token,
    #[serde(rename = "oauth")]
    OAuth,
}

impl CredentialKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKind::ApiKey => "api_key",
            CredentialKind::Token => "token",
            CredentialKind::OAuth => "oauth",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named credential plus usage bookkeeping. The profile id is the map key
/// in [`CredentialStore::profiles`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthProfile {
    #[serde(alias = "credentials")]
    pub credential: Credential,
    #[serde(rename = "last_used", default)]
    pub last_used_ms: Option<u64>,
    #[serde(rename = "cooldown_until", default)]
    pub cooldown_until_ms: u64,
    #[serde(default)]
    pub error_count: u32,
}

impl AuthProfile {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            last_used_ms: None,
            cooldown_until_ms: 0,
            error_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialStore {
    pub version: u32,
    #[serde(default)]
    pub profiles: BTreeMap<String, AuthProfile>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self {
            version: CREDENTIAL_STORE_SCHEMA_VERSION,
            profiles: BTreeMap::new(),
        }
    }
}

/// Token material handed back by the manager after a validity check or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub access_token: String,
    pub credential: OAuthCredential,
    pub valid_until_ms: u64,
}

/// Freshly issued OAuth tokens to register under a profile.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_secs: u64,
    pub provider: String,
    pub email: Option<String>,
    pub client_id: Option<String>,
}

impl OAuthGrant {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in_secs,
            provider: "anthropic".to_string(),
            email: None,
            client_id: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }
}

impl fmt::Debug for OAuthGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthGrant")
            .field("expires_in_secs", &self.expires_in_secs)
            .field("provider", &self.provider)
            .field("email", &self.email)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Read-only status row reported by `OAuthManager::list_profiles`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProfileStatus {
    pub profile_id: String,
    pub kind: CredentialKind,
    pub provider: String,
    pub email: Option<String>,
    pub valid: bool,
    /// Margin-adjusted expiry, the same value the validity check is based on.
    pub expires_at_ms: Option<u64>,
    pub last_used_ms: Option<u64>,
    pub cooldown_until_ms: u64,
    pub error_count: u32,
}

//! Lazy OAuth token refresh over the shared credential store.
//!
//! Every read-modify-write of the store happens while holding the store lock,
//! so across all processes sharing the lock file at most one refresh runs at a
//! time and a token that was just refreshed by another holder is reused
//! instead of refreshed again.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kite_core::{current_unix_timestamp_ms, is_fresh_with_margin_ms};

use crate::config::AuthConfig;
use crate::credential_store::FileCredentialStore;
use crate::error::AuthError;
use crate::refresh::{HttpTokenRefresher, TokenRefresher};
use crate::store_lock::StoreLock;
use crate::types::{
    AuthProfile, Credential, CredentialStore, OAuthCredential, OAuthGrant, ProfileStatus,
    RefreshOutcome,
};

/// Tokens are treated as expired this long before their recorded expiry.
pub const SAFETY_MARGIN_MS: u64 = 5 * 60 * 1000;

type ClockFn = Arc<dyn Fn() -> u64 + Send + Sync>;

/// A token together with the profile that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub profile_id: String,
    pub access_token: String,
}

impl std::fmt::Debug for ResolvedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedToken")
            .field("profile_id", &self.profile_id)
            .finish_non_exhaustive()
    }
}

pub struct OAuthManager {
    config: AuthConfig,
    store: FileCredentialStore,
    lock: StoreLock,
    refresher: Arc<dyn TokenRefresher>,
    clock: ClockFn,
}

impl OAuthManager {
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        let refresher = HttpTokenRefresher::new(&config)?;
        Ok(Self::with_refresher(config, Arc::new(refresher)))
    }

    pub fn with_refresher(config: AuthConfig, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self::with_clock(config, refresher, Arc::new(current_unix_timestamp_ms))
    }

    pub fn with_clock(
        config: AuthConfig,
        refresher: Arc<dyn TokenRefresher>,
        clock: ClockFn,
    ) -> Self {
        Self {
            store: FileCredentialStore::new(config.store_path()),
            lock: StoreLock::new(
                config.lock_path(),
                Duration::from_millis(config.lock_timeout_ms),
            ),
            config,
            refresher,
            clock,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store(&self) -> &FileCredentialStore {
        &self.store
    }

    /// Returns a usable access token for `profile_id`, or `None` when neither
    /// the profile nor (with `allow_fallback`) the main profile can produce one.
    ///
    /// Failures are logged, never raised. The fallback is a single hop to the
    /// main profile; the main profile itself never falls back.
    pub async fn get_token(&self, profile_id: &str, allow_fallback: bool) -> Option<String> {
        self.resolve_token(profile_id, allow_fallback)
            .await
            .map(|resolved| resolved.access_token)
    }

    /// Same as [`OAuthManager::get_token`], also reporting which profile
    /// supplied the token.
    pub async fn resolve_token(
        &self,
        profile_id: &str,
        allow_fallback: bool,
    ) -> Option<ResolvedToken> {
        match self.try_get_token(profile_id).await {
            Ok(outcome) => {
                return Some(ResolvedToken {
                    profile_id: profile_id.to_string(),
                    access_token: outcome.access_token,
                })
            }
            Err(error) => {
                tracing::warn!(
                    profile_id,
                    error = %error,
                    "auth profile could not provide a token"
                );
            }
        }

        let main_profile_id = self.config.main_profile_id.as_str();
        if !allow_fallback || profile_id == main_profile_id {
            return None;
        }

        tracing::info!(
            profile_id,
            fallback_profile_id = main_profile_id,
            "falling back to main auth profile"
        );
        match self.try_get_token(main_profile_id).await {
            Ok(outcome) => Some(ResolvedToken {
                profile_id: main_profile_id.to_string(),
                access_token: outcome.access_token,
            }),
            Err(error) => {
                tracing::warn!(
                    profile_id = main_profile_id,
                    error = %error,
                    "main auth profile could not provide a token"
                );
                None
            }
        }
    }

    /// Returns the stored token while it is outside the safety margin,
    /// otherwise refreshes it. No fallback.
    pub async fn try_get_token(&self, profile_id: &str) -> Result<RefreshOutcome, AuthError> {
        let _guard = self.lock.acquire().await?;
        let mut store = self.store.load();
        let credential = oauth_credential(&store, profile_id)?;

        let now_ms = (self.clock)();
        if is_fresh_with_margin_ms(credential.expires_at_ms, SAFETY_MARGIN_MS, now_ms) {
            tracing::debug!(
                profile_id,
                expires_at_ms = credential.expires_at_ms,
                "stored oauth token is still valid"
            );
            return Ok(RefreshOutcome {
                access_token: credential.access_token.clone(),
                valid_until_ms: credential.expires_at_ms,
                credential,
            });
        }

        self.refresh_locked(&mut store, profile_id, credential, now_ms)
            .await
    }

    /// Replaces `rejected_access_token` after the backend refused it, even if
    /// the store still considers it valid.
    ///
    /// When another caller already swapped in a different token that is still
    /// fresh, that token is returned without a second refresh call.
    pub async fn refresh_profile(
        &self,
        profile_id: &str,
        rejected_access_token: &str,
    ) -> Result<RefreshOutcome, AuthError> {
        let _guard = self.lock.acquire().await?;
        let mut store = self.store.load();
        let credential = oauth_credential(&store, profile_id)?;
        let now_ms = (self.clock)();
        if credential.access_token != rejected_access_token
            && is_fresh_with_margin_ms(credential.expires_at_ms, SAFETY_MARGIN_MS, now_ms)
        {
            tracing::debug!(
                profile_id,
                "rejected oauth token was already replaced; reusing stored token"
            );
            return Ok(RefreshOutcome {
                access_token: credential.access_token.clone(),
                valid_until_ms: credential.expires_at_ms,
                credential,
            });
        }
        self.refresh_locked(&mut store, profile_id, credential, now_ms)
            .await
    }

    // Caller holds the store lock. On any error `store` is discarded and the
    // file on disk keeps its previous contents.
    async fn refresh_locked(
        &self,
        store: &mut CredentialStore,
        profile_id: &str,
        credential: OAuthCredential,
        now_ms: u64,
    ) -> Result<RefreshOutcome, AuthError> {
        if credential.refresh_token.trim().is_empty() {
            return Err(AuthError::MissingRefreshToken(profile_id.to_string()));
        }

        tracing::info!(profile_id, "refreshing oauth token");
        let refreshed = self.refresher.refresh(&credential).await?;

        let issued_at_ms = (self.clock)();
        let renewed = OAuthCredential {
            access_token: refreshed.access_token,
            refresh_token: refreshed
                .refresh_token
                .unwrap_or(credential.refresh_token),
            expires_at_ms: margin_adjusted_expiry(issued_at_ms, refreshed.expires_in_secs),
            client_id: credential.client_id,
            provider: credential.provider,
            email: credential.email,
        };

        let profile = store
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| AuthError::ProfileNotFound(profile_id.to_string()))?;
        profile.credential = Credential::OAuth(renewed.clone());
        profile.last_used_ms = Some(now_ms);
        profile.error_count = 0;
        self.store.save(store)?;

        tracing::info!(
            profile_id,
            expires_at_ms = renewed.expires_at_ms,
            "refreshed oauth token"
        );
        Ok(RefreshOutcome {
            access_token: renewed.access_token.clone(),
            valid_until_ms: renewed.expires_at_ms,
            credential: renewed,
        })
    }

    /// Upserts an OAuth profile from freshly issued tokens.
    pub async fn add_credentials(
        &self,
        profile_id: &str,
        grant: OAuthGrant,
    ) -> Result<(), AuthError> {
        let now_ms = (self.clock)();
        let client_id = grant
            .client_id
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.config.client_id.clone());
        let credential = OAuthCredential {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at_ms: margin_adjusted_expiry(now_ms, grant.expires_in_secs),
            client_id: Some(client_id),
            provider: grant.provider,
            email: grant.email,
        };

        let _guard = self.lock.acquire().await?;
        let mut store = self.store.load();
        store.profiles.insert(
            profile_id.to_string(),
            AuthProfile {
                credential: Credential::OAuth(credential),
                last_used_ms: Some(now_ms),
                cooldown_until_ms: 0,
                error_count: 0,
            },
        );
        self.store.save(&store)?;
        tracing::info!(profile_id, "added oauth credentials");
        Ok(())
    }

    /// Deletes `profile_id`; returns whether it existed.
    pub async fn remove_profile(&self, profile_id: &str) -> Result<bool, AuthError> {
        let _guard = self.lock.acquire().await?;
        let mut store = self.store.load();
        if store.profiles.remove(profile_id).is_none() {
            tracing::debug!(profile_id, "auth profile to remove was not found");
            return Ok(false);
        }
        self.store.save(&store)?;
        tracing::info!(profile_id, "removed auth profile");
        Ok(true)
    }

    /// Bumps the profile's error counter after the backend rejected its
    /// credential. Returns the new count.
    pub async fn record_profile_failure(&self, profile_id: &str) -> Result<u32, AuthError> {
        let _guard = self.lock.acquire().await?;
        let mut store = self.store.load();
        let profile = store
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| AuthError::ProfileNotFound(profile_id.to_string()))?;
        profile.error_count = profile.error_count.saturating_add(1);
        let error_count = profile.error_count;
        self.store.save(&store)?;
        tracing::warn!(profile_id, error_count, "recorded auth profile failure");
        Ok(error_count)
    }

    /// Lock-free status snapshot of every profile.
    pub fn list_profiles(&self) -> BTreeMap<String, ProfileStatus> {
        let store = self.store.load();
        let now_ms = (self.clock)();
        store
            .profiles
            .iter()
            .map(|(profile_id, profile)| {
                (
                    profile_id.clone(),
                    profile_status(profile_id, profile, now_ms),
                )
            })
            .collect()
    }
}

fn oauth_credential(
    store: &CredentialStore,
    profile_id: &str,
) -> Result<OAuthCredential, AuthError> {
    let profile = store
        .profiles
        .get(profile_id)
        .ok_or_else(|| AuthError::ProfileNotFound(profile_id.to_string()))?;
    match &profile.credential {
        Credential::OAuth(credential) => Ok(credential.clone()),
        other => Err(AuthError::WrongCredentialKind {
            profile_id: profile_id.to_string(),
            kind: other.kind(),
        }),
    }
}

fn margin_adjusted_expiry(issued_at_ms: u64, expires_in_secs: u64) -> u64 {
    issued_at_ms
        .saturating_add(expires_in_secs.saturating_mul(1_000))
        .saturating_sub(SAFETY_MARGIN_MS)
}

fn profile_status(profile_id: &str, profile: &AuthProfile, now_ms: u64) -> ProfileStatus {
    let credential = &profile.credential;
    let expires_at_ms = credential.expires_at_ms();
    let valid = match credential {
        Credential::ApiKey { key, .. } => !key.trim().is_empty(),
        Credential::BearerToken { .. } | Credential::OAuth(_) => expires_at_ms
            .map(|expires| is_fresh_with_margin_ms(expires, SAFETY_MARGIN_MS, now_ms))
            .unwrap_or(true),
    };
    ProfileStatus {
        profile_id: profile_id.to_string(),
        kind: credential.kind(),
        provider: credential.provider().to_string(),
        email: credential.email().map(str::to_string),
        valid,
        expires_at_ms,
        last_used_ms: profile.last_used_ms,
        cooldown_until_ms: profile.cooldown_until_ms,
        error_count: profile.error_count,
    }
}

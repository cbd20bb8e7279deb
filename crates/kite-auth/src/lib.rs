//! OAuth credential persistence and refresh coordination for Kite.
//!
//! The credential store is a JSON file of named auth profiles written with
//! temp-file + rename under owner-only permissions. Every read-modify-write
//! runs under a cross-process advisory lock, and `OAuthManager` refreshes
//! expired OAuth tokens lazily, at most once per expiry, falling back to the
//! configured main profile when a secondary profile cannot produce a token.

mod config;
mod credential_store;
mod error;
mod oauth_manager;
mod refresh;
mod store_lock;
mod types;

pub use config::{AuthConfig, DEFAULT_CLIENT_ID, DEFAULT_TOKEN_ENDPOINT};
pub use credential_store::{encode_credential_store, parse_credential_store, FileCredentialStore};
pub use error::AuthError;
pub use oauth_manager::{OAuthManager, ResolvedToken, SAFETY_MARGIN_MS};
pub use refresh::{HttpTokenRefresher, RefreshedToken, TokenRefresher};
pub use store_lock::{StoreLock, StoreLockGuard};
pub use types::{
    AuthProfile, Credential, CredentialKind, CredentialStore, OAuthCredential, OAuthGrant,
    ProfileStatus, RefreshOutcome, CREDENTIAL_STORE_SCHEMA_VERSION,
};

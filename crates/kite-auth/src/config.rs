use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://console.anthropic.com/v1/oauth/token";
pub const DEFAULT_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
const DEFAULT_MAIN_PROFILE_ID: &str = "anthropic:main";
const STORE_FILE_NAME: &str = "oauth.json";
const LOCK_FILE_NAME: &str = "oauth.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub auth_dir: PathBuf,
    pub token_endpoint: String,
    pub client_id: String,
    pub lock_timeout_ms: u64,
    pub refresh_timeout_ms: u64,
    /// Profile every other profile falls back to when it cannot produce a token.
    pub main_profile_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_dir: default_auth_dir(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            lock_timeout_ms: 30_000,
            refresh_timeout_ms: 30_000,
            main_profile_id: DEFAULT_MAIN_PROFILE_ID.to_string(),
        }
    }
}

impl AuthConfig {
    pub fn with_auth_dir(auth_dir: impl Into<PathBuf>) -> Self {
        Self {
            auth_dir: auth_dir.into(),
            ..Self::default()
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.auth_dir.join(STORE_FILE_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.auth_dir.join(LOCK_FILE_NAME)
    }
}

fn default_auth_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(".").to_path_buf());
    home.join(".kite").join("auth")
}

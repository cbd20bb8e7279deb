use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kite_auth::AuthConfig;
use serde::{Deserialize, Serialize};

pub const KITE_AUTH_DIR_ENV: &str = "KITE_AUTH_DIR";
pub const KITE_CLAUDE_CLI_ENV: &str = "KITE_CLAUDE_CLI";

/// How the adapter reports a failed CLI run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Return the failure as an error.
    #[default]
    Fail,
    /// Return the failure as assistant text with `finish_reason = "error"`.
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeCliConfig {
    pub executable: String,
    pub default_model: String,
    pub timeout_ms: u64,
    pub working_dir: Option<PathBuf>,
    pub extra_args: Vec<String>,
    /// Profile whose OAuth token is injected into the CLI environment.
    pub auth_profile: Option<String>,
    /// Resume the cached backend session for a session key instead of
    /// re-sending the whole conversation.
    pub resume_sessions: bool,
    pub error_policy: ErrorPolicy,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            executable: "claude".to_string(),
            default_model: "opus".to_string(),
            timeout_ms: 300_000,
            working_dir: None,
            extra_args: vec!["--dangerously-skip-permissions".to_string()],
            auth_profile: None,
            resume_sessions: false,
            error_policy: ErrorPolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KiteConfig {
    pub auth: AuthConfig,
    pub claude_cli: ClaudeCliConfig,
}

/// Loads a TOML config file. A missing file yields defaults; environment
/// overrides are applied either way.
pub fn load_kite_config(path: &Path) -> Result<KiteConfig> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(raw) => parse_kite_config(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(config = %path.display(), "config file not found; using defaults");
            KiteConfig::default()
        }
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

pub fn parse_kite_config(raw: &str) -> Result<KiteConfig> {
    toml::from_str::<KiteConfig>(raw).context("invalid kite config")
}

fn apply_env_overrides(config: &mut KiteConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = lookup(KITE_AUTH_DIR_ENV).filter(|value| !value.trim().is_empty()) {
        config.auth.auth_dir = PathBuf::from(dir);
    }
    if let Some(executable) = lookup(KITE_CLAUDE_CLI_ENV).filter(|value| !value.trim().is_empty())
    {
        config.claude_cli.executable = executable;
    }
}

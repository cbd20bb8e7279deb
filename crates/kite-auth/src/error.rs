use std::path::PathBuf;

use thiserror::Error;

use crate::types::CredentialKind;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth profile '{0}' was not found")]
    ProfileNotFound(String),
    #[error("auth profile '{profile_id}' holds a {kind} credential, expected oauth")]
    WrongCredentialKind {
        profile_id: String,
        kind: CredentialKind,
    },
    #[error("auth profile '{0}' has no refresh token")]
    MissingRefreshToken(String),
    #[error("token refresh failed{}: {message}", .status.map(|code| format!(" with status {code}")).unwrap_or_default())]
    RefreshTransport {
        status: Option<u16>,
        message: String,
    },
    #[error("token refresh response is invalid: {0}")]
    RefreshResponseInvalid(String),
    #[error("failed to persist credential store: {0:#}")]
    Persistence(anyhow::Error),
    #[error("timed out after {waited_ms}ms acquiring credential lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },
    #[error("failed to acquire credential lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuthError {
    /// True for failures of the refresh call itself, as opposed to store or
    /// profile problems.
    pub fn is_refresh_failure(&self) -> bool {
        matches!(
            self,
            AuthError::RefreshTransport { .. }
                | AuthError::RefreshResponseInvalid(_)
                | AuthError::MissingRefreshToken(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_refresh_transport_message_includes_status_when_known() {
        let with_status = AuthError::RefreshTransport {
            status: Some(401),
            message: "invalid_grant".to_string(),
        };
        assert_eq!(
            with_status.to_string(),
            "token refresh failed with status 401: invalid_grant"
        );

        let without_status = AuthError::RefreshTransport {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(
            without_status.to_string(),
            "token refresh failed: connection refused"
        );
    }
}

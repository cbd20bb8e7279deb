use thiserror::Error;

/// Failures of a single streaming subprocess run.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process timed out after {elapsed_ms}ms (limit {limit_ms}ms, prompt {input_bytes} bytes)")]
    Timeout {
        elapsed_ms: u64,
        limit_ms: u64,
        input_bytes: usize,
    },
    #[error("process exited with status {}: {message}", .code.map(|code| code.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ExitNonZero { code: Option<i32>, message: String },
    #[error("process io failed while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("process {0} pipe was not captured")]
    MissingPipe(&'static str),
}

impl ProcessError {
    /// True when the process failed because the backend rejected the
    /// injected credential.
    pub fn looks_like_auth_failure(&self) -> bool {
        match self {
            ProcessError::ExitNonZero { message, .. } => is_auth_failure_message(message),
            _ => false,
        }
    }
}

/// Heuristic match on backend error text for rejected or expired credentials.
pub fn is_auth_failure_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    [
        "api error: 401",
        "status 401",
        "status: 401",
        "status=401",
        "status code 401",
        "http 401",
        "unauthorized",
        "authentication_error",
        "authentication failed",
        "invalid api key",
        "oauth token",
        "token has expired",
        "please run /login",
    ]
    .iter()
    .any(|needle| lowered.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_exit_message_carries_code_and_summary() {
        let error = ProcessError::ExitNonZero {
            code: Some(7),
            message: "boom".to_string(),
        };
        assert_eq!(error.to_string(), "process exited with status 7: boom");

        let killed = ProcessError::ExitNonZero {
            code: None,
            message: "no error output".to_string(),
        };
        assert!(killed.to_string().contains("status signal"));
    }

    #[test]
    fn unit_auth_failure_heuristic_matches_exit_messages_only() {
        let rejected = ProcessError::ExitNonZero {
            code: Some(1),
            message: "API Error: 401 {\"error\":\"OAuth token has expired\"}".to_string(),
        };
        assert!(rejected.looks_like_auth_failure());

        let unrelated = ProcessError::ExitNonZero {
            code: Some(1),
            message: "rate limited".to_string(),
        };
        assert!(!unrelated.looks_like_auth_failure());

        let status_only = ProcessError::ExitNonZero {
            code: Some(1),
            message: "request failed with status 401".to_string(),
        };
        assert!(status_only.looks_like_auth_failure());

        let timeout = ProcessError::Timeout {
            elapsed_ms: 1,
            limit_ms: 1,
            input_bytes: 0,
        };
        assert!(!timeout.looks_like_auth_failure());
    }

    #[test]
    fn regression_stray_401_digits_are_not_auth_failures() {
        assert!(!is_auth_failure_message("syntax error at line 401 of config.json"));
        assert!(!is_auth_failure_message("request id req_4012 failed: overloaded"));
        assert!(!is_auth_failure_message("wrote 1401 bytes before the tool crashed"));
        assert!(is_auth_failure_message("API Error: 401 {\"type\":\"error\"}"));
        assert!(is_auth_failure_message("HTTP 401 from upstream"));
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use kite_ai::{
    ChatRequest, ChatResponse, ChatUsage, KiteAiError, LlmClient, Message,
    MessageRole, StreamDeltaHandler,
};
use kite_auth::{OAuthManager, ResolvedToken};

use crate::cli_executable::is_executable_available;
use crate::config::{ClaudeCliConfig, ErrorPolicy};
use crate::error::{is_auth_failure_message, ProcessError};
use crate::stream_process::{ProcessRequest, StreamProcessClient};
use crate::stream_reducer::StreamOutcome;

/// Environment variable the Claude CLI reads its OAuth token from.
pub const CLAUDE_OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";
/// Ambient API keys that would override OAuth auth inside the CLI.
pub const SCRUBBED_API_KEY_ENVS: [&str; 2] = ["ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY_OLD"];

const CONTINUE_PROMPT: &str = "Human: Please continue.";

/// Maps the model names callers use onto the CLI's short aliases. Unknown
/// names are passed through lower-cased.
pub fn normalize_claude_model(model: &str) -> String {
    let lowered = model.trim().to_ascii_lowercase();
    let alias = match lowered.as_str() {
        "opus" | "opus-4.5" | "opus-4" | "claude-opus-4-5" | "claude-opus-4" => "opus",
        "sonnet" | "sonnet-4.5" | "sonnet-4.1" | "sonnet-4.0" | "claude-sonnet-4-5"
        | "claude-sonnet-4-1" | "claude-sonnet-4-0" => "sonnet",
        "haiku" | "haiku-3.5" | "claude-haiku-3-5" => "haiku",
        _ => return lowered,
    };
    alias.to_string()
}

/// `LlmClient` backed by the Claude CLI in streaming print mode.
///
/// With an [`OAuthManager`] attached, every run injects a fresh token from the
/// configured profile and retries once after a forced refresh when the CLI
/// reports an authorization failure.
pub struct ClaudeCliProvider {
    config: ClaudeCliConfig,
    process: StreamProcessClient,
    auth: Option<Arc<OAuthManager>>,
    sessions: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for ClaudeCliProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeCliProvider")
            .field("config", &self.config)
            .field("oauth", &self.auth.is_some())
            .finish_non_exhaustive()
    }
}

impl ClaudeCliProvider {
    pub fn new(config: ClaudeCliConfig) -> Result<Self, KiteAiError> {
        if config.executable.trim().is_empty() {
            return Err(KiteAiError::InvalidResponse(
                "claude cli executable is empty".to_string(),
            ));
        }
        if config.timeout_ms == 0 {
            return Err(KiteAiError::InvalidResponse(
                "claude cli timeout must be greater than 0ms".to_string(),
            ));
        }
        Ok(Self {
            process: StreamProcessClient::new(config.executable.trim()),
            config,
            auth: None,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_oauth_manager(mut self, manager: Arc<OAuthManager>) -> Self {
        self.auth = Some(manager);
        self
    }

    pub fn config(&self) -> &ClaudeCliConfig {
        &self.config
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    pub fn is_available(&self) -> bool {
        is_executable_available(&self.config.executable)
    }

    pub fn session_id(&self, session_key: &str) -> Option<String> {
        lock_or_recover_mutex(&self.sessions).get(session_key).cloned()
    }

    pub fn clear_session(&self, session_key: &str) {
        lock_or_recover_mutex(&self.sessions).remove(session_key);
    }

    /// Runs one request. `session_key` groups requests of one conversation:
    /// the backend session id is remembered for it and, with
    /// `resume_sessions` enabled, resumed on the next call.
    pub async fn chat(
        &self,
        request: &ChatRequest,
        session_key: Option<&str>,
    ) -> Result<ChatResponse, KiteAiError> {
        let resume_session_id = session_key
            .filter(|_| self.config.resume_sessions)
            .and_then(|key| self.session_id(key));
        let mut process_request = self.process_request(request, resume_session_id);

        let resolved = self.resolve_token().await?;
        inject_token(
            &mut process_request,
            resolved.as_ref().map(|token| token.access_token.as_str()),
        );

        let mut attempt = self.process.run(&process_request).await;
        if let Some(resolved) = resolved.as_ref().filter(|_| is_auth_rejection(&attempt)) {
            attempt = self
                .retry_after_forced_refresh(&mut process_request, resolved, attempt)
                .await;
        }

        match attempt {
            Ok(outcome) => {
                if let (Some(key), Some(session_id)) = (session_key, outcome.session_id.as_ref())
                {
                    lock_or_recover_mutex(&self.sessions)
                        .insert(key.to_string(), session_id.clone());
                }
                Ok(chat_response(outcome))
            }
            Err(error) => {
                tracing::warn!(error = %error, "claude cli run failed");
                match self.config.error_policy {
                    ErrorPolicy::Fail => Err(KiteAiError::Process(error.to_string())),
                    ErrorPolicy::Content => Ok(ChatResponse {
                        message: Message::assistant_text(format!(
                            "Error calling Claude CLI: {error}"
                        )),
                        finish_reason: Some("error".to_string()),
                        usage: ChatUsage::default(),
                        session_id: None,
                    }),
                }
            }
        }
    }

    fn process_request(
        &self,
        request: &ChatRequest,
        resume_session_id: Option<String>,
    ) -> ProcessRequest {
        let model = if request.model.trim().is_empty() {
            self.config.default_model.as_str()
        } else {
            request.model.as_str()
        };
        // A resumed session already holds the earlier turns.
        let prompt = match resume_session_id {
            Some(_) => render_claude_prompt(messages_since_last_assistant(&request.messages)),
            None => render_claude_prompt(&request.messages),
        };

        let mut process_request = ProcessRequest::new(
            prompt,
            normalize_claude_model(model),
            Duration::from_millis(self.config.timeout_ms),
        );
        process_request.system_prompt = extract_system_prompt(&request.messages);
        process_request.resume_session_id = resume_session_id;
        process_request.extra_args = self.config.extra_args.clone();
        process_request.working_dir = self.config.working_dir.clone();
        process_request.env_remove = SCRUBBED_API_KEY_ENVS
            .iter()
            .map(|key| key.to_string())
            .collect();
        process_request
    }

    async fn resolve_token(&self) -> Result<Option<ResolvedToken>, KiteAiError> {
        let Some(manager) = &self.auth else {
            return Ok(None);
        };
        let profile_id = self
            .config
            .auth_profile
            .as_deref()
            .unwrap_or(manager.config().main_profile_id.as_str());
        match manager.resolve_token(profile_id, true).await {
            Some(resolved) => Ok(Some(resolved)),
            None => Err(KiteAiError::CredentialUnavailable(format!(
                "auth profile '{profile_id}' and its fallback produced no token"
            ))),
        }
    }

    async fn retry_after_forced_refresh(
        &self,
        process_request: &mut ProcessRequest,
        resolved: &ResolvedToken,
        first_attempt: Result<StreamOutcome, ProcessError>,
    ) -> Result<StreamOutcome, ProcessError> {
        let Some(manager) = &self.auth else {
            return first_attempt;
        };
        let profile_id = resolved.profile_id.as_str();
        tracing::warn!(profile_id, "claude cli rejected credentials; forcing token refresh");

        let refreshed = match manager
            .refresh_profile(profile_id, &resolved.access_token)
            .await
        {
            Ok(refreshed) => refreshed,
            Err(error) => {
                tracing::warn!(profile_id, error = %error, "forced token refresh failed");
                self.record_failure(manager, profile_id).await;
                return first_attempt;
            }
        };

        inject_token(process_request, Some(&refreshed.access_token));
        let retry = self.process.run(process_request).await;
        if is_auth_rejection(&retry) {
            self.record_failure(manager, profile_id).await;
        }
        retry
    }

    async fn record_failure(&self, manager: &OAuthManager, profile_id: &str) {
        if let Err(error) = manager.record_profile_failure(profile_id).await {
            tracing::warn!(profile_id, error = %error, "failed to record auth profile failure");
        }
    }
}

#[async_trait]
impl LlmClient for ClaudeCliProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, KiteAiError> {
        self.chat(&request, None).await
    }

    async fn complete_with_stream(
        &self,
        request: ChatRequest,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<ChatResponse, KiteAiError> {
        let response = self.complete(request).await?;
        if let Some(handler) = on_delta {
            let text = response.message.text_content();
            if !text.trim().is_empty() {
                handler(text);
            }
        }
        Ok(response)
    }
}

fn lock_or_recover_mutex<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn inject_token(process_request: &mut ProcessRequest, token: Option<&str>) {
    match token {
        Some(token) => {
            process_request
                .env
                .insert(CLAUDE_OAUTH_TOKEN_ENV.to_string(), token.to_string());
            process_request
                .env_remove
                .retain(|key| key != CLAUDE_OAUTH_TOKEN_ENV);
        }
        None => {
            process_request.env.remove(CLAUDE_OAUTH_TOKEN_ENV);
            if !process_request
                .env_remove
                .iter()
                .any(|key| key == CLAUDE_OAUTH_TOKEN_ENV)
            {
                process_request
                    .env_remove
                    .push(CLAUDE_OAUTH_TOKEN_ENV.to_string());
            }
        }
    }
}

fn is_auth_rejection(attempt: &Result<StreamOutcome, ProcessError>) -> bool {
    match attempt {
        Ok(outcome) => outcome.is_error && is_auth_failure_message(&outcome.text),
        Err(error) => error.looks_like_auth_failure(),
    }
}

fn chat_response(outcome: StreamOutcome) -> ChatResponse {
    let finish_reason = if outcome.is_error { "error" } else { "stop" };
    ChatResponse {
        message: Message::assistant_text(outcome.text),
        finish_reason: Some(finish_reason.to_string()),
        usage: ChatUsage {
            input_tokens: outcome.usage.input_tokens,
            output_tokens: outcome.usage.output_tokens,
            total_tokens: outcome
                .usage
                .input_tokens
                .saturating_add(outcome.usage.output_tokens),
            cost_usd: outcome.cost_usd,
        },
        session_id: outcome.session_id,
    }
}

/// System messages, joined, for `--append-system-prompt`.
pub fn extract_system_prompt(messages: &[Message]) -> Option<String> {
    let system = messages
        .iter()
        .filter(|message| message.role == MessageRole::System)
        .map(Message::text_content)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>();
    (!system.is_empty()).then(|| system.join("\n\n"))
}

fn messages_since_last_assistant(messages: &[Message]) -> &[Message] {
    let start = messages
        .iter()
        .rposition(|message| message.role == MessageRole::Assistant)
        .map(|index| index + 1)
        .unwrap_or(0);
    &messages[start..]
}

/// Renders the non-system messages as a role-labelled transcript.
pub fn render_claude_prompt(messages: &[Message]) -> String {
    let mut turns = Vec::new();
    for message in messages {
        match message.role {
            MessageRole::System => continue,
            MessageRole::User => turns.push(format!("Human: {}", message.text_content())),
            MessageRole::Assistant => {
                let mut turn = format!("Assistant: {}", message.text_content());
                for call in message.tool_calls() {
                    turn.push_str(&format!("\n[Tool call {}]: {}", call.name, call.arguments));
                }
                turns.push(turn);
            }
            MessageRole::Tool => {
                let tool_name = message.tool_name.as_deref().unwrap_or("tool");
                let marker = if message.is_error { " (error)" } else { "" };
                turns.push(format!(
                    "[Tool result from {tool_name}{marker}]: {}",
                    message.text_content()
                ));
            }
        }
    }

    if turns
        .last()
        .is_some_and(|turn| !turn.starts_with("Human:"))
    {
        turns.push(CONTINUE_PROMPT.to_string());
    }
    turns.join("\n\n")
}

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use httpmock::prelude::*;
use kite_ai::{ChatRequest, KiteAiError, LlmClient, Message};
use kite_auth::{
    AuthConfig, AuthProfile, Credential, FileCredentialStore, OAuthCredential, OAuthGrant,
    OAuthManager,
};
use kite_provider::{ClaudeCliConfig, ClaudeCliProvider};
use serde_json::json;

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    auth: AuthConfig,
}

impl Fixture {
    fn new(server: &MockServer) -> Self {
        kite_core::init_tracing();
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        let auth = AuthConfig {
            token_endpoint: format!("{}/v1/oauth/token", server.base_url()),
            lock_timeout_ms: 10_000,
            refresh_timeout_ms: 5_000,
            ..AuthConfig::with_auth_dir(root.join("auth"))
        };
        Self {
            _dir: dir,
            root,
            auth,
        }
    }

    fn seed_oauth(&self, profile_id: &str, access_token: &str, expires_at_ms: u64) {
        let store = FileCredentialStore::new(self.auth.store_path());
        let mut data = store.load();
        data.profiles.insert(
            profile_id.to_string(),
            AuthProfile::new(Credential::OAuth(OAuthCredential {
                access_token: access_token.to_string(),
                refresh_token: format!("{profile_id}-refresh"),
                expires_at_ms,
                client_id: None,
                provider: "anthropic".to_string(),
                email: None,
            })),
        );
        store.save(&data).expect("seed store");
    }

    fn manager(&self) -> Arc<OAuthManager> {
        Arc::new(OAuthManager::new(self.auth.clone()).expect("oauth manager"))
    }

    fn provider(&self, script: &Path, auth_profile: Option<&str>) -> ClaudeCliProvider {
        ClaudeCliProvider::new(ClaudeCliConfig {
            executable: script.display().to_string(),
            timeout_ms: 10_000,
            extra_args: Vec::new(),
            auth_profile: auth_profile.map(str::to_string),
            ..ClaudeCliConfig::default()
        })
        .expect("provider")
        .with_oauth_manager(self.manager())
    }

    fn invocations(&self) -> usize {
        std::fs::read_to_string(self.root.join("invocations.log"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let script = dir.join("mock-claude.sh");
    let content = format!("#!/bin/sh\nset -eu\n{body}\n");
    std::fs::write(&script, content).expect("write script");
    let mut perms = std::fs::metadata(&script)
        .expect("script metadata")
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).expect("chmod script");
    script
}

/// Mock CLI that logs each run and rejects `rejected_token` like the backend
/// does for an expired OAuth token.
fn token_echo_script(fixture: &Fixture, rejected_token: &str) -> PathBuf {
    write_script(
        &fixture.root,
        &format!(
            r#"
echo run >> "{log}"
cat >/dev/null
token="${{CLAUDE_CODE_OAUTH_TOKEN:-none}}"
if [ "$token" = "{rejected_token}" ]; then
  echo 'API Error: 401 {{"type":"error","error":{{"type":"authentication_error","message":"OAuth token has expired."}}}}' >&2
  exit 1
fi
printf '{{"type":"result","result":"token=%s","session_id":"s-%s"}}\n' "$token" "$token"
"#,
            log = fixture.root.join("invocations.log").display(),
        ),
    )
}

fn far_future_ms() -> u64 {
    kite_core::current_unix_timestamp_ms() + 24 * 60 * 60 * 1_000
}

fn request() -> ChatRequest {
    ChatRequest {
        model: "opus-4.5".to_string(),
        messages: vec![Message::system("be terse"), Message::user("hello")],
        tools: Vec::new(),
        max_tokens: None,
        temperature: None,
    }
}

#[tokio::test]
async fn integration_expired_profile_is_refreshed_and_injected() {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/oauth/token")
                .json_body_includes(json!({ "refresh_token": "anthropic:main-refresh" }).to_string());
            then.status(200)
                .json_body(json!({ "access_token": "fresh-token", "expires_in": 3600 }));
        })
        .await;
    let fixture = Fixture::new(&server);
    fixture.seed_oauth("anthropic:main", "stale-token", 1);
    let script = token_echo_script(&fixture, "never-rejected");
    let provider = fixture.provider(&script, None);

    let response = provider.complete(request()).await.expect("completion");
    refresh.assert_calls_async(1).await;
    assert_eq!(response.message.text_content(), "token=fresh-token");
    assert_eq!(response.session_id.as_deref(), Some("s-fresh-token"));
    assert_eq!(fixture.invocations(), 1);
}

#[tokio::test]
async fn integration_missing_secondary_profile_uses_main_profile_token() {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/oauth/token");
            then.status(500);
        })
        .await;
    let fixture = Fixture::new(&server);
    fixture.seed_oauth("anthropic:main", "main-token", far_future_ms());
    let script = token_echo_script(&fixture, "never-rejected");
    let provider = fixture.provider(&script, Some("anthropic:work"));

    let response = provider.complete(request()).await.expect("completion");
    refresh.assert_calls_async(0).await;
    assert_eq!(response.message.text_content(), "token=main-token");
}

#[tokio::test]
async fn integration_auth_rejection_forces_one_refresh_and_retries() {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/oauth/token");
            then.status(200)
                .json_body(json!({ "access_token": "rotated-token", "refresh_token": "r2" }));
        })
        .await;
    let fixture = Fixture::new(&server);
    fixture.seed_oauth("anthropic:main", "revoked-token", far_future_ms());
    let script = token_echo_script(&fixture, "revoked-token");
    let provider = fixture.provider(&script, None);

    let response = provider
        .chat(&request(), Some("conversation-1"))
        .await
        .expect("retry succeeds");
    refresh.assert_calls_async(1).await;
    assert_eq!(response.message.text_content(), "token=rotated-token");
    assert_eq!(fixture.invocations(), 2);
    assert_eq!(
        provider.session_id("conversation-1").as_deref(),
        Some("s-rotated-token")
    );

    let stored = FileCredentialStore::new(fixture.auth.store_path()).load();
    assert_eq!(stored.profiles["anthropic:main"].error_count, 0);
}

#[tokio::test]
async fn regression_persistent_rejection_is_not_retried_twice_and_is_recorded() {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/oauth/token");
            then.status(200)
                .json_body(json!({ "access_token": "still-bad" }));
        })
        .await;
    let fixture = Fixture::new(&server);
    fixture.seed_oauth("anthropic:main", "bad", far_future_ms());
    let script = write_script(
        &fixture.root,
        &format!(
            "echo run >> \"{}\"\ncat >/dev/null\necho 'Invalid API key · Please run /login' >&2\nexit 1",
            fixture.root.join("invocations.log").display()
        ),
    );
    let provider = fixture.provider(&script, None);

    let error = provider
        .complete(request())
        .await
        .expect_err("rejection persists");
    assert!(matches!(error, KiteAiError::Process(ref message) if message.contains("/login")));
    refresh.assert_calls_async(1).await;
    assert_eq!(fixture.invocations(), 2);

    let stored = FileCredentialStore::new(fixture.auth.store_path()).load();
    assert_eq!(stored.profiles["anthropic:main"].error_count, 1);
}

#[tokio::test]
async fn regression_exhausted_credential_chain_fails_before_spawning() {
    let server = MockServer::start_async().await;
    let fixture = Fixture::new(&server);
    let script = token_echo_script(&fixture, "never-rejected");
    let provider = fixture.provider(&script, Some("anthropic:work"));

    let error = provider
        .complete(request())
        .await
        .expect_err("no credentials anywhere");
    assert!(matches!(error, KiteAiError::CredentialUnavailable(_)), "{error}");
    assert_eq!(fixture.invocations(), 0);
}

#[tokio::test]
async fn integration_added_credentials_serve_the_provider_without_refresh() {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/oauth/token");
            then.status(500);
        })
        .await;
    let fixture = Fixture::new(&server);
    let manager = fixture.manager();
    manager
        .add_credentials(
            "anthropic:main",
            OAuthGrant::new("granted-token", "granted-refresh", 8 * 60 * 60)
                .with_email("dev@example.com"),
        )
        .await
        .expect("add credentials");
    let script = token_echo_script(&fixture, "never-rejected");
    let provider = fixture.provider(&script, None);

    let response = provider.complete(request()).await.expect("completion");
    refresh.assert_calls_async(0).await;
    assert_eq!(response.message.text_content(), "token=granted-token");

    let statuses = manager.list_profiles();
    assert!(statuses["anthropic:main"].valid);
    assert_eq!(
        statuses["anthropic:main"].email.as_deref(),
        Some("dev@example.com")
    );
}

//! Claude CLI transport for Kite.
//!
//! Drives the `claude` executable in print mode with `stream-json` output,
//! reduces its newline-delimited event stream to a single answer, and adapts
//! the result to the `kite_ai::LlmClient` contract with OAuth tokens injected
//! from `kite_auth`.

mod claude_cli_client;
mod cli_executable;
mod config;
mod error;
mod stream_event;
mod stream_process;
mod stream_reducer;

pub use claude_cli_client::{
    extract_system_prompt, normalize_claude_model, render_claude_prompt, ClaudeCliProvider,
    CLAUDE_OAUTH_TOKEN_ENV, SCRUBBED_API_KEY_ENVS,
};
pub use cli_executable::{is_executable_available, resolve_executable};
pub use config::{
    load_kite_config, parse_kite_config, ClaudeCliConfig, ErrorPolicy, KiteConfig,
    KITE_AUTH_DIR_ENV, KITE_CLAUDE_CLI_ENV,
};
pub use error::{is_auth_failure_message, ProcessError};
pub use stream_event::{
    classify_stream_line, parse_stream_line, StreamContentBlock, StreamEvent, StreamParseError,
    StreamUsage,
};
pub use stream_process::{build_stream_args, ProcessRequest, StreamProcessClient};
pub use stream_reducer::{reduce_stream_events, StreamOutcome, StreamReducer};

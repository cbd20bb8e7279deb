//! Runs the Claude CLI in print mode with `stream-json` output.
//!
//! The prompt goes over stdin from its own task while stdout is drained line
//! by line into a [`StreamReducer`] and stderr is collected on the side. One
//! deadline covers draining, stderr collection and the exit wait; when it
//! passes the child is killed and reaped before the timeout is reported.
//!
//! The child leads its own process group on unix. Once it exits, descendants
//! that keep stdout or stderr open get a short grace period before the whole
//! group is killed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::ProcessError;
use crate::stream_event::classify_stream_line;
use crate::stream_reducer::{StreamOutcome, StreamReducer};

const KILL_GRACE: Duration = Duration::from_secs(5);
const EXIT_LINGER_GRACE: Duration = Duration::from_secs(1);
const MAX_FAILURE_SUMMARY_CHARS: usize = 240;
const MAX_RETAINED_STDOUT_CHARS: usize = 4_096;

/// One streaming invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub prompt: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub resume_session_id: Option<String>,
    pub extra_args: Vec<String>,
    pub timeout: Duration,
    /// Variables set on the child on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Inherited variables hidden from the child. Applied before `env`.
    pub env_remove: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system_prompt: None,
            resume_session_id: None,
            extra_args: Vec::new(),
            timeout,
            env: BTreeMap::new(),
            env_remove: Vec::new(),
            working_dir: None,
        }
    }
}

/// Argument vector for a streaming run, excluding the executable.
///
/// The system prompt is only appended to fresh sessions; a resumed session
/// already carries it.
pub fn build_stream_args(request: &ProcessRequest) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
        "--model".to_string(),
        request.model.clone(),
    ];
    match request.resume_session_id.as_deref() {
        Some(session_id) => {
            args.push("--resume".to_string());
            args.push(session_id.to_string());
        }
        None => {
            if let Some(system_prompt) = request
                .system_prompt
                .as_deref()
                .filter(|prompt| !prompt.trim().is_empty())
            {
                args.push("--append-system-prompt".to_string());
                args.push(system_prompt.to_string());
            }
        }
    }
    args.extend(request.extra_args.iter().cloned());
    args
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProcessClient {
    executable: String,
}

impl StreamProcessClient {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Spawns the CLI, feeds `request.prompt` and reduces its output.
    ///
    /// The child is terminated before this returns on every path.
    pub async fn run(&self, request: &ProcessRequest) -> Result<StreamOutcome, ProcessError> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + request.timeout;
        let args = build_stream_args(request);
        tracing::debug!(
            executable = %self.executable,
            model = %request.model,
            resume = request.resume_session_id.is_some(),
            prompt_bytes = request.prompt.len(),
            arg_count = args.len(),
            "spawning streaming cli process"
        );

        let mut command = Command::new(&self.executable);
        command.kill_on_drop(true);
        command.args(&args);
        for key in &request.env_remove {
            command.env_remove(key);
        }
        command.envs(&request.env);
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);
        let mut child = spawn_with_text_file_busy_retry(&mut command, &self.executable).await?;
        let process_group = child.id();

        let stdin = child.stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(ProcessError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ProcessError::MissingPipe("stderr"))?;

        let mut stdin_task = spawn_stdin_writer(stdin, request.prompt.clone().into_bytes());
        let mut stderr_task = spawn_stderr_collector(stderr);

        let mut reducer = StreamReducer::new();
        let mut stdout_head = String::new();
        let drain = async {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            let mut exit_status = None;
            let mut linger_deadline = deadline;
            let mut group_killed = false;
            loop {
                let step = match exit_status {
                    None => tokio::select! {
                        read = reader.read_until(b'\n', &mut line) => DrainStep::Read(read),
                        waited = child.wait() => DrainStep::Exited(waited),
                    },
                    Some(_) => {
                        let read = reader.read_until(b'\n', &mut line);
                        match tokio::time::timeout_at(linger_deadline, read).await {
                            Ok(read) => DrainStep::Read(read),
                            Err(_) => DrainStep::Lingering,
                        }
                    }
                };
                match step {
                    DrainStep::Read(read) => {
                        let read = read.map_err(|source| ProcessError::Io {
                            context: "reading stdout",
                            source,
                        })?;
                        if read == 0 {
                            break;
                        }
                        consume_stdout_line(&line, &mut reducer, &mut stdout_head);
                        line.clear();
                    }
                    DrainStep::Exited(waited) => {
                        exit_status = Some(waited.map_err(|source| ProcessError::Io {
                            context: "waiting for exit",
                            source,
                        })?);
                        linger_deadline =
                            deadline.min(tokio::time::Instant::now() + EXIT_LINGER_GRACE);
                    }
                    DrainStep::Lingering => {
                        tracing::debug!("cli exited but its stdout is still open");
                        if group_killed || !kill_process_group(process_group) {
                            break;
                        }
                        group_killed = true;
                        linger_deadline =
                            deadline.min(tokio::time::Instant::now() + EXIT_LINGER_GRACE);
                    }
                }
            }
            if !line.is_empty() {
                consume_stdout_line(&line, &mut reducer, &mut stdout_head);
            }

            let status = match exit_status {
                Some(status) => status,
                None => child.wait().await.map_err(|source| ProcessError::Io {
                    context: "waiting for exit",
                    source,
                })?,
            };

            let stderr_deadline = deadline.min(tokio::time::Instant::now() + EXIT_LINGER_GRACE);
            let stderr_text = match tokio::time::timeout_at(stderr_deadline, &mut stderr_task).await
            {
                Ok(joined) => joined.unwrap_or_default(),
                Err(_) => {
                    tracing::debug!("cli exited but its stderr is still open");
                    if !group_killed {
                        kill_process_group(process_group);
                    }
                    match tokio::time::timeout(EXIT_LINGER_GRACE, &mut stderr_task).await {
                        Ok(joined) => joined.unwrap_or_default(),
                        Err(_) => {
                            stderr_task.abort();
                            String::new()
                        }
                    }
                }
            };

            match tokio::time::timeout(EXIT_LINGER_GRACE, &mut stdin_task).await {
                Ok(Ok(Err(error))) => {
                    tracing::debug!(error = %error, "prompt was not fully written to stdin");
                }
                Ok(Err(error)) => {
                    tracing::debug!(error = %error, "stdin writer task failed");
                }
                Ok(Ok(Ok(()))) => {}
                Err(_) => {
                    tracing::debug!("cli exited without reading the whole prompt");
                    stdin_task.abort();
                }
            }
            Ok::<(ExitStatus, String), ProcessError>((status, stderr_text))
        };
        let drained = tokio::time::timeout_at(deadline, drain).await;

        let (status, stderr_text) = match drained {
            Ok(Ok(done)) => done,
            Ok(Err(error)) => {
                stdin_task.abort();
                stderr_task.abort();
                terminate_child(&mut child, process_group).await;
                return Err(error);
            }
            Err(_) => {
                stdin_task.abort();
                stderr_task.abort();
                terminate_child(&mut child, process_group).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(
                    executable = %self.executable,
                    elapsed_ms,
                    limit_ms = request.timeout.as_millis() as u64,
                    "streaming cli process timed out"
                );
                return Err(ProcessError::Timeout {
                    elapsed_ms,
                    limit_ms: request.timeout.as_millis() as u64,
                    input_bytes: request.prompt.len(),
                });
            }
        };

        if !status.success() {
            return Err(ProcessError::ExitNonZero {
                code: status.code(),
                message: summarize_process_failure(&stderr_text, &stdout_head),
            });
        }
        if !stderr_text.trim().is_empty() {
            tracing::debug!(
                stderr = %truncate_for_log(stderr_text.trim()),
                "streaming cli process wrote to stderr"
            );
        }

        tracing::debug!(
            events = reducer.events_seen(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "streaming cli process finished"
        );
        Ok(reducer.finish())
    }
}

fn spawn_stdin_writer(
    mut stdin: tokio::process::ChildStdin,
    prompt: Vec<u8>,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        stdin.write_all(&prompt).await?;
        stdin.shutdown().await
    })
}

fn spawn_stderr_collector(mut stderr: tokio::process::ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Err(error) = stderr.read_to_end(&mut buffer).await {
            tracing::debug!(error = %error, "failed to read cli stderr");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

enum DrainStep {
    Read(std::io::Result<usize>),
    Exited(std::io::Result<ExitStatus>),
    Lingering,
}

fn consume_stdout_line(line: &[u8], reducer: &mut StreamReducer, stdout_head: &mut String) {
    let text = String::from_utf8_lossy(line);
    retain_head(stdout_head, &text);
    if let Some(event) = classify_stream_line(&text) {
        reducer.push(event);
    }
}

/// Sends SIGKILL to the process group led by the child. Returns whether any
/// member was signalled.
#[cfg(unix)]
fn kill_process_group(process_group: Option<u32>) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = process_group.and_then(|id| i32::try_from(id).ok()) else {
        return false;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => {
            tracing::debug!(pgid, "killed cli process group");
            true
        }
        Err(Errno::ESRCH) => false,
        Err(error) => {
            tracing::warn!(pgid, error = %error, "failed to kill cli process group");
            false
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_process_group: Option<u32>) -> bool {
    false
}

async fn terminate_child(child: &mut Child, process_group: Option<u32>) {
    kill_process_group(process_group);
    if let Err(error) = child.start_kill() {
        tracing::debug!(error = %error, "failed to signal cli process");
    }
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(%status, "cli process terminated"),
        Ok(Err(error)) => tracing::warn!(error = %error, "failed to reap cli process"),
        Err(_) => tracing::warn!("cli process did not exit after kill"),
    }
}

async fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    executable: &str,
) -> Result<Child, ProcessError> {
    const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error)
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES =>
            {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            Err(source) => {
                return Err(ProcessError::Spawn {
                    executable: executable.to_string(),
                    source,
                });
            }
        }
    }
}

fn retain_head(head: &mut String, text: &str) {
    let remaining = MAX_RETAINED_STDOUT_CHARS.saturating_sub(head.chars().count());
    if remaining > 0 {
        head.extend(text.chars().take(remaining));
    }
}

pub(crate) fn summarize_process_failure(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return truncate_for_log(stderr);
    }

    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return truncate_for_log(stdout);
    }

    "no error output".to_string()
}

pub(crate) fn truncate_for_log(text: &str) -> String {
    if text.chars().count() <= MAX_FAILURE_SUMMARY_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_FAILURE_SUMMARY_CHARS).collect::<String>() + "..."
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::Path;

    use tempfile::tempdir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    #[cfg(unix)]
    pub(crate) fn write_script(dir: &Path, body: &str) -> PathBuf {
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

    fn request(prompt: &str, timeout_ms: u64) -> ProcessRequest {
        ProcessRequest::new(prompt, "opus", Duration::from_millis(timeout_ms))
    }

    #[test]
    fn unit_stream_args_are_deterministic() {
        let mut fresh = request("hi", 1_000);
        fresh.system_prompt = Some("be brief".to_string());
        fresh.extra_args = vec!["--dangerously-skip-permissions".to_string()];
        assert_eq!(
            build_stream_args(&fresh),
            vec![
                "-p",
                "--output-format",
                "stream-json",
                "--verbose",
                "--model",
                "opus",
                "--append-system-prompt",
                "be brief",
                "--dangerously-skip-permissions",
            ]
        );

        let mut resumed = fresh.clone();
        resumed.resume_session_id = Some("s1".to_string());
        let args = build_stream_args(&resumed);
        assert!(args.windows(2).any(|pair| pair == ["--resume", "s1"]));
        assert!(!args.iter().any(|arg| arg == "--append-system-prompt"));
    }

    #[test]
    fn unit_summarize_process_failure_prefers_stderr() {
        assert_eq!(summarize_process_failure(" boom \n", "out"), "boom");
        assert_eq!(summarize_process_failure("", " out "), "out");
        assert_eq!(summarize_process_failure(" ", ""), "no error output");
        let long = "e".repeat(400);
        assert_eq!(
            summarize_process_failure(&long, "").chars().count(),
            MAX_FAILURE_SUMMARY_CHARS + 3
        );
    }

    #[test]
    fn unit_retained_stdout_head_is_bounded() {
        let mut head = String::new();
        retain_head(&mut head, &"x".repeat(MAX_RETAINED_STDOUT_CHARS - 2));
        retain_head(&mut head, "abcdef");
        assert_eq!(head.chars().count(), MAX_RETAINED_STDOUT_CHARS);
        assert!(head.ends_with("ab"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn integration_result_event_yields_text_and_session() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            r#"
if [ "$1" != "-p" ]; then
  echo "expected -p first" >&2
  exit 11
fi
fmt=""
model=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output-format) shift; fmt="$1";;
    --model) shift; model="$1";;
  esac
  shift
done
if [ "$fmt" != "stream-json" ] || [ "$model" != "opus" ]; then
  echo "unexpected args fmt=$fmt model=$model" >&2
  exit 12
fi
cat >/dev/null
echo '{"type":"system","subtype":"init","session_id":"s1"}'
echo '{"type":"assistant","message":{"content":[{"type":"text","text":"hel"}]}}'
echo '{"type":"result","result":"hello","session_id":"s1","total_cost_usd":0.01,"usage":{"input_tokens":7,"output_tokens":2}}'
"#,
        );
        let client = StreamProcessClient::new(script.display().to_string());

        let outcome = client
            .run(&request("say hello", 10_000))
            .await
            .expect("run succeeds");
        assert_eq!(outcome.text, "hello");
        assert_eq!(outcome.session_id.as_deref(), Some("s1"));
        assert_eq!(outcome.usage.input_tokens, 7);
        assert_eq!(outcome.cost_usd, Some(0.01));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn functional_assistant_text_is_used_when_result_is_missing() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            r#"echo '{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}'"#,
        );
        let client = StreamProcessClient::new(script.display().to_string());

        let outcome = client.run(&request("x", 10_000)).await.expect("run");
        assert_eq!(outcome.text, "partial");
        assert_eq!(outcome.session_id, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn functional_prompt_is_delivered_over_stdin() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            r#"
prompt="$(cat)"
printf '{"type":"result","result":"got:%s"}\n' "$prompt"
"#,
        );
        let client = StreamProcessClient::new(script.display().to_string());

        let outcome = client.run(&request("ping", 10_000)).await.expect("run");
        assert_eq!(outcome.text, "got:ping");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn functional_env_overrides_reach_the_child() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            r#"
cat >/dev/null
printf '{"type":"result","result":"%s|%s"}\n' "${CLAUDE_CODE_OAUTH_TOKEN:-none}" "${KITE_TEST_HIDDEN:-unset}"
"#,
        );
        let client = StreamProcessClient::new(script.display().to_string());
        let mut run = request("x", 10_000);
        run.env
            .insert("CLAUDE_CODE_OAUTH_TOKEN".to_string(), "tok-1".to_string());
        run.env_remove.push("KITE_TEST_HIDDEN".to_string());

        let outcome = client.run(&run).await.expect("run");
        assert_eq!(outcome.text, "tok-1|unset");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn regression_non_zero_exit_reports_code_and_stderr() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            r#"
echo "boom" >&2
exit 7
"#,
        );
        let client = StreamProcessClient::new(script.display().to_string());

        let error = client
            .run(&request("x", 10_000))
            .await
            .expect_err("non-zero exit must fail");
        assert!(matches!(error, ProcessError::ExitNonZero { code: Some(7), .. }));
        let message = error.to_string();
        assert!(message.contains("boom"), "{message}");
        assert!(message.contains('7'), "{message}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn regression_never_exiting_process_times_out_and_is_killed() {
        let dir = tempdir().expect("tempdir");
        let pid_file = dir.path().join("child.pid");
        let script = write_script(
            dir.path(),
            &format!(
                "echo $$ > \"{}\"\necho '{{\"type\":\"assistant\",\"message\":{{\"content\":\"discarded\"}}}}'\nexec sleep 30",
                pid_file.display()
            ),
        );
        let client = StreamProcessClient::new(script.display().to_string());

        let started = Instant::now();
        let error = client
            .run(&request("abc", 500))
            .await
            .expect_err("must time out");
        assert!(started.elapsed() < Duration::from_secs(10));
        match error {
            ProcessError::Timeout {
                limit_ms,
                input_bytes,
                elapsed_ms,
            } => {
                assert_eq!(limit_ms, 500);
                assert_eq!(input_bytes, 3);
                assert!(elapsed_ms >= 500);
            }
            other => panic!("unexpected error: {other}"),
        }

        let pid = std::fs::read_to_string(&pid_file).expect("pid file");
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(Stdio::null())
            .status()
            .expect("run kill -0");
        assert!(!alive.success(), "child {pid} is still running");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn regression_invalid_utf8_lines_do_not_abort_draining() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            r#"
printf '\377\376 garbage\n'
echo '{"type":"result","result":"ok"}'
"#,
        );
        let client = StreamProcessClient::new(script.display().to_string());

        let outcome = client.run(&request("x", 10_000)).await.expect("run");
        assert_eq!(outcome.text, "ok");
    }

    #[cfg(target_os = "linux")]
    fn process_is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
            // The state field follows the parenthesised command name.
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn regression_exited_cli_with_lingering_descendant_keeps_its_result() {
        let dir = tempdir().expect("tempdir");
        let pid_file = dir.path().join("grandchild.pid");
        let script = write_script(
            dir.path(),
            &format!(
                r#"
cat >/dev/null
echo '{{"type":"result","result":"done","session_id":"s-bg"}}'
sleep 30 &
echo $! > "{}"
exit 0
"#,
                pid_file.display()
            ),
        );
        let client = StreamProcessClient::new(script.display().to_string());

        let started = Instant::now();
        let outcome = client
            .run(&request("x", 20_000))
            .await
            .expect("finished result is kept");
        assert!(
            started.elapsed() < Duration::from_secs(8),
            "took {:?}",
            started.elapsed()
        );
        assert_eq!(outcome.text, "done");
        assert_eq!(outcome.session_id.as_deref(), Some("s-bg"));

        let pid = std::fs::read_to_string(&pid_file).expect("pid file");
        let reaped_by = Instant::now() + Duration::from_secs(3);
        while process_is_running(&pid) && Instant::now() < reaped_by {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!process_is_running(&pid), "descendant {pid} outlived the run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn regression_large_prompt_does_not_deadlock_against_busy_stdout() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            r#"
yes '{"type":"system","subtype":"noise"}' | head -n 5000
bytes="$(wc -c | tr -d ' ')"
printf '{"type":"result","result":"bytes=%s"}\n' "$bytes"
"#,
        );
        let client = StreamProcessClient::new(script.display().to_string());
        let prompt = "p".repeat(4 * 1024 * 1024);

        let outcome = client
            .run(&request(&prompt, 30_000))
            .await
            .expect("large prompt run");
        assert_eq!(outcome.text, format!("bytes={}", prompt.len()));
    }

    #[tokio::test]
    async fn unit_missing_executable_is_a_spawn_error() {
        let client = StreamProcessClient::new("/nonexistent/kite-claude-cli");
        let error = client
            .run(&request("x", 1_000))
            .await
            .expect_err("spawn must fail");
        assert!(matches!(error, ProcessError::Spawn { .. }), "{error}");
    }
}

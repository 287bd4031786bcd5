use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to start '{program}' in {cwd}: {source}")]
    Spawn {
        program: String,
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("shell session closed")]
    Closed,

    #[error("shell exited before the command completed")]
    Exited,

    #[error("shell I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// ExecResult
// ---------------------------------------------------------------------------

/// Outcome of one command. `success` is true only for exit code 0.
#[derive(Debug)]
pub struct ExecResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<ShellError>,
}

impl ExecResult {
    pub fn completed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: exit_code == 0,
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            error: None,
        }
    }

    pub fn failed(error: ShellError) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.error, Some(ShellError::Timeout(_)))
    }

    /// Human-readable reason for a failed command: stderr if any, then the
    /// execution error, then the exit status.
    pub fn failure_message(&self) -> String {
        if !self.stderr.trim().is_empty() {
            return self.stderr.trim().to_string();
        }
        if let Some(err) = &self.error {
            return err.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "command failed".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ShellSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    Posix,
    Cmd,
}

/// Interpreter launched for each session.
#[derive(Debug, Clone)]
pub struct ShellSpec {
    pub program: String,
    pub args: Vec<String>,
    pub flavor: ShellFlavor,
}

impl ShellSpec {
    /// `bash` reading commands from stdin without profile or rc files, so
    /// nothing but command output reaches the pipes.
    pub fn bash() -> Self {
        Self {
            program: "bash".into(),
            args: vec!["--noprofile".into(), "--norc".into(), "-s".into()],
            flavor: ShellFlavor::Posix,
        }
    }

    pub fn cmd() -> Self {
        Self {
            program: "cmd".into(),
            args: vec!["/Q".into()],
            flavor: ShellFlavor::Cmd,
        }
    }

    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::cmd()
        } else {
            Self::bash()
        }
    }

    /// Script written to stdin for one command: the command itself with
    /// stdin detached, then the token on stderr and `<token>:<status>` on
    /// stdout, each on a line of its own.
    fn wrap(&self, command: &str, token: &str) -> String {
        match self.flavor {
            ShellFlavor::Posix => format!(
                "{{ {command}\n}} < /dev/null\n__am_rc=$?\nprintf '\\n%s\\n' '{token}' >&2\nprintf '\\n%s:%s\\n' '{token}' \"$__am_rc\"\n"
            ),
            ShellFlavor::Cmd => format!(
                "{command} < NUL\r\necho.{token} 1>&2\r\necho.{token}:%ERRORLEVEL%\r\n"
            ),
        }
    }
}

impl Default for ShellSpec {
    fn default() -> Self {
        Self::platform_default()
    }
}

// ---------------------------------------------------------------------------
// Sentinel
// ---------------------------------------------------------------------------

/// A fresh end-of-command token; unique per call.
pub fn new_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("__CMD_DONE_{nanos}_{}__", Uuid::new_v4().simple())
}

/// Exit code carried by `line` if, trimmed, it is exactly `<token>:<digits>`.
pub fn parse_sentinel(line: &str, token: &str) -> Option<i32> {
    let digits = line.trim().strip_prefix(token)?.strip_prefix(':')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// ShellSession
// ---------------------------------------------------------------------------

struct ExecRequest {
    command: String,
    timeout: Duration,
    reply: oneshot::Sender<ExecResult>,
}

/// One long-lived interpreter process.
///
/// Requests queue on a bounded channel and run one at a time in arrival
/// order. A timeout, a read failure or [`cleanup`](Self::cleanup) kills the
/// interpreter and closes the session; callers then need a new session.
pub struct ShellSession {
    key: String,
    pid: Option<u32>,
    requests: flume::Sender<ExecRequest>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl ShellSession {
    /// Start the interpreter in `cwd`. Must be called within a tokio runtime.
    pub fn spawn(
        key: impl Into<String>,
        cwd: &Path,
        spec: &ShellSpec,
        capacity: usize,
    ) -> Result<Self, ShellError> {
        let key = key.into();
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ShellError::Spawn {
            program: spec.program.clone(),
            cwd: cwd.to_path_buf(),
            source,
        })?;
        let pid = child.id();

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(i), Some(o), Some(e)) => (i, o, e),
            _ => {
                return Err(ShellError::Io(std::io::Error::other(
                    "interpreter pipes unavailable",
                )))
            }
        };

        // Stderr is drained continuously so a chatty command never blocks on
        // a full pipe while stdout is being read.
        let (stderr_tx, stderr_rx) = flume::unbounded::<String>();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if stderr_tx.send(line).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let (req_tx, req_rx) = flume::bounded(capacity.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let io = ShellIo {
            stdin,
            stdout: BufReader::new(stdout),
            stderr: stderr_rx,
            spec: spec.clone(),
        };
        tokio::spawn(run_loop(
            key.clone(),
            child,
            io,
            req_rx,
            closed.clone(),
            shutdown.clone(),
        ));

        info!(session = %key, pid, cwd = %cwd.display(), "shell session started");
        Ok(Self {
            key,
            pid,
            requests: req_tx,
            closed,
            shutdown,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queue `command` and wait for its result.
    pub async fn execute(&self, command: &str, timeout: Duration) -> ExecResult {
        if self.is_closed() {
            return ExecResult::failed(ShellError::Closed);
        }
        let (reply, rx) = oneshot::channel();
        let request = ExecRequest {
            command: command.to_string(),
            timeout,
            reply,
        };
        if self.requests.send_async(request).await.is_err() {
            return ExecResult::failed(ShellError::Closed);
        }
        rx.await.unwrap_or_else(|_| ExecResult::failed(ShellError::Closed))
    }

    /// Close stdin and kill the interpreter. In-flight and queued requests
    /// fail with [`ShellError::Closed`].
    pub fn cleanup(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(session = %self.key, "shell session cleanup requested");
        }
        self.shutdown.notify_one();
    }
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("key", &self.key)
            .field("pid", &self.pid)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

// ---------------------------------------------------------------------------
// Session loop
// ---------------------------------------------------------------------------

struct ShellIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: flume::Receiver<String>,
    spec: ShellSpec,
}

impl ShellIo {
    async fn run(&mut self, command: &str) -> Result<ExecResult, ShellError> {
        let token = new_token();

        // Anything left on stderr belongs to an earlier command.
        while self.stderr.try_recv().is_ok() {}

        self.stdin
            .write_all(self.spec.wrap(command, &token).as_bytes())
            .await?;
        self.stdin.flush().await?;

        let mut stdout = String::new();
        let mut buf = Vec::new();
        let exit_code = loop {
            buf.clear();
            if self.stdout.read_until(b'\n', &mut buf).await? == 0 {
                return Err(ShellError::Exited);
            }
            let line = String::from_utf8_lossy(&buf);
            if let Some(code) = parse_sentinel(&line, &token) {
                break code;
            }
            stdout.push_str(&line);
        };

        let mut stderr = String::new();
        loop {
            match self.stderr.recv_async().await {
                Ok(line) if line.trim() == token => break,
                Ok(line) => stderr.push_str(&line),
                Err(_) => return Err(ShellError::Exited),
            }
        }

        Ok(ExecResult::completed(
            exit_code,
            stdout.trim(),
            stderr.trim(),
        ))
    }
}

async fn run_loop(
    key: String,
    mut child: Child,
    mut io: ShellIo,
    requests: flume::Receiver<ExecRequest>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    loop {
        let request = tokio::select! {
            _ = shutdown.notified() => break,
            next = requests.recv_async() => match next {
                Ok(r) => r,
                Err(_) => break,
            },
        };
        if closed.load(Ordering::SeqCst) {
            let _ = request.reply.send(ExecResult::failed(ShellError::Closed));
            break;
        }

        debug!(session = %key, command = %request.command, "executing");
        let outcome = tokio::select! {
            _ = shutdown.notified() => {
                let _ = request.reply.send(ExecResult::failed(ShellError::Closed));
                break;
            }
            outcome = tokio::time::timeout(request.timeout, io.run(&request.command)) => outcome,
        };

        match outcome {
            Ok(Ok(result)) => {
                let _ = request.reply.send(result);
            }
            Ok(Err(e)) => {
                warn!(session = %key, error = %e, "shell session failed mid-command");
                let _ = request.reply.send(ExecResult::failed(e));
                break;
            }
            Err(_) => {
                warn!(
                    session = %key,
                    command = %request.command,
                    timeout = ?request.timeout,
                    "command timed out, killing shell session"
                );
                let _ = request.reply.send(ExecResult::failed(ShellError::Timeout(request.timeout)));
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    drop(io);
    terminate(&key, &mut child).await;
}

async fn terminate(key: &str, child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The interpreter leads its own process group; take its children too.
        // SAFETY: killpg only sends a signal to the given process group.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    if let Err(e) = child.kill().await {
        debug!(session = %key, error = %e, "kill after exit");
    }
    info!(session = %key, "shell session closed");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_requires_exact_line() {
        let token = "__CMD_DONE_1_abc__";
        assert_eq!(parse_sentinel("__CMD_DONE_1_abc__:0\n", token), Some(0));
        assert_eq!(parse_sentinel("  __CMD_DONE_1_abc__:127  ", token), Some(127));
        assert_eq!(parse_sentinel("x __CMD_DONE_1_abc__:0", token), None);
        assert_eq!(parse_sentinel("__CMD_DONE_1_abc__:0 trailing", token), None);
        assert_eq!(parse_sentinel("__CMD_DONE_1_abc__:", token), None);
        assert_eq!(parse_sentinel("__CMD_DONE_1_abc__:-1", token), None);
        assert_eq!(parse_sentinel("__CMD_DONE_1_abc__", token), None);
    }

    #[test]
    fn tokens_are_unique() {
        let a = new_token();
        let b = new_token();
        assert_ne!(a, b);
        assert!(a.starts_with("__CMD_DONE_"));
        assert!(a.ends_with("__"));
    }

    #[test]
    fn failure_message_prefers_stderr() {
        let r = ExecResult::completed(2, "", "boom\n");
        assert!(!r.success);
        assert_eq!(r.failure_message(), "boom");
        let r = ExecResult::completed(3, "", "");
        assert_eq!(r.failure_message(), "exit status 3");
        let r = ExecResult::failed(ShellError::Timeout(Duration::from_secs(2)));
        assert!(r.is_timeout());
        assert!(r.failure_message().starts_with("timeout"));
    }

    #[test]
    fn posix_wrap_reports_status_on_failure_too() {
        let script = ShellSpec::bash().wrap("false", "TOK");
        assert!(script.starts_with("{ false\n} < /dev/null\n"));
        assert!(script.contains("__am_rc=$?"));
        assert!(!script.contains("&&"));
    }
}

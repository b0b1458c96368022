//! Persistent shell session
//!
//! One `sh` process runs every command of a build, so `cd` and `export`
//! carry over from one command (and phase) to the next.
//!
//! Protocol:
//! - stderr is merged into stdout once, at startup (`exec 2>&1`)
//! - each command runs as `{ eval '<command>'\n} </dev/null`: it cannot
//!   consume the session's own input, and a command that does not parse
//!   fails inside `eval` instead of swallowing the rest of the protocol
//! - after it, the shell prints `\n<marker>:<exit code>`; the marker is unique
//!   per session, and every line read before it is command output
//!
//! If a command terminates the shell (`exit`, a syntax error), its exit code
//! is the shell's exit status and the session refuses further commands.

use keel_core::error::BuildError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};
use uuid::Uuid;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ShellSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    marker: String,
    exited: Option<i32>,
}

impl ShellSession {
    /// Starts a session from a command that runs a shell reading stdin
    pub async fn start(mut command: Command) -> Result<Self, BuildError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| BuildError::Environment(format!("failed to start shell: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BuildError::Environment("shell stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BuildError::Environment("shell stdout is not piped".to_string()))?;

        let mut session = Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            marker: format!("__KEEL_{}__", Uuid::new_v4().simple()),
            exited: None,
        };

        session.write("exec 2>&1\n").await?;
        debug!("Shell session started");
        Ok(session)
    }

    /// Starts a local `sh` in `dir`
    pub async fn local(dir: &Path) -> Result<Self, BuildError> {
        let mut command = Command::new("sh");
        command.current_dir(dir);
        Self::start(command).await
    }

    /// True once the shell process has gone away
    pub fn has_exited(&self) -> bool {
        self.exited.is_some()
    }

    /// Runs one command, passing each output line to `on_line`
    ///
    /// Returns the command's exit code.
    pub async fn execute<F>(&mut self, command: &str, mut on_line: F) -> Result<i32, BuildError>
    where
        F: FnMut(&str) + Send,
    {
        if let Some(code) = self.exited {
            return Err(BuildError::Environment(format!(
                "shell session already exited with code {}",
                code
            )));
        }

        let script = format!(
            "{{ eval {}\n}} </dev/null\nprintf '\\n{}:%d\\n' \"$?\"\n",
            quote(command),
            self.marker
        );
        self.write(&script).await?;

        // The marker is preceded by a newline of our own; hold back a blank
        // line until we know it is not that one.
        let mut held_blank = false;
        loop {
            let Some(line) = self.read_line().await? else {
                let code = self.reap().await;
                warn!("Shell exited with code {} while running a command", code);
                self.exited = Some(code);
                return Ok(code);
            };

            if let Some(code) = self.parse_marker(&line) {
                return Ok(code);
            }

            if held_blank {
                on_line("");
            }
            held_blank = line.is_empty();
            if !held_blank {
                on_line(&line);
            }
        }
    }

    /// Exports a variable into the session without echoing its value
    pub async fn set_var(&mut self, name: &str, value: &str) -> Result<(), BuildError> {
        if !is_valid_name(name) {
            return Err(BuildError::Environment(format!(
                "invalid variable name '{}'",
                name
            )));
        }

        let code = self
            .execute(&format!("export {}={}", name, quote(value)), |_| {})
            .await?;
        if code != 0 {
            return Err(BuildError::Environment(format!(
                "failed to export {} (exit code {})",
                name, code
            )));
        }
        Ok(())
    }

    /// Reads a variable from the session; unset and empty both read as `None`
    pub async fn get_var(&mut self, name: &str) -> Result<Option<String>, BuildError> {
        if !is_valid_name(name) {
            return Err(BuildError::Environment(format!(
                "invalid variable name '{}'",
                name
            )));
        }

        let mut lines = Vec::new();
        self.execute(&format!("printf '%s' \"${{{}-}}\"", name), |line| {
            lines.push(line.to_string())
        })
        .await?;

        let value = lines.join("\n");
        Ok((!value.is_empty()).then_some(value))
    }

    /// Ends the session and returns the shell's exit code
    pub async fn shutdown(&mut self) -> i32 {
        if let Some(code) = self.exited {
            return code;
        }

        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.write_all(b"exit\n").await;
            let _ = stdin.flush().await;
        }

        let code = match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => status.code().unwrap_or(-1),
            Ok(Err(e)) => {
                warn!("Failed to wait for shell: {}", e);
                -1
            }
            Err(_) => {
                warn!("Shell did not exit in time, killing it");
                let _ = self.child.kill().await;
                -1
            }
        };

        self.exited = Some(code);
        debug!("Shell session closed with code {}", code);
        code
    }

    async fn write(&mut self, script: &str) -> Result<(), BuildError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| BuildError::Environment("shell session is closed".to_string()))?;

        stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|e| BuildError::Environment(format!("failed to write to shell: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| BuildError::Environment(format!("failed to write to shell: {}", e)))
    }

    async fn read_line(&mut self) -> Result<Option<String>, BuildError> {
        let mut buf = Vec::new();
        let n = self
            .stdout
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| BuildError::Environment(format!("failed to read shell output: {}", e)))?;

        if n == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    async fn reap(&mut self) -> i32 {
        self.stdin = None;
        match self.child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(_) => -1,
        }
    }

    fn parse_marker(&self, line: &str) -> Option<i32> {
        line.strip_prefix(self.marker.as_str())?
            .strip_prefix(':')?
            .parse()
            .ok()
    }
}

/// POSIX shell variable name
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Single-quotes a value for the shell
pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

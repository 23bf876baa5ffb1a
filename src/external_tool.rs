//! Running `keytool` and `openssl` as child processes.
//!
//! The keystore pipeline only sees the [`ToolInvoker`] trait, so tests can
//! substitute a recorder and never need a JDK on the machine.

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn succeeded() -> Self {
        Self {
            status: Some(0),
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` did not finish within {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Runs one external program to completion.
///
/// `secrets` are set as environment variables of the child only, so they
/// never show up in the process list. Implementations must be shareable
/// across the threads that provision roles in parallel.
pub trait ToolInvoker: Sync {
    fn invoke(
        &self,
        program: &str,
        args: &[String],
        secrets: &[(&str, &SecretString)],
    ) -> Result<ToolOutput, InvokeError>;
}

/// [`ToolInvoker`] backed by real child processes with a wall-clock limit.
#[derive(Debug, Clone)]
pub struct SystemToolInvoker {
    timeout: Duration,
}

impl SystemToolInvoker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ToolInvoker for SystemToolInvoker {
    fn invoke(
        &self,
        program: &str,
        args: &[String],
        secrets: &[(&str, &SecretString)],
    ) -> Result<ToolOutput, InvokeError> {
        let mut command = Command::new(program);
        for (name, value) in secrets {
            command.env(name, value.expose_secret());
        }
        let mut child = command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| InvokeError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Drain both pipes while waiting, a full pipe buffer would block the child.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_deadline(&mut child, program, self.timeout)?;
        Ok(ToolOutput {
            status: status.code(),
            success: status.success(),
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
        })
    }
}

fn wait_with_deadline(
    child: &mut Child,
    program: &str,
    timeout: Duration,
) -> Result<std::process::ExitStatus, InvokeError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(InvokeError::TimedOut {
                        program: program.to_string(),
                        after: timeout,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                let _ = child.kill();
                return Err(InvokeError::Wait {
                    program: program.to_string(),
                    source,
                });
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<String>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn captures_output_and_status() {
        let invoker = SystemToolInvoker::new(Duration::from_secs(10));
        let output = invoker
            .invoke("sh", &sh("echo out; echo err >&2; exit 3"), &[])
            .unwrap();
        assert_eq!(output.status, Some(3));
        assert!(!output.success);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn secrets_are_passed_in_the_child_environment() {
        let invoker = SystemToolInvoker::new(Duration::from_secs(10));
        let secret = SecretString::from("s3cret-value".to_string());
        let output = invoker
            .invoke(
                "sh",
                &sh("printf '%s' \"$TOOL_SECRET\""),
                &[("TOOL_SECRET", &secret)],
            )
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "s3cret-value");
        assert!(std::env::var_os("TOOL_SECRET").is_none());
    }

    #[test]
    fn successful_command() {
        let invoker = SystemToolInvoker::new(Duration::from_secs(10));
        let output = invoker.invoke("true", &[], &[]).unwrap();
        assert!(output.success);
        assert_eq!(output.status, Some(0));
    }

    #[test]
    fn large_output_does_not_stall_the_child() {
        let invoker = SystemToolInvoker::new(Duration::from_secs(30));
        let output = invoker
            .invoke("sh", &sh("head -c 1048576 /dev/zero | tr '\\0' a"), &[])
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.len(), 1_048_576);
    }

    #[test]
    fn slow_command_is_killed_at_the_deadline() {
        let invoker = SystemToolInvoker::new(Duration::from_millis(200));
        let started = Instant::now();
        let err = invoker.invoke("sleep", &["5".to_string()], &[]).unwrap_err();
        assert!(matches!(err, InvokeError::TimedOut { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let invoker = SystemToolInvoker::new(Duration::from_secs(1));
        let err = invoker
            .invoke("definitely-not-a-real-tool-7f3a", &[], &[])
            .unwrap_err();
        assert!(matches!(err, InvokeError::Spawn { .. }), "{err:?}");
    }
}

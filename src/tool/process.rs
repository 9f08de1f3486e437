//! Bounded subprocess execution
//!
//! Every external tool runs through `run_with_timeout`, which enforces a
//! wall-clock budget by polling the child and killing it once the budget
//! is exhausted. Output is drained on separate threads so a chatty tool
//! cannot deadlock on a full pipe.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of one subprocess invocation
#[derive(Debug)]
pub struct ProcessOutcome {
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,

    /// Captured stdout, lossily decoded
    pub stdout: String,

    /// Captured stderr, lossily decoded
    pub stderr: String,

    /// Whether the process was killed for exceeding its budget
    pub timed_out: bool,

    /// Wall-clock duration of the invocation
    pub duration: Duration,
}

impl ProcessOutcome {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Last few lines of stderr for diagnostics
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run a command to completion or kill it at the timeout
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> std::io::Result<ProcessOutcome> {
    let start = Instant::now();

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_handle = spawn_drain(child.stdout.take());
    let stderr_handle = spawn_drain(child.stderr.take());

    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= timeout {
            timed_out = true;
            // Best effort; the process may already have exited.
            let _ = child.kill();
            break child.wait()?;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = join_drain(stdout_handle);
    let stderr = join_drain(stderr_handle);

    Ok(ProcessOutcome {
        exit_code: status.code(),
        stdout,
        stderr,
        timed_out,
        duration: start.elapsed(),
    })
}

fn spawn_drain<R: Read + Send + 'static>(reader: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    reader.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_command_captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello"]);
        let outcome = run_with_timeout(cmd, Duration::from_secs(10)).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "hello");
        assert!(!outcome.timed_out);
    }

    #[test]
    fn test_failing_command_captures_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo oops >&2; exit 3"]);
        let outcome = run_with_timeout(cmd, Duration::from_secs(10)).unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr.trim(), "oops");
    }

    #[test]
    fn test_timeout_kills_process() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30"]);
        let outcome = run_with_timeout(cmd, Duration::from_millis(300)).unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success());
        assert!(outcome.duration < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_binary_is_io_error() {
        let cmd = Command::new("definitely-not-a-real-tool-9321");
        let err = run_with_timeout(cmd, Duration::from_secs(1));
        assert!(err.is_err());
    }

    #[test]
    fn test_stderr_tail() {
        let outcome = ProcessOutcome {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "a\nb\nc\nd".to_string(),
            timed_out: false,
            duration: Duration::from_millis(1),
        };
        assert_eq!(outcome.stderr_tail(2), "c\nd");
        assert_eq!(outcome.stderr_tail(10), "a\nb\nc\nd");
    }
}

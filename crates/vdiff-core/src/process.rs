//! Runs external rendering tools.
//!
//! A tool's exit status is informational only: many tools print benign warnings or exit
//! non-zero on success. Callers decide success by whether the expected output file exists and
//! decodes.

use crate::cancel::CancelToken;
use std::ffi::OsStr;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    Success,
    Failed(Option<i32>),
    SpawnFailed(String),
    TimedOut(Duration),
    Cancelled,
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessExit::Success => f.write_str("exited successfully"),
            ProcessExit::Failed(Some(code)) => write!(f, "exited with code {code}"),
            ProcessExit::Failed(None) => f.write_str("terminated by signal"),
            ProcessExit::SpawnFailed(msg) => write!(f, "failed to start: {msg}"),
            ProcessExit::TimedOut(after) => write!(f, "timed out after {} ms", after.as_millis()),
            ProcessExit::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit: ProcessExit,
    /// Captured stdout, followed by stderr when merging was requested.
    pub text: String,
}

impl ProcessOutput {
    pub fn is_success(&self) -> bool {
        self.exit == ProcessExit::Success
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions<'a> {
    pub merge_stderr: bool,
    pub timeout: Option<Duration>,
    pub cancel: Option<&'a CancelToken>,
    pub current_dir: Option<&'a Path>,
}

/// Spawns `program`, waits for it to exit and returns its captured output.
///
/// The call blocks the current worker until the child exits, the optional timeout elapses,
/// or the cancel token fires. In the latter two cases the child is killed; on unix the tool runs
/// in its own process group and the whole group is killed, so helpers it started (browsers,
/// JVMs) release the output pipes too. Output of a killed tool is discarded. A helper that
/// leaves the group (e.g. via `setsid`) and keeps a pipe open pins its reader thread until it
/// exits.
pub fn run<S: AsRef<OsStr>>(program: &str, args: &[S], options: &RunOptions<'_>) -> ProcessOutput {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(if options.merge_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        });
    if let Some(dir) = options.current_dir {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    tracing::debug!(program, "spawning external tool");

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::debug!(program, error = %err, "failed to spawn external tool");
            return ProcessOutput {
                exit: ProcessExit::SpawnFailed(err.to_string()),
                text: String::new(),
            };
        }
    };

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let exit = wait(&mut child, options);
    if matches!(exit, ProcessExit::TimedOut(_) | ProcessExit::Cancelled) {
        // Readers finish on their own once the killed group closes the pipes.
        return ProcessOutput {
            exit,
            text: String::new(),
        };
    }

    let mut text = stdout.map(join_reader).unwrap_or_default();
    if let Some(err_text) = stderr.map(join_reader) {
        if !err_text.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&err_text);
        }
    }

    ProcessOutput {
        exit,
        text: text.trim().to_string(),
    }
}

fn wait(child: &mut Child, options: &RunOptions<'_>) -> ProcessExit {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return ProcessExit::Success,
            Ok(Some(status)) => return ProcessExit::Failed(status.code()),
            Ok(None) => {}
            Err(err) => return ProcessExit::SpawnFailed(err.to_string()),
        }

        if options.cancel.is_some_and(|c| c.is_cancelled()) {
            kill(child);
            return ProcessExit::Cancelled;
        }
        if let Some(timeout) = options.timeout {
            if started.elapsed() >= timeout {
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "killing timed out tool");
                kill(child);
                return ProcessExit::TimedOut(timeout);
            }
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child) {
    #[cfg(unix)]
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

/// Kills the process group led by `pid` (see `process_group(0)` in [`run`]).
#[cfg(unix)]
fn kill_group(pid: u32) {
    let status = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !status.is_ok_and(|s| s.success()) {
        tracing::debug!(pid, "failed to kill process group");
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cancel::Generation;

    #[test]
    fn captures_stdout_and_merged_stderr() {
        let out = run(
            "sh",
            &["-c", "echo out; echo err 1>&2"],
            &RunOptions {
                merge_stderr: true,
                ..Default::default()
            },
        );
        assert!(out.is_success());
        assert_eq!(out.text, "out\nerr");
    }

    #[test]
    fn stderr_is_dropped_unless_merged() {
        let out = run("sh", &["-c", "echo out; echo err 1>&2"], &RunOptions::default());
        assert_eq!(out.text, "out");
    }

    #[test]
    fn non_zero_exit_is_not_fatal() {
        let out = run("sh", &["-c", "echo warn; exit 3"], &RunOptions::default());
        assert_eq!(out.exit, ProcessExit::Failed(Some(3)));
        assert_eq!(out.text, "warn");
    }

    #[test]
    fn missing_executable_is_reported_as_spawn_failure() {
        let out = run::<&str>("/nonexistent/vdiff-tool", &[], &RunOptions::default());
        assert!(matches!(out.exit, ProcessExit::SpawnFailed(_)));
    }

    #[test]
    fn timeout_kills_the_child() {
        let started = Instant::now();
        let out = run(
            "sh",
            &["-c", "exec sleep 5"],
            &RunOptions {
                timeout: Some(Duration::from_millis(100)),
                ..Default::default()
            },
        );
        assert_eq!(out.exit, ProcessExit::TimedOut(Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn timeout_kills_helpers_holding_the_pipes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let marker = tmp.path().join("survived");
        let script = format!("(sleep 1; touch '{}') & exec sleep 5", marker.display());

        let started = Instant::now();
        let out = run(
            "sh",
            &["-c", script.as_str()],
            &RunOptions {
                timeout: Some(Duration::from_millis(100)),
                ..Default::default()
            },
        );
        assert_eq!(out.exit, ProcessExit::TimedOut(Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(1));

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "background helper outlived the timeout");
    }

    #[test]
    fn cancelled_token_kills_the_child() {
        let generation = Generation::new();
        let token = generation.advance();
        generation.advance();
        let out = run(
            "sh",
            &["-c", "exec sleep 5"],
            &RunOptions {
                cancel: Some(&token),
                ..Default::default()
            },
        );
        assert_eq!(out.exit, ProcessExit::Cancelled);
    }
}

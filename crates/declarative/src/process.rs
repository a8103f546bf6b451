//! External command execution
//!
//! Hooks and package managers both go through [`CommandRunner`], so a run
//! can substitute a scripted runner in tests and every command honors the
//! same deadline and cancellation rules.

use crate::context::CancelToken;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Interval between liveness checks of a running child
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// A command line interpreted by the platform shell
    pub fn shell(command: &str) -> Self {
        if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(command)
        } else {
            Self::new("sh").arg("-c").arg(command)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout and stderr joined, for error classification
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Why a command did not produce output
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to execute `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {}", crate::error::format_duration(*timeout))]
    Timeout { program: String, timeout: Duration },

    #[error("`{program}` was cancelled")]
    Cancelled { program: String },

    #[error("failed waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Executes commands on behalf of providers and hooks
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, its deadline, or cancellation.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`CommandOutput::code`].
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput, ExecError>;

    /// Resolve a program on `PATH`
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput, ExecError> {
        log::debug!("exec: {spec}");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let deadline = spec.timeout.map(|t| Instant::now() + t);

        let code = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status.code(),
                Ok(None) => {}
                Err(source) => {
                    terminate(&mut child);
                    return Err(ExecError::Wait {
                        program: spec.program.clone(),
                        source,
                    });
                }
            }
            if let Some(err) = interrupted(spec, deadline, cancel) {
                terminate(&mut child);
                return Err(err);
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Background processes left in the group can hold the pipes open
        // after the leader exits.
        while !finished(stdout.as_ref()) || !finished(stderr.as_ref()) {
            if let Some(err) = interrupted(spec, deadline, cancel) {
                terminate(&mut child);
                return Err(err);
            }
            thread::sleep(POLL_INTERVAL);
        }

        let output = CommandOutput {
            code,
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        log::trace!("exit {:?}: {spec}", output.code);
        Ok(output)
    }
}

/// Runner that answers from a fixed script instead of spawning processes
///
/// Responses are matched on the full command line. When several responses
/// share a command line they are consumed in order, and the last one keeps
/// answering.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<(String, CommandOutput)>>,
    programs: BTreeSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `program` resolvable through [`CommandRunner::locate`]
    pub fn with_program(mut self, program: &str) -> Self {
        self.programs.insert(program.to_string());
        self
    }

    /// Answer `command_line` with the given exit code and output
    pub fn on(self, command_line: &str, code: i32, stdout: &str, stderr: &str) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push((
                command_line.to_string(),
                CommandOutput {
                    code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
            ));
        }
        self
    }

    /// Command lines run so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput, ExecError> {
        let line = spec.to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled {
                program: spec.program.clone(),
            });
        }
        let mut responses = self.responses.lock().map_err(|_| ExecError::Spawn {
            program: spec.program.clone(),
            source: std::io::Error::other("scripted runner poisoned"),
        })?;
        let matches: Vec<usize> = responses
            .iter()
            .enumerate()
            .filter(|(_, (cmd, _))| *cmd == line)
            .map(|(i, _)| i)
            .collect();
        match matches.as_slice() {
            [] => Err(ExecError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted response for `{line}`"),
                ),
            }),
            [only] => Ok(responses[*only].1.clone()),
            [first, ..] => Ok(responses.remove(*first).1),
        }
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.programs
            .contains(program)
            .then(|| PathBuf::from("/scripted/bin").join(program))
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        // A read error just truncates the captured output.
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn finished(handle: Option<&JoinHandle<Vec<u8>>>) -> bool {
    handle.is_none_or(JoinHandle::is_finished)
}

/// The error to stop with once the deadline passes or the run is cancelled
fn interrupted(
    spec: &CommandSpec,
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> Option<ExecError> {
    if cancel.is_cancelled() {
        return Some(ExecError::Cancelled {
            program: spec.program.clone(),
        });
    }
    match (deadline, spec.timeout) {
        (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
            Some(ExecError::Timeout {
                program: spec.program.clone(),
                timeout,
            })
        }
        _ => None,
    }
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Kill the child and everything it spawned, then reap it.
///
/// Reader threads are left detached; they finish once the killed group's
/// pipes close.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal; the group id is the child's
            // pid because it was spawned with process_group(0).
            unsafe {
                libc::killpg(pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output_and_exit_code() {
        let spec = CommandSpec::shell("echo out; echo err >&2; exit 3");
        let output = SystemRunner.run(&spec, &CancelToken::new()).unwrap();
        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[test]
    fn test_env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::shell("echo \"$PHASE\"; pwd")
            .env("PHASE", "pre_apply")
            .cwd(dir.path());
        let output = SystemRunner.run(&spec, &CancelToken::new()).unwrap();
        let mut lines = output.stdout.lines();
        assert_eq!(lines.next(), Some("pre_apply"));
        let cwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(
            cwd.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_timeout_kills_the_command() {
        let spec = CommandSpec::shell("sleep 5").timeout(Duration::from_millis(300));
        let start = Instant::now();
        let err = SystemRunner.run(&spec, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_timeout_covers_background_children_holding_pipes() {
        let spec = CommandSpec::shell("sleep 5 & exit 0").timeout(Duration::from_millis(500));
        let start = Instant::now();
        let err = SystemRunner.run(&spec, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }), "got {err:?}");
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_cancellation_reaches_background_children() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });
        let start = Instant::now();
        let err = SystemRunner
            .run(&CommandSpec::shell("echo started; sleep 5 & exit 0"), &cancel)
            .unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, ExecError::Cancelled { .. }));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_cancellation_kills_the_command() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });
        let start = Instant::now();
        let err = SystemRunner
            .run(&CommandSpec::shell("sleep 5"), &cancel)
            .unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, ExecError::Cancelled { .. }));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let spec = CommandSpec::new("driftless-definitely-not-a-program");
        let err = SystemRunner.run(&spec, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[test]
    fn test_display_joins_arguments() {
        let spec = CommandSpec::new("brew").args(["install", "jq"]);
        assert_eq!(spec.to_string(), "brew install jq");
    }
}

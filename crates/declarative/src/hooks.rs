//! Pre/post apply shell hooks.

use crate::context::Env;
use crate::error::{Error, Result};
use crate::process::{CommandSpec, ExecError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Timeout applied when a hook does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// When a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreApply,
    PostApply,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreApply => "pre_apply",
            Self::PostApply => "post_apply",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hook as written in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookConfig {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl HookConfig {
    /// Validate into a runnable hook
    pub fn parse(&self) -> Result<Hook> {
        if self.command.trim().is_empty() {
            return Err(Error::config("hook command must not be empty"));
        }
        let timeout = match self.timeout.as_deref() {
            Some(s) => parse_duration(s)
                .map_err(|e| Error::config(format!("hook `{}`: {e}", self.command)))?,
            None => DEFAULT_TIMEOUT,
        };
        Ok(Hook {
            command: self.command.clone(),
            timeout,
            continue_on_error: self.continue_on_error,
        })
    }
}

/// A validated hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub command: String,
    pub timeout: Duration,
    pub continue_on_error: bool,
}

impl Hook {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_TIMEOUT,
            continue_on_error: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

/// Hooks for both phases, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hooks {
    pub pre_apply: Vec<Hook>,
    pub post_apply: Vec<Hook>,
}

impl Hooks {
    pub fn for_phase(&self, phase: HookPhase) -> &[Hook] {
        match phase {
            HookPhase::PreApply => &self.pre_apply,
            HookPhase::PostApply => &self.post_apply,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pre_apply.is_empty() && self.post_apply.is_empty()
    }
}

/// Parse a timeout such as `30s`, `500ms`, `5m`, `1h` or a bare `45`
/// (seconds). Zero is rejected.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty timeout".to_string());
    }

    let (num_str, unit_ms) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1u64)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60_000)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 3_600_000)
    } else {
        (s, 1_000)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid timeout '{input}'"))?;
    if num == 0 {
        return Err(format!("timeout must be greater than zero: '{input}'"));
    }
    let ms = num
        .checked_mul(unit_ms)
        .ok_or_else(|| format!("timeout too large: '{input}'"))?;
    Ok(Duration::from_millis(ms))
}

/// Executes the hooks of one phase against an [`Env`]
pub struct HookRunner<'a> {
    env: &'a Env,
}

impl<'a> HookRunner<'a> {
    pub fn new(env: &'a Env) -> Self {
        Self { env }
    }

    /// Run hooks in order.
    ///
    /// A failing hook with `continue_on_error` is logged and skipped over;
    /// any other failure stops the phase. Cancellation always stops it.
    pub fn run_phase(&self, phase: HookPhase, hooks: &[Hook], dry_run: bool) -> Result<()> {
        for hook in hooks {
            match self.run_one(phase, hook, dry_run) {
                Ok(()) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) if hook.continue_on_error => {
                    log::warn!("{phase} hook failed, continuing: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn run_one(&self, phase: HookPhase, hook: &Hook, dry_run: bool) -> Result<()> {
        log::debug!("{phase} hook: {}", hook.command);
        let spec = CommandSpec::shell(&hook.command)
            .cwd(&self.env.config_dir)
            .env("DRIFTLESS_PHASE", phase.as_str())
            .env("DRIFTLESS_DRY_RUN", if dry_run { "true" } else { "false" })
            .timeout(hook.timeout);

        let output = match self.env.runner.run(&spec, &self.env.cancel) {
            Ok(output) => output,
            Err(ExecError::Timeout { timeout, .. }) => {
                return Err(Error::HookTimeout {
                    command: hook.command.clone(),
                    timeout,
                });
            }
            Err(ExecError::Cancelled { .. }) => return Err(Error::Cancelled),
            Err(e) => {
                return Err(Error::HookFailure {
                    command: hook.command.clone(),
                    reason: e.to_string(),
                });
            }
        };

        if !output.stdout.is_empty() {
            log::trace!("{phase} hook stdout: {}", output.stdout.trim_end());
        }
        if !output.stderr.is_empty() {
            log::trace!("{phase} hook stderr: {}", output.stderr.trim_end());
        }

        if output.success() {
            return Ok(());
        }
        let status = output
            .code
            .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));
        let stderr = output.stderr.trim();
        Err(Error::HookFailure {
            command: hook.command.clone(),
            reason: if stderr.is_empty() {
                status
            } else {
                format!("{status}: {stderr}")
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 45 ").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_duration_rejects_garbage_and_zero() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("0ms").is_err());
    }

    #[test]
    fn test_hook_config_defaults_and_validation() {
        let hook = HookConfig {
            command: "echo hi".into(),
            ..HookConfig::default()
        }
        .parse()
        .unwrap();
        assert_eq!(hook.timeout, DEFAULT_TIMEOUT);
        assert!(!hook.continue_on_error);

        let err = HookConfig {
            command: "echo hi".into(),
            timeout: Some("0s".into()),
            continue_on_error: false,
        }
        .parse()
        .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));

        assert!(HookConfig::default().parse().is_err());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::time::Instant;
        use tempfile::TempDir;

        fn env(dir: &TempDir) -> Env {
            Env::new(dir.path(), dir.path())
        }

        #[test]
        fn test_hook_timeout_fires() {
            let dir = TempDir::new().unwrap();
            let env = env(&dir);
            let hooks = [Hook::new("sleep 5").with_timeout(Duration::from_secs(1))];
            let start = Instant::now();
            let err = HookRunner::new(&env)
                .run_phase(HookPhase::PreApply, &hooks, false)
                .unwrap_err();
            let elapsed = start.elapsed();
            assert!(matches!(err, Error::HookTimeout { .. }), "got {err:?}");
            assert!(elapsed >= Duration::from_millis(900));
            assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
        }

        #[test]
        fn test_hook_timeout_fires_with_background_child() {
            let dir = TempDir::new().unwrap();
            let env = env(&dir);
            let hooks = [Hook::new("sleep 5 & exit 0").with_timeout(Duration::from_secs(1))];
            let start = Instant::now();
            let err = HookRunner::new(&env)
                .run_phase(HookPhase::PreApply, &hooks, false)
                .unwrap_err();
            let elapsed = start.elapsed();
            assert!(matches!(err, Error::HookTimeout { .. }), "got {err:?}");
            assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
        }

        #[test]
        fn test_failure_stops_phase_unless_continue_on_error() {
            let dir = TempDir::new().unwrap();
            let env = env(&dir);
            let marker = dir.path().join("ran");

            let hooks = [
                Hook::new("exit 7"),
                Hook::new(format!("touch {}", marker.display())),
            ];
            let err = HookRunner::new(&env)
                .run_phase(HookPhase::PreApply, &hooks, false)
                .unwrap_err();
            assert!(matches!(err, Error::HookFailure { .. }));
            assert!(err.to_string().contains("exit code 7"));
            assert!(!marker.exists());

            let hooks = [
                Hook::new("exit 7").continue_on_error(true),
                Hook::new(format!("touch {}", marker.display())),
            ];
            HookRunner::new(&env)
                .run_phase(HookPhase::PreApply, &hooks, false)
                .unwrap();
            assert!(marker.exists());
        }

        #[test]
        fn test_hook_sees_phase_dry_run_and_cwd() {
            let dir = TempDir::new().unwrap();
            let env = env(&dir);
            let hooks =
                [Hook::new("echo \"$DRIFTLESS_PHASE $DRIFTLESS_DRY_RUN\" > hook.out")];
            HookRunner::new(&env)
                .run_phase(HookPhase::PostApply, &hooks, true)
                .unwrap();
            let out = std::fs::read_to_string(dir.path().join("hook.out")).unwrap();
            assert_eq!(out.trim(), "post_apply true");
        }

        #[test]
        fn test_cancelled_run_ignores_continue_on_error() {
            let dir = TempDir::new().unwrap();
            let env = env(&dir);
            env.cancel.cancel();
            let hooks = [Hook::new("sleep 5").continue_on_error(true)];
            let err = HookRunner::new(&env)
                .run_phase(HookPhase::PreApply, &hooks, false)
                .unwrap_err();
            assert!(matches!(err, Error::Cancelled));
        }
    }
}

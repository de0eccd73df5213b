//! Command execution against the host system and the guest root.
//!
//! Account databases are only ever mutated through the standard tools
//! (groupadd, groupmod, useradd, usermod), either on the host or inside the
//! guest root via chroot. This module provides the builder for one-off
//! commands, the `CommandRunner` seam that lets reconciliation and import
//! sweeps run against a fake system in tests, and an explicit retry policy
//! for callers that want one. Only exit status is ever inspected; stdout is
//! never parsed as data.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Duration;
use tracing::debug;

/// Which of the two filesystems a command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// The server's own root filesystem.
    Host,
    /// The shared guest root the thin clients boot from.
    Guest,
}

impl Namespace {
    pub fn label(&self) -> &'static str {
        match self {
            Namespace::Host => "host",
            Namespace::Guest => "guest",
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for configuring command execution.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// Custom error message prefix.
    error_prefix: Option<String>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            allow_fail: false,
            error_prefix: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let prefix = self
                .error_prefix
                .unwrap_or_else(|| format!("'{}' failed", self.program));

            let stderr = result.stderr_trimmed();
            if stderr.is_empty() {
                bail!("{} (exit code {})", prefix, result.code());
            } else {
                bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr);
            }
        }

        Ok(result)
    }
}

/// A fully specified external command, addressed to a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub namespace: Namespace,
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn host<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            namespace: Namespace::Host,
            program: program.to_string(),
            args: args.into_iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    pub fn guest<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            namespace: Namespace::Guest,
            program: program.to_string(),
            args: args.into_iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    pub fn in_namespace<I, S>(namespace: Namespace, program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match namespace {
            Namespace::Host => Self::host(program, args),
            Namespace::Guest => Self::guest(program, args),
        }
    }

    /// One-line rendering for logs and error messages.
    pub fn display(&self) -> String {
        format!("[{}] {} {}", self.namespace.label(), self.program, self.args.join(" "))
    }
}

/// Exit status as seen by best-effort sweeps: only the code matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatus {
    pub code: i32,
}

impl RunStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// shadow-utils exit codes meaning the principal (or its id) already exists.
///
/// groupadd/useradd exit 9 for a duplicate name and 4 for a duplicate
/// gid/uid. Sweeps treat both as "already there", so re-running an import
/// or reconciliation over a converged system stays a no-op.
pub fn is_already_exists(code: i32) -> bool {
    code == 9 || code == 4
}

/// Seam for running account-management commands.
///
/// The production implementation shells out; tests substitute a fake that
/// edits fixture passwd/group files instead of the live system.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<RunStatus>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: &CommandSpec) -> Result<RunStatus> {
        (**self).run(spec)
    }
}

/// Runs commands on the live system; guest commands are wrapped in chroot.
pub struct SystemRunner {
    guest_root: PathBuf,
}

impl SystemRunner {
    pub fn new(guest_root: impl Into<PathBuf>) -> Self {
        Self { guest_root: guest_root.into() }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<RunStatus> {
        let result = match spec.namespace {
            Namespace::Host => Cmd::new(&spec.program).args(&spec.args).allow_fail().run()?,
            Namespace::Guest => Cmd::new("chroot")
                .arg_path(&self.guest_root)
                .arg(&spec.program)
                .args(&spec.args)
                .allow_fail()
                .run()?,
        };

        if !result.success() {
            debug!(
                command = %spec.display(),
                code = result.code(),
                stderr = result.stderr_trimmed(),
                "command exited non-zero"
            );
        }

        Ok(RunStatus { code: result.code() })
    }
}

/// Explicit retry policy for external calls.
///
/// The historical behavior was an interactive "retry?" prompt buried inside
/// the low-level runner; instead the policy is data, the outcome is
/// structured, and the caller decides whether to prompt, retry or abort.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 1, backoff: None }
    }
}

/// Result of running a command under a retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryOutcome {
    /// Status of the final attempt.
    pub status: RunStatus,
    /// How many attempts were made.
    pub attempts: u32,
}

/// Run `spec` until it succeeds or the policy is exhausted.
pub fn run_with_retry(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    policy: RetryPolicy,
) -> Result<RetryOutcome> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let status = runner.run(spec)?;
        if status.success() || attempts >= max_attempts {
            return Ok(RetryOutcome { status, attempts });
        }
        debug!(command = %spec.display(), attempt = attempts, "retrying failed command");
        if let Some(pause) = policy.backoff {
            std::thread::sleep(pause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_run_success() {
        let result = Cmd::new("echo").arg("hello").run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_failure_includes_stderr() {
        let err = Cmd::new("ls").arg("/nonexistent_path_12345").run().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("No such file") || msg.contains("cannot access"));
    }

    #[test]
    fn test_allow_fail() {
        let result = Cmd::new("false").allow_fail().run().unwrap();
        assert!(!result.success());
        assert_eq!(result.code(), 1);
    }

    #[test]
    fn test_custom_error_message() {
        let err = Cmd::new("false").error_msg("Account step failed").run().unwrap_err();
        assert!(err.to_string().contains("Account step failed"));
    }

    #[test]
    fn test_spec_display() {
        let spec = CommandSpec::guest("groupadd", ["pupil", "-g", "628"]);
        assert_eq!(spec.display(), "[guest] groupadd pupil -g 628");
    }

    #[test]
    fn test_already_exists_codes() {
        assert!(is_already_exists(9));
        assert!(is_already_exists(4));
        assert!(!is_already_exists(0));
        assert!(!is_already_exists(1));
    }

    #[test]
    fn test_system_runner_host_exit_code() {
        let runner = SystemRunner::new("/nonexistent-guest");
        let status = runner.run(&CommandSpec::host("sh", ["-c", "exit 9"])).unwrap();
        assert_eq!(status.code, 9);
        assert!(!status.success());
    }

    /// Fails a fixed number of times, then succeeds.
    struct FlakyRunner {
        failures: RefCell<u32>,
    }

    impl CommandRunner for FlakyRunner {
        fn run(&self, _spec: &CommandSpec) -> Result<RunStatus> {
            let mut left = self.failures.borrow_mut();
            if *left > 0 {
                *left -= 1;
                Ok(RunStatus { code: 1 })
            } else {
                Ok(RunStatus { code: 0 })
            }
        }
    }

    #[test]
    fn test_retry_until_success() {
        let runner = FlakyRunner { failures: RefCell::new(2) };
        let spec = CommandSpec::host("whatever", [] as [&str; 0]);
        let policy = RetryPolicy { max_attempts: 5, backoff: None };

        let outcome = run_with_retry(&runner, &spec, policy).unwrap();
        assert!(outcome.status.success());
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_retry_exhausts_attempts() {
        let runner = FlakyRunner { failures: RefCell::new(10) };
        let spec = CommandSpec::host("whatever", [] as [&str; 0]);
        let policy = RetryPolicy { max_attempts: 3, backoff: None };

        let outcome = run_with_retry(&runner, &spec, policy).unwrap();
        assert!(!outcome.status.success());
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_default_policy_is_single_attempt() {
        let runner = FlakyRunner { failures: RefCell::new(1) };
        let spec = CommandSpec::host("whatever", [] as [&str; 0]);

        let outcome = run_with_retry(&runner, &spec, RetryPolicy::default()).unwrap();
        assert!(!outcome.status.success());
        assert_eq!(outcome.attempts, 1);
    }
}

//! Preflight checks for classnet.
//!
//! Validates the external account tools and paths before any mutating
//! command. Run with `classnet preflight` to check everything is ready.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed.
    Pass,
    /// Check failed - mutating commands will fail.
    Fail,
    /// Check passed but with a warning.
    Warn,
}

impl CheckResult {
    fn pass(name: &str) -> Self {
        Self { name: name.to_string(), status: CheckStatus::Pass, details: None }
    }

    fn pass_with(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            details: Some(details.to_string()),
        }
    }

    fn fail(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            details: Some(details.to_string()),
        }
    }

    fn warn(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            details: Some(details.to_string()),
        }
    }
}

/// Results of all preflight checks.
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Returns true if all checks passed (no failures).
    pub fn all_passed(&self) -> bool {
        !self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    pub fn fail_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail).count()
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let (icon, status) = match check.status {
                CheckStatus::Pass => ("✓", "PASS"),
                CheckStatus::Fail => ("✗", "FAIL"),
                CheckStatus::Warn => ("⚠", "WARN"),
            };
            print!("  {} [{}] {}", icon, status, check.name);
            match &check.details {
                Some(details) => println!(": {}", details),
                None => println!(),
            }
        }

        println!();
        let passed = self.checks.iter().filter(|c| c.status == CheckStatus::Pass).count();
        println!("Summary: {}/{} passed", passed, self.checks.len());
        if self.fail_count() > 0 {
            println!("         {} FAILED - mutating commands will not succeed", self.fail_count());
        }
    }
}

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    // Account tools this tool shells out to, with package hints.
    let required_tools = [
        ("groupadd", "passwd/shadow-utils", "Required to create groups"),
        ("groupmod", "passwd/shadow-utils", "Required to correct group ids"),
        ("useradd", "passwd/shadow-utils", "Required to import accounts"),
        ("usermod", "passwd/shadow-utils", "Required for group memberships"),
        ("chroot", "coreutils", "Required for guest-side corrections"),
        ("tar", "tar", "Required to unpack migration archives"),
        ("cp", "coreutils", "Required to import home directories"),
    ];

    for (tool, package, purpose) in required_tools {
        checks.push(check_tool_exists(tool, package, purpose));
    }

    checks.push(check_store_writable(&config.store_file));

    if config.guest_root.join("etc").exists() {
        checks.push(CheckResult::pass_with("guest root", &config.guest_root.display().to_string()));
    } else {
        checks.push(CheckResult::warn(
            "guest root",
            &format!(
                "{} has no etc/ - guest-side reconciliation will fail until the guest image is installed",
                config.guest_root.display()
            ),
        ));
    }

    if config.skel_dir.exists() {
        checks.push(CheckResult::pass("skeleton dir"));
    } else {
        checks.push(CheckResult::warn(
            "skeleton dir",
            &format!("{} missing - home seeding will fail", config.skel_dir.display()),
        ));
    }

    PreflightReport { checks }
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str) -> CheckResult {
    match which::which(tool) {
        Ok(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        Err(_) => CheckResult::fail(
            tool,
            &format!("Not found. Install '{}' package. {}", package, purpose),
        ),
    }
}

/// Check the store file (or its parent directory) is writable.
fn check_store_writable(store_file: &Path) -> CheckResult {
    let probe_dir = match store_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };

    if store_file.exists() {
        match std::fs::OpenOptions::new().append(true).open(store_file) {
            Ok(_) => CheckResult::pass("config store writable"),
            Err(e) => CheckResult::fail(
                "config store writable",
                &format!("Cannot open {}: {}", store_file.display(), e),
            ),
        }
    } else {
        let test_file = probe_dir.join(".classnet-preflight");
        match std::fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_file);
                CheckResult::pass("config store writable")
            }
            Err(e) => CheckResult::fail(
                "config store writable",
                &format!("Cannot write under {}: {}", probe_dir.display(), e),
            ),
        }
    }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above first.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_writable_in_temp_dir() {
        let dir = TempDir::new().unwrap();
        let result = check_store_writable(&dir.path().join("classnet"));
        assert_eq!(result.status, CheckStatus::Pass);
    }

    #[test]
    fn test_missing_tool_fails() {
        let result = check_tool_exists("no-such-tool-12345", "nowhere", "Nothing");
        assert_eq!(result.status, CheckStatus::Fail);
    }

    #[test]
    fn test_report_counts_failures() {
        let report = PreflightReport {
            checks: vec![
                CheckResult::pass("a"),
                CheckResult::fail("b", "broken"),
                CheckResult::warn("c", "odd"),
            ],
        };
        assert!(!report.all_passed());
        assert_eq!(report.fail_count(), 1);
    }
}

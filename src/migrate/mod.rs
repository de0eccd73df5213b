//! Import of account state from a prior server instance.
//!
//! A migration bundle is a directory (usually unpacked from a tarball)
//! holding colon-delimited exports of the old server's account databases:
//! `passwd.mig`, `shadow.mig`, `group.mig`, `gshadow.mig`, plus an archive
//! of home directories. Import is strictly additive: records that already
//! exist on this server are never overwritten, and homes that already exist
//! are never replaced.
//!
//! Bundle completeness is the one fatal check. Applying half an identity
//! export (accounts without their groups, or accounts without password
//! hashes) leaves the system inconsistent, so a missing file aborts the
//! whole import before any mutation. Past that gate every record is
//! best-effort: a failure is logged and the rest of the bundle still lands.

pub mod records;

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::common::{chown_recursive, copy_dir_recursive, ensure_dir_exists};
use crate::config::Config;
use crate::identity::catalog;
use crate::process::{is_already_exists, CommandRunner, CommandSpec, Namespace};
use crate::report::{ApplyOutcome, Report};

pub use records::{merge_union, parse_mig_file, parse_mig_line, MigField, MigRecord};

/// Export files a bundle must carry, one per live database.
pub const BUNDLE_FILES: [&str; 4] = ["passwd.mig", "shadow.mig", "group.mig", "gshadow.mig"];

/// Archive of home directories inside the migration payload.
pub const HOME_ARCHIVE: &str = "home.tar.gz";

/// Field positions in the colon-delimited exports (name:password:id:...).
const FIELD_UID: usize = 2;
const FIELD_GID: usize = 3;
const FIELD_HASH: usize = 1;
const FIELD_GROUP_GID: usize = 2;
const FIELD_MEMBERS: usize = 3;

/// Imports a migration bundle into the live system.
pub struct Importer<'a, R: CommandRunner> {
    config: &'a Config,
    runner: &'a R,
}

impl<'a, R: CommandRunner> Importer<'a, R> {
    pub fn new(config: &'a Config, runner: &'a R) -> Self {
        Self { config, runner }
    }

    /// Import accounts, groups and memberships from a bundle directory.
    ///
    /// Order matters: groups first (useradd references a gid that must
    /// exist), then accounts, then home seeding, then memberships (which
    /// need both principals). Re-running over an already-imported bundle is
    /// a no-op.
    pub fn import_bundle(&self, bundle_dir: &Path) -> Result<Report> {
        // Completeness gate: abort before any mutation.
        for name in BUNDLE_FILES {
            let path = bundle_dir.join(name);
            if !path.exists() {
                bail!(
                    "Migration bundle is incomplete: {} is missing. \
                     Partial identity data is unsafe to apply; nothing was imported.",
                    path.display()
                );
            }
        }

        let passwd = parse_mig_file(&bundle_dir.join("passwd.mig"))?;
        let shadow = parse_mig_file(&bundle_dir.join("shadow.mig"))?;
        let groups = parse_mig_file(&bundle_dir.join("group.mig"))?;
        // Group-password placeholders ride along in every export; nothing
        // imports from them, but a bundle without the file is incomplete.
        let _gshadow = parse_mig_file(&bundle_dir.join("gshadow.mig"))?;

        let hashes: HashMap<String, String> = shadow
            .iter()
            .filter_map(|record| Some((record.key(), record.field_text(FIELD_HASH)?)))
            .collect();

        let mut report = Report::default();
        report.extend(self.create_groups(&groups)?);
        report.extend(self.create_accounts(&passwd, &hashes)?);
        report.extend(self.seed_missing_homes(&passwd));
        report.extend(self.apply_memberships(&groups)?);

        info!(
            applied = report.applied_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "migration bundle import finished"
        );
        Ok(report)
    }

    /// Create every bundle group that is not already on the host.
    fn create_groups(&self, incoming: &[MigRecord]) -> Result<Report> {
        let existing = self.live_records(&self.config.etc_group(Namespace::Host))?;
        let merged = merge_union(&existing, incoming, 0);
        let new_names: Vec<String> =
            merged[existing.len()..].iter().map(MigRecord::key).collect();

        let mut report = Report::default();
        for record in incoming {
            let name = record.key();
            if !new_names.contains(&name) {
                report.record(name, "create group", ApplyOutcome::SkippedAlreadyExists);
                continue;
            }
            let Some(gid) = record.field_text(FIELD_GROUP_GID) else {
                report.record(name, "create group", ApplyOutcome::Failed("no gid field".into()));
                continue;
            };
            let spec = CommandSpec::host("groupadd", [name.as_str(), "-g", gid.as_str()]);
            report.record(name, format!("create group with gid {}", gid), self.apply_spec(&spec));
        }
        Ok(report)
    }

    /// Create every bundle account that is not already on the host.
    fn create_accounts(
        &self,
        incoming: &[MigRecord],
        hashes: &HashMap<String, String>,
    ) -> Result<Report> {
        let existing = self.live_records(&self.config.etc_passwd(Namespace::Host))?;
        let merged = merge_union(&existing, incoming, 0);
        let new_names: Vec<String> =
            merged[existing.len()..].iter().map(MigRecord::key).collect();

        let mut report = Report::default();
        for record in incoming {
            let name = record.key();
            if !new_names.contains(&name) {
                report.record(name, "create account", ApplyOutcome::SkippedAlreadyExists);
                continue;
            }
            let (Some(uid), Some(gid)) =
                (record.field_text(FIELD_UID), record.field_text(FIELD_GID))
            else {
                report.record(name, "create account", ApplyOutcome::Failed("missing uid/gid".into()));
                continue;
            };
            let Some(hash) = hashes.get(&name) else {
                report.record(
                    name,
                    "create account",
                    ApplyOutcome::Failed("no matching password hash in shadow export".into()),
                );
                continue;
            };

            info!(user = %name, uid = %uid, gid = %gid, "creating account from migration bundle");
            let spec = CommandSpec::host(
                "useradd",
                [
                    name.as_str(),
                    "--password",
                    hash.as_str(),
                    "--uid",
                    uid.as_str(),
                    "--gid",
                    gid.as_str(),
                ],
            );
            report.record(name, format!("create account uid {} gid {}", uid, gid), self.apply_spec(&spec));
        }
        Ok(report)
    }

    /// Seed a skeleton home for every bundle account that has none.
    ///
    /// Applies to pre-existing accounts too: an account that came over in a
    /// previous partial import may still be missing its home.
    fn seed_missing_homes(&self, accounts: &[MigRecord]) -> Report {
        let mut report = Report::default();

        for record in accounts {
            let name = record.key();
            if name.is_empty() {
                continue;
            }
            let home = self.config.home_of(&name);
            if home.exists() {
                continue;
            }
            let (Some(uid), Some(gid)) = (
                record.field_text(FIELD_UID).and_then(|v| v.parse::<u32>().ok()),
                record.field_text(FIELD_GID).and_then(|v| v.parse::<u32>().ok()),
            ) else {
                report.record(name, "seed home directory", ApplyOutcome::Failed("unparseable uid/gid".into()));
                continue;
            };

            warn!(user = %name, home = %home.display(), "account has no home directory, seeding from skeleton");
            let outcome = match self.seed_home(&home, uid, gid) {
                Ok(()) => ApplyOutcome::Applied,
                Err(err) => ApplyOutcome::Failed(err.to_string()),
            };
            report.record(name, "seed home directory from skeleton", outcome);
        }

        report
    }

    fn seed_home(&self, home: &Path, uid: u32, gid: u32) -> Result<()> {
        copy_dir_recursive(&self.config.skel_dir, home)?;
        chown_recursive(home, uid, gid)
    }

    /// Add each listed member to its group, skipping memberships already
    /// present on the host.
    fn apply_memberships(&self, groups: &[MigRecord]) -> Result<Report> {
        let live_groups = catalog::load_group_records(&self.config.etc_group(Namespace::Host))?;
        let mut report = Report::default();

        for record in groups {
            let group = record.key();
            for member in record.field_names(FIELD_MEMBERS) {
                let already = live_groups
                    .iter()
                    .find(|g| g.name == group)
                    .is_some_and(|g| g.members.iter().any(|m| *m == member));
                if already {
                    report.record(
                        member,
                        format!("add to group {}", group),
                        ApplyOutcome::SkippedAlreadyExists,
                    );
                    continue;
                }
                let spec = CommandSpec::host("usermod", ["-a", "-G", group.as_str(), member.as_str()]);
                report.record(member, format!("add to group {}", group), self.apply_spec(&spec));
            }
        }
        Ok(report)
    }

    /// Unpack a migration archive and verify its payload.
    ///
    /// Returns the directory holding the export files. The inner home
    /// archive is extracted as a side effect.
    pub fn unpack_migration_archive(&self, archive: &Path) -> Result<PathBuf> {
        if !archive.is_file() {
            bail!("Migration archive not found at {}", archive.display());
        }

        let unpack = &self.config.unpack_dir;
        if unpack.exists() {
            fs::remove_dir_all(unpack)
                .with_context(|| format!("Failed to clear unpack directory {}", unpack.display()))?;
        }
        ensure_dir_exists(unpack)?;

        println!("Extracting main migration archive.");
        self.extract_tarball(archive, unpack)?;

        let move_dir = unpack.join("root/move");
        verify_unpacked_payload(&move_dir)?;

        println!("Extracting home folder archive.");
        self.extract_tarball(&move_dir.join(HOME_ARCHIVE), unpack)?;

        Ok(move_dir)
    }

    fn extract_tarball(&self, archive: &Path, dest: &Path) -> Result<()> {
        let archive_arg = archive.to_string_lossy().into_owned();
        let dest_arg = dest.to_string_lossy().into_owned();
        let spec = CommandSpec::host(
            "tar",
            ["-zxf", archive_arg.as_str(), "-C", dest_arg.as_str()],
        );
        let status = self.runner.run(&spec)?;
        if !status.success() {
            bail!("Failed to extract {} (exit code {})", archive.display(), status.code);
        }
        Ok(())
    }

    /// Copy unpacked home directories into the live home root.
    ///
    /// Homes that already exist are left untouched and reported as skipped.
    /// The copy preserves the owners and permissions recorded in the
    /// archive, so it goes through `cp -r -p` rather than a rewrite.
    pub fn import_home_directories(&self, unpacked_home: &Path) -> Result<Report> {
        let mut report = Report::default();
        let mut ignored = Vec::new();

        let entries = fs::read_dir(unpacked_home)
            .with_context(|| format!("Failed to read unpacked homes at {}", unpacked_home.display()))?;

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let target = self.config.home_of(&name);

            if target.exists() {
                ignored.push(name.clone());
                report.record(name, "import home directory", ApplyOutcome::SkippedAlreadyExists);
                continue;
            }

            // Stale audio daemon state breaks first login after import.
            let _ = fs::remove_dir_all(entry.path().join(".pulse"));

            println!("Importing {} home folder.", name);
            let source_arg = entry.path().to_string_lossy().into_owned();
            let target_arg = target.to_string_lossy().into_owned();
            let spec = CommandSpec::host(
                "cp",
                ["-r", "-p", source_arg.as_str(), target_arg.as_str()],
            );
            report.record(name, "import home directory", self.apply_spec(&spec));
        }

        if !ignored.is_empty() {
            println!(
                "Home folders import complete. Ignored as already existing - {}",
                ignored.join(", ")
            );
        }
        Ok(report)
    }

    /// End-to-end import: unpack the archive, bring homes over, then
    /// recreate groups, accounts and memberships.
    pub fn import_migration(&self, archive: &Path) -> Result<Report> {
        let move_dir = self.unpack_migration_archive(archive)?;

        let mut report = self.import_home_directories(&self.config.unpack_dir.join("home"))?;
        report.extend(self.import_bundle(&move_dir)?);
        Ok(report)
    }

    /// Live database file parsed into migration-shaped records.
    fn live_records(&self, path: &Path) -> Result<Vec<MigRecord>> {
        Ok(crate::textfile::read_lines(path)?
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| parse_mig_line(line))
            .collect())
    }

    fn apply_spec(&self, spec: &CommandSpec) -> ApplyOutcome {
        match self.runner.run(spec) {
            Ok(status) if status.success() => ApplyOutcome::Applied,
            Ok(status) if is_already_exists(status.code) => ApplyOutcome::SkippedAlreadyExists,
            Ok(status) => {
                warn!(command = %spec.display(), code = status.code, "record import failed, continuing");
                ApplyOutcome::Failed(format!("exit code {}", status.code))
            }
            Err(err) => {
                warn!(command = %spec.display(), error = %err, "record import failed, continuing");
                ApplyOutcome::Failed(err.to_string())
            }
        }
    }
}

/// Verify an unpacked migration payload is complete.
///
/// The payload must carry the home archive and all four database exports;
/// anything less is a fatal, pre-mutation abort.
pub fn verify_unpacked_payload(move_dir: &Path) -> Result<()> {
    let mut missing = Vec::new();

    if !move_dir.join(HOME_ARCHIVE).is_file() {
        missing.push(HOME_ARCHIVE);
    }
    for name in BUNDLE_FILES {
        if !move_dir.join(name).is_file() {
            missing.push(name);
        }
    }

    if !missing.is_empty() {
        bail!(
            "Key files missing from {}: {}. A migration payload must include {} and {}.",
            move_dir.display(),
            missing.join(", "),
            HOME_ARCHIVE,
            BUNDLE_FILES.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::write_file_with_dirs;
    use tempfile::TempDir;

    #[test]
    fn test_verify_payload_reports_missing_files() {
        let dir = TempDir::new().unwrap();
        let move_dir = dir.path().join("root/move");
        write_file_with_dirs(move_dir.join("passwd.mig"), "alice:x:2001:2122::/home/alice:/bin/bash\n").unwrap();
        write_file_with_dirs(move_dir.join(HOME_ARCHIVE), "stub").unwrap();

        let err = verify_unpacked_payload(&move_dir).unwrap_err().to_string();
        assert!(err.contains("shadow.mig"));
        assert!(err.contains("group.mig"));
        assert!(err.contains("gshadow.mig"));
        assert!(!err.contains("passwd.mig,"));
    }

    #[test]
    fn test_verify_payload_complete() {
        let dir = TempDir::new().unwrap();
        let move_dir = dir.path().join("root/move");
        write_file_with_dirs(move_dir.join(HOME_ARCHIVE), "stub").unwrap();
        for name in BUNDLE_FILES {
            write_file_with_dirs(move_dir.join(name), "x\n").unwrap();
        }

        assert!(verify_unpacked_payload(&move_dir).is_ok());
    }
}

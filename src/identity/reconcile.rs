//! Corrective reconciliation of groups and memberships.
//!
//! The server and the guest image must agree on a set of required groups,
//! some with reserved gids so file ownership survives between the two
//! namespaces. Reconciliation compares the required table against each
//! namespace's group database and corrects drift: missing groups are
//! created, pinned gids that diverged are rewritten. Divergence is never
//! silently adopted.
//!
//! Every correction is independent. A failing account-tool call is logged
//! and the sweep moves on; the pass as a whole only errors on I/O problems
//! reading local state.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::identity::catalog;
use crate::process::{is_already_exists, CommandRunner, CommandSpec, Namespace};
use crate::report::{ApplyOutcome, Report};
use crate::store::ConfigStore;

/// A group every classroom server must carry.
///
/// Unrestricted groups are joined by every ordinary user; restricted ones
/// (staff-only) are only ever granted through the explicit single-user
/// path. A pinned gid is reserved and enforced in both namespaces.
#[derive(Debug, Clone, Copy)]
pub struct RequiredGroup {
    pub name: &'static str,
    pub gid: Option<u32>,
    pub restricted: bool,
}

/// The required-group table.
///
/// Hardware-access groups carry reserved gids so that ownership on the
/// shared guest image matches the server. Stock distro groups are joined
/// by name only.
pub const REQUIRED_GROUPS: &[RequiredGroup] = &[
    RequiredGroup { name: "adm", gid: None, restricted: false },
    RequiredGroup { name: "dialout", gid: None, restricted: false },
    RequiredGroup { name: "cdrom", gid: None, restricted: false },
    RequiredGroup { name: "audio", gid: None, restricted: false },
    RequiredGroup { name: "users", gid: None, restricted: false },
    RequiredGroup { name: "sudo", gid: None, restricted: false },
    RequiredGroup { name: "video", gid: None, restricted: false },
    RequiredGroup { name: "games", gid: None, restricted: false },
    RequiredGroup { name: "plugdev", gid: None, restricted: false },
    RequiredGroup { name: "input", gid: None, restricted: false },
    RequiredGroup { name: "netdev", gid: None, restricted: false },
    RequiredGroup { name: "gpio", gid: Some(625), restricted: false },
    RequiredGroup { name: "spi", gid: Some(626), restricted: false },
    RequiredGroup { name: "i2c", gid: Some(627), restricted: false },
    RequiredGroup { name: "pupil", gid: Some(628), restricted: false },
    RequiredGroup { name: "teacher", gid: Some(629), restricted: true },
];

/// Groups required in a namespace.
///
/// The host carries the whole table. The guest image only needs the groups
/// with reserved gids; its stock groups come from the distro and are left
/// alone.
pub fn required_for(namespace: Namespace) -> Vec<&'static RequiredGroup> {
    REQUIRED_GROUPS
        .iter()
        .filter(|group| namespace == Namespace::Host || group.gid.is_some())
        .collect()
}

/// Names of the groups every ordinary user is added to.
pub fn unrestricted_names() -> Vec<&'static str> {
    REQUIRED_GROUPS
        .iter()
        .filter(|group| !group.restricted)
        .map(|group| group.name)
        .collect()
}

/// One planned correction to a namespace's group database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChange {
    Create { name: String, gid: Option<u32> },
    SetGid { name: String, current: u32, required: u32 },
}

impl GroupChange {
    pub fn name(&self) -> &str {
        match self {
            GroupChange::Create { name, .. } => name,
            GroupChange::SetGid { name, .. } => name,
        }
    }

    /// True when the change rewrites an existing record rather than adding.
    pub fn is_destructive(&self) -> bool {
        matches!(self, GroupChange::SetGid { .. })
    }

    fn describe(&self) -> String {
        match self {
            GroupChange::Create { gid: Some(gid), .. } => format!("create with gid {}", gid),
            GroupChange::Create { gid: None, .. } => "create".to_string(),
            GroupChange::SetGid { current, required, .. } => {
                format!("change gid {} -> {}", current, required)
            }
        }
    }
}

/// Compares required identity state against a namespace and corrects it.
pub struct Reconciler<'a, R: CommandRunner> {
    config: &'a Config,
    runner: &'a R,
    store: ConfigStore,
}

impl<'a, R: CommandRunner> Reconciler<'a, R> {
    pub fn new(config: &'a Config, runner: &'a R) -> Self {
        let store = ConfigStore::new(&config.store_file);
        Self { config, runner, store }
    }

    /// Compute the corrections a namespace needs, without applying any.
    pub fn plan_groups(&self, namespace: Namespace) -> Result<Vec<GroupChange>> {
        let current = catalog::load_groups(&self.config.etc_group(namespace))?;
        let mut changes = Vec::new();

        for required in required_for(namespace) {
            match current.get(required.name) {
                None => changes.push(GroupChange::Create {
                    name: required.name.to_string(),
                    gid: required.gid,
                }),
                Some(&current_gid) => {
                    if let Some(required_gid) = required.gid {
                        if current_gid != required_gid {
                            changes.push(GroupChange::SetGid {
                                name: required.name.to_string(),
                                current: current_gid,
                                required: required_gid,
                            });
                        }
                    }
                }
            }
        }

        Ok(changes)
    }

    /// Apply planned corrections to a namespace.
    ///
    /// Any applied change on the guest marks the image-rebuild flag, since
    /// the exported image no longer matches the guest root.
    pub fn apply_group_changes(
        &self,
        namespace: Namespace,
        changes: &[GroupChange],
    ) -> Result<Report> {
        let mut report = Report::default();

        for change in changes {
            let spec = match change {
                GroupChange::Create { name, gid } => {
                    info!(group = %name, namespace = namespace.label(), "creating required group");
                    let mut args = vec![name.clone()];
                    if let Some(gid) = gid {
                        args.push("-g".to_string());
                        args.push(gid.to_string());
                    }
                    CommandSpec::in_namespace(namespace, "groupadd", args)
                }
                GroupChange::SetGid { name, current, required } => {
                    warn!(
                        group = %name,
                        namespace = namespace.label(),
                        current = *current,
                        required = *required,
                        "group has a gid mismatch, correcting"
                    );
                    let gid = required.to_string();
                    CommandSpec::in_namespace(
                        namespace,
                        "groupmod",
                        [name.as_str(), "-g", gid.as_str()],
                    )
                }
            };

            let outcome = self.apply_spec(&spec);
            report.record(change.name(), change.describe(), outcome);
        }

        if namespace == Namespace::Guest && report.applied_count() > 0 {
            self.store.mark_image_rebuild_needed()?;
        }

        Ok(report)
    }

    /// Plan and apply in one pass.
    pub fn reconcile_groups(&self, namespace: Namespace) -> Result<Report> {
        let changes = self.plan_groups(namespace)?;
        self.apply_group_changes(namespace, &changes)
    }

    /// Add `username` to every unrestricted required group it is missing.
    ///
    /// Restricted groups are never added here; they require the explicit
    /// [`Reconciler::add_user_to_group`] call.
    pub fn reconcile_user_memberships(&self, username: &str) -> Result<Report> {
        let groups = catalog::load_group_records(&self.config.etc_group(Namespace::Host))?;
        let users = catalog::load_users(&self.config.etc_passwd(Namespace::Host))?;
        let current = catalog::groups_of_user(&groups, &users, username);

        let mut report = Report::default();
        for group in unrestricted_names() {
            if current.iter().any(|name| name == group) {
                continue;
            }
            info!(user = username, group, "adding user to missing group");
            let outcome = self.add_membership(username, group);
            report.record(username, format!("add to group {}", group), outcome);
        }

        Ok(report)
    }

    /// Sweep every ordinary account on the host.
    pub fn reconcile_all_users(&self) -> Result<Report> {
        let mut report = Report::default();
        for user in catalog::non_system_users(&self.config.etc_passwd(Namespace::Host))? {
            report.extend(self.reconcile_user_memberships(&user.name)?);
        }
        Ok(report)
    }

    /// Explicitly add one user to one group, restricted groups included.
    pub fn add_user_to_group(&self, username: &str, group: &str) -> Result<ApplyOutcome> {
        info!(user = username, group, "adding user to group");
        Ok(self.add_membership(username, group))
    }

    fn add_membership(&self, username: &str, group: &str) -> ApplyOutcome {
        let spec = CommandSpec::host("usermod", ["-a", "-G", group, username]);
        self.apply_spec(&spec)
    }

    /// Run one corrective command, mapping its exit status to an outcome.
    fn apply_spec(&self, spec: &CommandSpec) -> ApplyOutcome {
        match self.runner.run(spec) {
            Ok(status) if status.success() => ApplyOutcome::Applied,
            Ok(status) if is_already_exists(status.code) => ApplyOutcome::SkippedAlreadyExists,
            Ok(status) => {
                warn!(command = %spec.display(), code = status.code, "correction failed, continuing");
                ApplyOutcome::Failed(format!("exit code {}", status.code))
            }
            Err(err) => {
                warn!(command = %spec.display(), error = %err, "correction failed, continuing");
                ApplyOutcome::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_table_has_reserved_gids() {
        let pinned: Vec<_> = REQUIRED_GROUPS.iter().filter(|g| g.gid.is_some()).collect();
        assert_eq!(pinned.len(), 5);
        assert!(pinned.iter().any(|g| g.name == "gpio" && g.gid == Some(625)));
        assert!(pinned.iter().any(|g| g.name == "teacher" && g.gid == Some(629)));
    }

    #[test]
    fn test_guest_only_requires_pinned_groups() {
        let guest = required_for(Namespace::Guest);
        assert!(guest.iter().all(|g| g.gid.is_some()));
        assert!(guest.len() < required_for(Namespace::Host).len());
    }

    #[test]
    fn test_unrestricted_names_exclude_staff_group() {
        let names = unrestricted_names();
        assert!(names.contains(&"pupil"));
        assert!(!names.contains(&"teacher"));
    }

    #[test]
    fn test_setgid_is_destructive_create_is_not() {
        let create = GroupChange::Create { name: "gpio".to_string(), gid: Some(625) };
        let modify = GroupChange::SetGid { name: "gpio".to_string(), current: 900, required: 625 };
        assert!(!create.is_destructive());
        assert!(modify.is_destructive());
    }
}

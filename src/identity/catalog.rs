//! Parsing of POSIX account and group databases.
//!
//! Both namespaces keep standard colon-delimited records
//! (`name:password:id:...`), read and written in that exact field order so
//! the standard shadow-utils tools stay interoperable. Parsing is
//! tolerant: short or malformed lines are skipped rather than fatal, since
//! a live /etc/group can legitimately carry entries this tool never wrote.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

use crate::textfile;

/// Non-system accounts occupy this uid range on the server.
pub const FIRST_USER_UID: u32 = 1000;
pub const NOBODY_UID: u32 = 65534;

/// One record from a group database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

/// One record from an account database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Parse a group file into name -> gid.
pub fn load_groups(path: &Path) -> Result<BTreeMap<String, u32>> {
    Ok(load_group_records(path)?
        .into_iter()
        .map(|record| (record.name, record.gid))
        .collect())
}

/// Parse a group file into full records, member lists included.
pub fn load_group_records(path: &Path) -> Result<Vec<GroupRecord>> {
    let mut records = Vec::new();

    for line in textfile::read_lines(path)? {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 3 {
            continue;
        }
        let Ok(gid) = fields[2].parse::<u32>() else {
            continue;
        };
        let members = fields
            .get(3)
            .map(|list| {
                list.split(',')
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        records.push(GroupRecord { name: fields[0].to_string(), gid, members });
    }

    Ok(records)
}

/// Parse an account file into records.
pub fn load_users(path: &Path) -> Result<Vec<UserRecord>> {
    let mut records = Vec::new();

    for line in textfile::read_lines(path)? {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 4 {
            continue;
        }
        let (Ok(uid), Ok(gid)) = (fields[2].parse::<u32>(), fields[3].parse::<u32>()) else {
            continue;
        };
        records.push(UserRecord { name: fields[0].to_string(), uid, gid });
    }

    Ok(records)
}

/// Accounts in the ordinary-user uid range.
pub fn non_system_users(path: &Path) -> Result<Vec<UserRecord>> {
    Ok(load_users(path)?
        .into_iter()
        .filter(|user| (FIRST_USER_UID..NOBODY_UID).contains(&user.uid))
        .collect())
}

/// Names of all groups a user belongs to: membership lines plus the group
/// that owns the user's primary gid.
pub fn groups_of_user(
    groups: &[GroupRecord],
    users: &[UserRecord],
    username: &str,
) -> Vec<String> {
    let mut names: Vec<String> = groups
        .iter()
        .filter(|group| group.members.iter().any(|m| m == username))
        .map(|group| group.name.clone())
        .collect();

    if let Some(user) = users.iter().find(|u| u.name == username) {
        if let Some(primary) = groups.iter().find(|g| g.gid == user.gid) {
            if !names.contains(&primary.name) {
                names.push(primary.name.clone());
            }
        }
    }

    names
}

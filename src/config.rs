//! Configuration for classnet.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file. The resulting
//! `Config` is an immutable value passed into each component; there is no
//! process-wide mutable state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::Namespace;

/// Default location of the persistent KEY=VALUE store.
pub const DEFAULT_STORE_FILE: &str = "/etc/classnet";

/// Default root of the shared guest filesystem the clients boot from.
pub const DEFAULT_GUEST_ROOT: &str = "/opt/classnet/guest";

/// Paths the tool operates on.
#[derive(Debug, Clone)]
pub struct Config {
    /// Persistent KEY=VALUE store file.
    pub store_file: PathBuf,
    /// Root of the server's own filesystem (only overridden in tests).
    pub host_root: PathBuf,
    /// Root of the guest filesystem exported to the thin clients.
    pub guest_root: PathBuf,
    /// Where user home directories live.
    pub home_root: PathBuf,
    /// Skeleton directory copied for new accounts.
    pub skel_dir: PathBuf,
    /// Scratch directory for unpacking migration archives.
    pub unpack_dir: PathBuf,
}

impl Config {
    /// Load configuration from a .env file in `base_dir` and the environment.
    pub fn load(base_dir: &Path) -> Self {
        let mut env_vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.exists() {
            if let Ok(content) = fs::read_to_string(&env_path) {
                for line in content.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((key, value)) = line.split_once('=') {
                        let value = value.trim().trim_matches('"').trim_matches('\'');
                        env_vars.insert(key.trim().to_string(), value.to_string());
                    }
                }
            }
        }

        // Environment variables override the .env file
        for (key, value) in std::env::vars() {
            env_vars.insert(key, value);
        }

        let path_or = |key: &str, default: &str| -> PathBuf {
            env_vars
                .get(key)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };

        Self {
            store_file: path_or("CLASSNET_STORE", DEFAULT_STORE_FILE),
            host_root: path_or("CLASSNET_HOST_ROOT", "/"),
            guest_root: path_or("CLASSNET_GUEST_ROOT", DEFAULT_GUEST_ROOT),
            home_root: path_or("CLASSNET_HOME_ROOT", "/home"),
            skel_dir: path_or("CLASSNET_SKEL_DIR", "/etc/skel"),
            unpack_dir: path_or("CLASSNET_UNPACK_DIR", "/tmp/classnet-unpack"),
        }
    }

    /// Root directory of a namespace's filesystem.
    pub fn root_of(&self, namespace: Namespace) -> &Path {
        match namespace {
            Namespace::Host => &self.host_root,
            Namespace::Guest => &self.guest_root,
        }
    }

    /// Path of a namespace's group database.
    pub fn etc_group(&self, namespace: Namespace) -> PathBuf {
        self.root_of(namespace).join("etc/group")
    }

    /// Path of a namespace's account database.
    pub fn etc_passwd(&self, namespace: Namespace) -> PathBuf {
        self.root_of(namespace).join("etc/passwd")
    }

    /// Home directory for a username.
    pub fn home_of(&self, username: &str) -> PathBuf {
        self.home_root.join(username)
    }

    /// Print configuration for `show config`.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  CLASSNET_STORE: {}", self.store_file.display());
        println!("  CLASSNET_GUEST_ROOT: {}", self.guest_root.display());
        println!("  CLASSNET_HOME_ROOT: {}", self.home_root.display());
        println!("  CLASSNET_SKEL_DIR: {}", self.skel_dir.display());
        println!("  CLASSNET_UNPACK_DIR: {}", self.unpack_dir.display());
        if self.guest_root.join("etc").exists() {
            println!("  Guest root: FOUND");
        } else {
            println!("  Guest root: NOT FOUND (guest-side reconciliation will fail)");
        }
    }

    /// Config with every path under one temp root.
    ///
    /// Intended for unit/integration tests only.
    #[doc(hidden)]
    pub fn for_testing(root: &Path) -> Self {
        Self {
            store_file: root.join("etc/classnet"),
            host_root: root.join("host"),
            guest_root: root.join("guest"),
            home_root: root.join("home"),
            skel_dir: root.join("skel"),
            unpack_dir: root.join("unpack"),
        }
    }
}

//! Persistent KEY=VALUE configuration store.
//!
//! One designated flat file (by default `/etc/classnet`) holds operational
//! state that must survive between invocations: the selected release
//! channel, whether the guest image needs rebuilding, and so on. The format
//! is one `KEY=VALUE` pair per line with no quoting; `#` lines, blank lines
//! and lines without `=` are ignored on read.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::textfile;

/// Which line wins when a key appears more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOrder {
    /// The earliest line with the key wins.
    FirstWins,
    /// The latest line with the key wins.
    LastWins,
}

/// Config store key flagging that the exported guest image is stale.
pub const IMAGE_REBUILD_NEEDED: &str = "ImageRebuildNeeded";

/// Handle to one KEY=VALUE store file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a key. A missing file or unmatched key yields `None`.
    pub fn get(&self, key: &str, order: MatchOrder) -> Result<Option<String>> {
        let mut value = None;

        for line in textfile::read_lines(&self.path)? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((candidate, rest)) = line.split_once('=') else {
                continue;
            };
            if candidate == key {
                value = Some(rest.to_string());
                if order == MatchOrder::FirstWins {
                    break;
                }
            }
        }

        Ok(value)
    }

    /// Set `key` to `value`, leaving exactly one line for the key.
    ///
    /// The match is anchored on the `key=` line prefix. The historical
    /// implementation matched the bare key as a substring anywhere in the
    /// line, so setting `NBD` would also clobber an `NBDuse=` line; that
    /// behavior was a corruption hazard and is intentionally not kept.
    /// Pre-existing duplicate lines for the key collapse into the first
    /// occurrence; the file is appended to only when the key was absent.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let prefix = format!("{}=", key);
        let new_line = format!("{}={}", key, value);
        debug!(key, value, store = %self.path.display(), "config store set");

        let lines = textfile::read_lines(&self.path)?;
        let mut result = Vec::with_capacity(lines.len() + 1);
        let mut replaced = false;

        for line in lines {
            if line.starts_with(&prefix) {
                if !replaced {
                    result.push(new_line.clone());
                    replaced = true;
                }
            } else {
                result.push(line);
            }
        }
        if !replaced {
            result.push(new_line);
        }

        textfile::write_lines(&self.path, &result)
    }

    /// Whether the guest image has pending changes and must be re-exported.
    pub fn image_rebuild_needed(&self) -> Result<bool> {
        Ok(self.get(IMAGE_REBUILD_NEEDED, MatchOrder::LastWins)?.as_deref() == Some("true"))
    }

    /// Flag the guest image as needing a rebuild.
    pub fn mark_image_rebuild_needed(&self) -> Result<()> {
        self.set(IMAGE_REBUILD_NEEDED, "true")
    }

    /// Clear the rebuild flag, after the image has been re-exported.
    pub fn clear_image_rebuild_needed(&self) -> Result<()> {
        self.set(IMAGE_REBUILD_NEEDED, "false")
    }
}

//! Parsing and merging of migration export records.
//!
//! A migration bundle carries colon-delimited exports of a prior server's
//! account databases. Fields holding comma lists (group members) are split
//! into lists; everything else stays a scalar. Merging is strictly
//! no-clobber: existing records are never removed or rewritten.

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

use crate::textfile;

/// One field of a migration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigField {
    Value(String),
    List(Vec<String>),
}

impl MigField {
    /// Scalar rendering: lists re-join with commas.
    pub fn as_text(&self) -> String {
        match self {
            MigField::Value(value) => value.clone(),
            MigField::List(items) => items.join(","),
        }
    }
}

/// One colon-delimited record from an export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigRecord {
    pub fields: Vec<MigField>,
}

impl MigRecord {
    /// The record key, conventionally field 0 (the name).
    pub fn key(&self) -> String {
        self.key_at(0)
    }

    pub fn key_at(&self, index: usize) -> String {
        self.fields.get(index).map(MigField::as_text).unwrap_or_default()
    }

    /// Scalar view of a field, if present.
    pub fn field_text(&self, index: usize) -> Option<String> {
        self.fields.get(index).map(MigField::as_text)
    }

    /// A field as a member list: a comma list, a lone name, or empty.
    pub fn field_names(&self, index: usize) -> Vec<String> {
        match self.fields.get(index) {
            Some(MigField::List(items)) => items.iter().filter(|m| !m.is_empty()).cloned().collect(),
            Some(MigField::Value(value)) if !value.is_empty() => vec![value.clone()],
            _ => Vec::new(),
        }
    }
}

/// Parse one export line.
pub fn parse_mig_line(line: &str) -> MigRecord {
    let fields = line
        .split(':')
        .map(|field| {
            if field.contains(',') {
                MigField::List(field.split(',').map(str::to_string).collect())
            } else {
                MigField::Value(field.to_string())
            }
        })
        .collect();
    MigRecord { fields }
}

/// Parse an export file; blank lines are skipped.
pub fn parse_mig_file(path: &Path) -> Result<Vec<MigRecord>> {
    Ok(textfile::read_lines(path)?
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_mig_line(line))
        .collect())
}

/// No-clobber union of two record sets.
///
/// Returns `existing` verbatim, followed by each `incoming` record whose
/// key (field `key_index`) is not already present, in incoming order.
/// Existing records are never mutated or dropped, so the result is a
/// superset of `existing` with unique keys.
pub fn merge_union(existing: &[MigRecord], incoming: &[MigRecord], key_index: usize) -> Vec<MigRecord> {
    let mut seen: HashSet<String> = existing.iter().map(|r| r.key_at(key_index)).collect();
    let mut merged = existing.to_vec();

    for record in incoming {
        let key = record.key_at(key_index);
        if seen.insert(key) {
            merged.push(record.clone());
        }
    }

    merged
}

//! Account and group state across the host and guest namespaces.
//!
//! `catalog` parses the colon-delimited passwd/group databases; `reconcile`
//! compares them against the required state and applies corrective,
//! idempotent actions through the external account tools.

pub mod catalog;
pub mod reconcile;

pub use catalog::{GroupRecord, UserRecord};
pub use reconcile::{GroupChange, Reconciler, RequiredGroup, REQUIRED_GROUPS};

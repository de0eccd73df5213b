//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `config` - Read and write the persistent KEY=VALUE store
//! - `reconcile` - Correct group and membership drift
//! - `import` - Import a migration bundle or archive
//! - `preflight` - Run preflight checks
//! - `show` - Display information

pub mod config;
pub mod import;
pub mod preflight;
pub mod reconcile;
pub mod show;

pub use config::{cmd_config_get, cmd_config_set};
pub use import::{cmd_import_bundle, cmd_import_migration};
pub use preflight::cmd_preflight;
pub use reconcile::{cmd_reconcile_groups, cmd_reconcile_user, cmd_reconcile_users};
pub use show::cmd_show;

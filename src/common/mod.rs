//! Shared utilities across classnet modules.

pub mod files;

pub use files::{chown_recursive, copy_dir_recursive, ensure_dir_exists, write_file_with_dirs};

//! Config command - reads and writes the persistent store.

use anyhow::Result;

use crate::config::Config;
use crate::store::{ConfigStore, MatchOrder};

/// Execute `config get`.
///
/// Prints the value if the key is present; a missing key is not an error,
/// it just prints nothing and exits zero.
pub fn cmd_config_get(config: &Config, key: &str, first_match: bool) -> Result<()> {
    let store = ConfigStore::new(&config.store_file);
    let order = if first_match { MatchOrder::FirstWins } else { MatchOrder::LastWins };

    if let Some(value) = store.get(key, order)? {
        println!("{}", value);
    }
    Ok(())
}

/// Execute `config set`.
pub fn cmd_config_set(config: &Config, key: &str, value: &str) -> Result<()> {
    let store = ConfigStore::new(&config.store_file);
    store.set(key, value)
}

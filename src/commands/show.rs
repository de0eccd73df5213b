//! Show command - displays information.

use anyhow::Result;

use crate::config::Config;
use crate::identity::catalog;
use crate::identity::reconcile::required_for;
use crate::process::Namespace;
use crate::store::ConfigStore;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show required groups against both namespaces
    Groups,
}

/// Execute the show command.
pub fn cmd_show(config: &Config, target: ShowTarget) -> Result<()> {
    match target {
        ShowTarget::Config => {
            config.print();
            let store = ConfigStore::new(&config.store_file);
            if store.image_rebuild_needed()? {
                println!("  Guest image: REBUILD NEEDED");
            }
        }
        ShowTarget::Groups => {
            for namespace in [Namespace::Host, Namespace::Guest] {
                let current = catalog::load_groups(&config.etc_group(namespace))?;
                println!("{} groups:", namespace.label());
                for required in required_for(namespace) {
                    let state = match (current.get(required.name), required.gid) {
                        (None, _) => "MISSING".to_string(),
                        (Some(&gid), Some(want)) if gid != want => {
                            format!("gid {} (reserved {})", gid, want)
                        }
                        (Some(&gid), _) => format!("gid {}", gid),
                    };
                    println!("  {:10} {}", required.name, state);
                }
            }
        }
    }
    Ok(())
}

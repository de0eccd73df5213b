//! Import command - brings a prior server's accounts over.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::migrate::Importer;
use crate::process::CommandRunner;
use crate::report::Report;

/// Execute `import bundle <dir>`: the bundle is already unpacked.
pub fn cmd_import_bundle(
    config: &Config,
    runner: &dyn CommandRunner,
    bundle_dir: &Path,
    json: bool,
) -> Result<()> {
    let importer = Importer::new(config, &runner);
    let report = importer.import_bundle(bundle_dir)?;
    finish(report, json)
}

/// Execute `import migration <archive>`: unpack, homes, then accounts.
pub fn cmd_import_migration(
    config: &Config,
    runner: &dyn CommandRunner,
    archive: &Path,
    json: bool,
) -> Result<()> {
    let importer = Importer::new(config, &runner);
    let report = importer.import_migration(archive)?;
    finish(report, json)
}

fn finish(report: Report, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json());
    } else {
        report.print("Migration import");
    }
    Ok(())
}

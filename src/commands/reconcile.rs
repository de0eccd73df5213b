//! Reconcile command - corrects group and membership drift.

use anyhow::Result;

use crate::config::Config;
use crate::identity::Reconciler;
use crate::process::{CommandRunner, Namespace};
use crate::prompt::InteractionPrompt;
use crate::report::Report;

/// Execute `reconcile groups` for both namespaces.
///
/// Gid rewrites on live groups are destructive (file ownership shifts with
/// them), so they are gated behind the prompt unless `--assume-yes` was
/// passed. Declining keeps the pass to creations only.
pub fn cmd_reconcile_groups(
    config: &Config,
    runner: &dyn CommandRunner,
    prompt: &dyn InteractionPrompt,
    json: bool,
) -> Result<()> {
    let reconciler = Reconciler::new(config, &runner);
    let mut report = Report::default();

    for namespace in [Namespace::Host, Namespace::Guest] {
        let mut plan = reconciler.plan_groups(namespace)?;

        let rewrites: Vec<String> = plan
            .iter()
            .filter(|change| change.is_destructive())
            .map(|change| change.name().to_string())
            .collect();
        if !rewrites.is_empty() {
            let message = format!(
                "Groups on the {} side have mismatched ids ({}). Rewrite them to the reserved ids?",
                namespace.label(),
                rewrites.join(", ")
            );
            if !prompt.confirm(&message)? {
                println!("Skipping id rewrites on the {} side.", namespace.label());
                plan.retain(|change| !change.is_destructive());
            }
        }

        report.extend(reconciler.apply_group_changes(namespace, &plan)?);
    }

    finish(report, "Group reconciliation", json)
}

/// Execute `reconcile users`: membership sweep over every ordinary account.
pub fn cmd_reconcile_users(config: &Config, runner: &dyn CommandRunner, json: bool) -> Result<()> {
    let reconciler = Reconciler::new(config, &runner);
    let report = reconciler.reconcile_all_users()?;
    finish(report, "Membership reconciliation", json)
}

/// Execute `reconcile user <name>`.
pub fn cmd_reconcile_user(
    config: &Config,
    runner: &dyn CommandRunner,
    username: &str,
    json: bool,
) -> Result<()> {
    let reconciler = Reconciler::new(config, &runner);
    let report = reconciler.reconcile_user_memberships(username)?;
    finish(report, &format!("Membership reconciliation for {}", username), json)
}

fn finish(report: Report, title: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json());
    } else if report.actions.is_empty() {
        println!("{}: nothing to do.", title);
    } else {
        report.print(title);
    }
    Ok(())
}

pub mod audit;
pub mod expiration;
pub mod permissions;
pub mod provision;
pub mod role;
pub mod views;

use crate::output::Progress;
use anyhow::Context;
use tenantctl_core::gcp::{AccessToken, GcpClients};
use tenantctl_core::report::RunSummary;
use tenantctl_core::runner::RunEvent;

/// Mint credentials and build the client bundle. Called only after menus and
/// confirmations, so a cancelled run never touches gcloud.
pub(crate) fn connect() -> anyhow::Result<GcpClients> {
    let token = AccessToken::from_gcloud().context("acquiring credentials")?;
    Ok(GcpClients::new(&token))
}

/// Shared progress rendering for runner events.
pub(crate) fn print_event(progress: &mut Progress, event: &RunEvent) {
    match event {
        RunEvent::CompanyStarted { label, project_id } => {
            progress.rule();
            progress.line(&format!("{label} -> {project_id}"));
        }
        RunEvent::GenerationFailed { label, reason } => {
            progress.rule();
            progress.line(&format!("{label}: unprocessable: {reason}"));
        }
        RunEvent::ActionFinished {
            description,
            result,
            note,
        } => {
            let mut line = format!("  {description} … {result}");
            if let Some(note) = note {
                line.push_str(&format!(" ({note})"));
            }
            progress.line(&line);
        }
        RunEvent::RemainingDropped { dropped } => {
            progress.line(&format!(
                "  {dropped} remaining action(s) dropped after permission failure"
            ));
        }
        RunEvent::CompanyFinished { phase, .. } => {
            progress.line(&format!("  => {phase}"));
        }
        RunEvent::WriteBack {
            company_id,
            project_id,
            ok,
        } => {
            if *ok {
                progress.line(&format!(
                    "  recorded project id {project_id} for company {company_id}"
                ));
            } else {
                progress.line(&format!(
                    "  WARNING: could not record project id {project_id} for company {company_id}"
                ));
            }
        }
    }
}

/// Print the summary block. An interrupted run still prints its partial
/// tally, then exits non-zero.
pub(crate) fn finish(progress: &mut Progress, summary: &RunSummary) -> anyhow::Result<()> {
    progress.rule();
    progress.line("summary:");
    for line in summary.lines() {
        progress.line(&format!("  {line}"));
    }
    if summary.interrupted {
        anyhow::bail!("interrupted before the run finished");
    }
    Ok(())
}

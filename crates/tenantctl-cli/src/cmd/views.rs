use crate::cmd::{connect, finish, print_event};
use crate::menu;
use crate::output::Progress;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tenantctl_core::action;
use tenantctl_core::company::{Company, CompanyFilter};
use tenantctl_core::config::Config;
use tenantctl_core::executor::Mode;
use tenantctl_core::gcp::GcpClients;
use tenantctl_core::identifier;
use tenantctl_core::runner::{preflight_permissions, BatchItem, Runner};
use tenantctl_core::source::CompanyDirectory;

const APPLY_PERMISSIONS: &[&str] = &["bigquery.datasets.get", "bigquery.datasets.update"];

pub fn run(
    config: &Config,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let choice = menu::choose(
        "Authorize the consolidated view in tenant datasets",
        &[
            "List tenant datasets",
            "Dry-run: preview view authorizations",
            "Apply: authorize the view",
            "Apply: revoke the view authorization",
        ],
    )?;

    match choice {
        1 => list(config, progress),
        2 => authorize(config, progress, cancel, Mode::DryRun, false),
        3 => {
            if !menu::confirm_apply()? {
                progress.line("cancelled: no actions executed");
                return Ok(());
            }
            authorize(config, progress, cancel, Mode::Real, false)
        }
        4 => {
            if !menu::confirm("This will revoke the view's read access.", menu::CONFIRM_APPLY)? {
                progress.line("cancelled: no actions executed");
                return Ok(());
            }
            authorize(config, progress, cancel, Mode::Real, true)
        }
        _ => unreachable!("menu bounds"),
    }
}

fn list(config: &Config, progress: &mut Progress) -> anyhow::Result<()> {
    let clients = connect()?;
    let companies = provisioned(&clients, config)?;

    let mut found = 0;
    for company in &companies {
        let project_id = company.project_id.as_deref().unwrap_or_default();
        let dataset = identifier::tenant_dataset_id(project_id);
        match clients.bigquery.dataset_exists(project_id, &dataset) {
            Ok(true) => {
                found += 1;
                progress.line(&format!("{}: {project_id}:{dataset}", company.label()));
            }
            Ok(false) => progress.line(&format!(
                "{}: dataset '{dataset}' not found in {project_id}",
                company.label()
            )),
            Err(e) => progress.line(&format!("{}: check failed: {e}", company.label())),
        }
    }
    progress.rule();
    progress.line(&format!(
        "{} companies, {found} tenant datasets found",
        companies.len()
    ));
    Ok(())
}

fn authorize(
    config: &Config,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
    mode: Mode,
    revoke: bool,
) -> anyhow::Result<()> {
    let clients = connect()?;
    let companies = provisioned(&clients, config)?;
    let (items, missing) = build_items(&clients, config, &companies, progress, revoke)?;

    if items.is_empty() {
        progress.line("no tenant datasets to work on");
        return Ok(());
    }

    if !mode.is_dry_run() {
        let projects: Vec<String> = items.iter().map(|i| i.project_id.clone()).collect();
        preflight_permissions(&clients, &projects, APPLY_PERMISSIONS)?;
    }

    let runner = Runner::new(&clients, mode, cancel);
    let summary = runner.run_batch(&items, &mut |e| print_event(progress, &e));
    if missing > 0 {
        progress.line(&format!("tenant datasets missing: {missing}"));
    }
    finish(progress, &summary)
}

fn provisioned(clients: &GcpClients, config: &Config) -> anyhow::Result<Vec<Company>> {
    let directory = CompanyDirectory::new(&clients.bigquery, config.source.clone());
    Ok(directory.list(CompanyFilter::Provisioned)?)
}

/// One item per company whose tenant dataset exists; the rest are reported
/// and counted. The existence check is read-only, so dry-run may use it too.
fn build_items(
    clients: &GcpClients,
    config: &Config,
    companies: &[Company],
    progress: &mut Progress,
    revoke: bool,
) -> anyhow::Result<(Vec<BatchItem>, usize)> {
    let mut items = Vec::new();
    let mut missing = 0;

    for company in companies {
        let project_id = company.project_id.clone().unwrap_or_default();
        let dataset = identifier::tenant_dataset_id(&project_id);
        match clients.bigquery.dataset_exists(&project_id, &dataset) {
            Ok(true) => {
                let actions = if revoke {
                    action::plan_view_revocation(&project_id, config)
                } else {
                    action::plan_view_authorization(&project_id, config)
                };
                items.push(BatchItem {
                    company: company.clone(),
                    project_id,
                    actions,
                });
            }
            Ok(false) => {
                missing += 1;
                progress.line(&format!(
                    "{}: dataset '{dataset}' not found in {project_id}, skipping",
                    company.label()
                ));
            }
            Err(e) => {
                missing += 1;
                progress.line(&format!("{}: check failed: {e}", company.label()));
            }
        }
    }
    Ok((items, missing))
}

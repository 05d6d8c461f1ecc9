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

const APPLY_PERMISSIONS: &[&str] = &["bigquery.tables.get", "bigquery.tables.setIamPolicy"];

pub fn run(
    config: &Config,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let choice = menu::choose(
        "Grant analytics read access on tenant call tables",
        &[
            "List tenant call tables",
            "Dry-run: preview the grants",
            "Apply: create the analytics account and grant access",
        ],
    )?;

    match choice {
        1 => list(config, progress),
        2 => grant(config, progress, cancel, Mode::DryRun),
        3 => {
            if !menu::confirm_apply()? {
                progress.line("cancelled: no actions executed");
                return Ok(());
            }
            grant(config, progress, cancel, Mode::Real)
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
        let table = &config.analytics.call_table;
        match clients.bigquery.table_exists(project_id, &dataset, table) {
            Ok(true) => {
                found += 1;
                progress.line(&format!(
                    "{}: {project_id}:{dataset}.{table}",
                    company.label()
                ));
            }
            Ok(false) => progress.line(&format!(
                "{}: table '{table}' not found in {project_id}:{dataset}",
                company.label()
            )),
            Err(e) => progress.line(&format!("{}: check failed: {e}", company.label())),
        }
    }
    progress.rule();
    progress.line(&format!(
        "{} companies, {found} call tables found",
        companies.len()
    ));
    Ok(())
}

fn grant(
    config: &Config,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
    mode: Mode,
) -> anyhow::Result<()> {
    let clients = connect()?;
    let companies = provisioned(&clients, config)?;

    let mut items = Vec::new();
    let mut missing = 0;
    for company in &companies {
        let project_id = company.project_id.clone().unwrap_or_default();
        let dataset = identifier::tenant_dataset_id(&project_id);
        let table = &config.analytics.call_table;
        match clients.bigquery.table_exists(&project_id, &dataset, table) {
            Ok(true) => items.push(BatchItem {
                company: company.clone(),
                actions: action::plan_call_table_grant(&project_id, config),
                project_id,
            }),
            Ok(false) => {
                missing += 1;
                progress.line(&format!(
                    "{}: table '{table}' not found in {project_id}:{dataset}, skipping",
                    company.label()
                ));
            }
            Err(e) => {
                missing += 1;
                progress.line(&format!("{}: check failed: {e}", company.label()));
            }
        }
    }

    if items.is_empty() {
        progress.line("no call tables to work on");
        return Ok(());
    }

    if !mode.is_dry_run() {
        let projects: Vec<String> = items.iter().map(|i| i.project_id.clone()).collect();
        preflight_permissions(&clients, &projects, APPLY_PERMISSIONS)?;
    }

    let runner = Runner::new(&clients, mode, cancel);
    let summary = runner.run_batch(&items, &mut |e| print_event(progress, &e));
    if missing > 0 {
        progress.line(&format!("call tables missing: {missing}"));
    }
    finish(progress, &summary)
}

fn provisioned(clients: &GcpClients, config: &Config) -> anyhow::Result<Vec<Company>> {
    let directory = CompanyDirectory::new(&clients.bigquery, config.source.clone());
    Ok(directory.list(CompanyFilter::Provisioned)?)
}

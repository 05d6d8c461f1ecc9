use crate::cmd::{connect, finish, print_event};
use crate::menu;
use crate::output::Progress;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tenantctl_core::action;
use tenantctl_core::company::{Company, CompanyFilter};
use tenantctl_core::config::{Config, MS_PER_DAY};
use tenantctl_core::executor::Mode;
use tenantctl_core::gcp::GcpClients;
use tenantctl_core::runner::{preflight_permissions, BatchItem, Runner};
use tenantctl_core::source::CompanyDirectory;

const APPLY_PERMISSIONS: &[&str] = &["bigquery.datasets.get", "bigquery.datasets.update"];

pub fn run(
    config: &Config,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let choice = menu::choose(
        "Configure default table expiration on tenant datasets",
        &[
            "List datasets and their current expiration",
            "Dry-run: preview expiration changes",
            "Apply: set the expiration",
        ],
    )?;

    match choice {
        1 => list(config, progress),
        2 => {
            let days = menu::prompt_days(config.expiration.default_days)?;
            configure(config, progress, cancel, Mode::DryRun, days)
        }
        3 => {
            let days = menu::prompt_days(config.expiration.default_days)?;
            if !menu::confirm_apply()? {
                progress.line("cancelled: no actions executed");
                return Ok(());
            }
            configure(config, progress, cancel, Mode::Real, days)
        }
        _ => unreachable!("menu bounds"),
    }
}

fn list(config: &Config, progress: &mut Progress) -> anyhow::Result<()> {
    let clients = connect()?;
    let companies = provisioned(&clients, config)?;

    let mut total = 0;
    for company in &companies {
        let project_id = company.project_id.as_deref().unwrap_or_default();
        progress.rule();
        progress.line(&format!("{} ({project_id})", company.label()));
        match clients.bigquery.list_dataset_ids(project_id) {
            Ok(datasets) => {
                total += datasets.len();
                for dataset in datasets {
                    let current = clients
                        .bigquery
                        .default_table_expiration_ms(project_id, &dataset)
                        .ok()
                        .flatten();
                    match current {
                        Some(ms) => progress.line(&format!(
                            "  {dataset}: {ms} ms ({} days)",
                            ms / MS_PER_DAY
                        )),
                        None => progress.line(&format!("  {dataset}: not configured")),
                    }
                }
            }
            Err(e) => progress.line(&format!("  dataset listing failed: {e}")),
        }
    }
    progress.rule();
    progress.line(&format!(
        "{} companies, {total} datasets",
        companies.len()
    ));
    Ok(())
}

fn configure(
    config: &Config,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
    mode: Mode,
    days: u32,
) -> anyhow::Result<()> {
    let expiration_ms = i64::from(days) * MS_PER_DAY;
    progress.line(&format!(
        "target expiration: {expiration_ms} ms ({days} days)"
    ));

    let clients = connect()?;
    let companies = provisioned(&clients, config)?;

    let mut items = Vec::new();
    let mut listing_failures = 0;
    for company in &companies {
        let project_id = company.project_id.clone().unwrap_or_default();
        match clients.bigquery.list_dataset_ids(&project_id) {
            Ok(datasets) => {
                let actions: Vec<_> = datasets
                    .iter()
                    .flat_map(|d| action::plan_expiration(&project_id, d, expiration_ms))
                    .collect();
                if actions.is_empty() {
                    progress.line(&format!("{}: no datasets", company.label()));
                    continue;
                }
                items.push(BatchItem {
                    company: company.clone(),
                    project_id,
                    actions,
                });
            }
            Err(e) => {
                listing_failures += 1;
                progress.line(&format!(
                    "{}: dataset listing failed: {e}",
                    company.label()
                ));
            }
        }
    }

    if items.is_empty() {
        progress.line("no datasets to configure");
        return Ok(());
    }

    if !mode.is_dry_run() {
        let projects: Vec<String> = items.iter().map(|i| i.project_id.clone()).collect();
        preflight_permissions(&clients, &projects, APPLY_PERMISSIONS)?;
    }

    let runner = Runner::new(&clients, mode, cancel);
    let summary = runner.run_batch(&items, &mut |e| print_event(progress, &e));
    if listing_failures > 0 {
        progress.line(&format!("companies with listing failures: {listing_failures}"));
    }
    finish(progress, &summary)
}

fn provisioned(clients: &GcpClients, config: &Config) -> anyhow::Result<Vec<Company>> {
    let directory = CompanyDirectory::new(&clients.bigquery, config.source.clone());
    Ok(directory.list(CompanyFilter::Provisioned)?)
}

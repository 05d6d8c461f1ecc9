use crate::cmd::{connect, finish, print_event};
use crate::menu;
use crate::output::{print_table, Progress};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tenantctl_core::company::CompanyFilter;
use tenantctl_core::config::Config;
use tenantctl_core::executor::Mode;
use tenantctl_core::identifier;
use tenantctl_core::runner::Runner;
use tenantctl_core::source::CompanyDirectory;

pub fn run(
    config: &Config,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let choice = menu::choose(
        "Provision tenant projects",
        &[
            "List companies and derived project ids",
            "Dry-run: preview provisioning actions",
            "Apply: create projects and resources",
            "Dry-run: preview project deletion",
            "Apply: DELETE projects",
        ],
    )?;

    match choice {
        1 => list(config, progress),
        2 => provision(config, progress, cancel, Mode::DryRun),
        3 => {
            if !menu::confirm_apply()? {
                progress.line("cancelled: no actions executed");
                return Ok(());
            }
            provision(config, progress, cancel, Mode::Real)
        }
        4 => delete(config, progress, cancel, Mode::DryRun),
        5 => {
            if !menu::confirm_deletion()? {
                progress.line("cancelled: no actions executed");
                return Ok(());
            }
            delete(config, progress, cancel, Mode::Real)
        }
        _ => unreachable!("menu bounds"),
    }
}

fn list(config: &Config, progress: &mut Progress) -> anyhow::Result<()> {
    let clients = connect()?;
    let directory = CompanyDirectory::new(&clients.bigquery, config.source.clone());
    let companies = directory.list(CompanyFilter::All)?;

    let rows: Vec<Vec<String>> = companies
        .iter()
        .map(|c| {
            let derived =
                identifier::derive_project_id(&c.company_new_name, c.company_id)
                    .unwrap_or_else(|_| "(unprocessable)".to_string());
            vec![
                c.company_id.to_string(),
                c.company_name.clone(),
                c.company_new_name.clone(),
                c.project_id.clone().unwrap_or_default(),
                derived,
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "NEW NAME", "RECORDED PROJECT", "DERIVED PROJECT"], rows);
    progress.line(&format!("{} companies", companies.len()));
    Ok(())
}

fn provision(
    config: &Config,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
    mode: Mode,
) -> anyhow::Result<()> {
    let clients = connect()?;
    let directory = CompanyDirectory::new(&clients.bigquery, config.source.clone());
    let companies = directory.list(CompanyFilter::Unprovisioned)?;

    if companies.is_empty() {
        progress.line("no unprovisioned companies, nothing to do");
        return Ok(());
    }
    progress.line(&format!("{} companies to provision", companies.len()));

    let runner = Runner::new(&clients, mode, cancel);
    let summary =
        runner.run_provisioning(&companies, config, &directory, &mut |e| {
            print_event(progress, &e)
        });
    finish(progress, &summary)
}

fn delete(
    config: &Config,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
    mode: Mode,
) -> anyhow::Result<()> {
    let clients = connect()?;
    let directory = CompanyDirectory::new(&clients.bigquery, config.source.clone());
    let companies = directory.list(CompanyFilter::All)?;

    if companies.is_empty() {
        progress.line("no companies in the table, nothing to do");
        return Ok(());
    }
    progress.line(&format!("{} companies in scope for deletion", companies.len()));

    let runner = Runner::new(&clients, mode, cancel);
    let summary = runner.run_deletion(&companies, &mut |e| print_event(progress, &e));
    finish(progress, &summary)
}

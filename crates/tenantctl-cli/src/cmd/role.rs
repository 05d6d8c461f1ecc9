use crate::cmd::{connect, finish, print_event};
use crate::menu;
use crate::output::{print_json, Progress};
use clap::Subcommand;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tenantctl_core::action::{self, Action};
use tenantctl_core::company::CompanyFilter;
use tenantctl_core::config::Config;
use tenantctl_core::executor::{Executor, Mode};
use tenantctl_core::identifier;
use tenantctl_core::outcome::ExecutionResult;
use tenantctl_core::runner::{preflight_permissions, BatchItem, Runner};
use tenantctl_core::source::CompanyDirectory;

#[derive(Subcommand)]
pub enum RoleSubcommand {
    /// Create the analyst role in one project
    Create {
        #[arg(long)]
        project: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Create the analyst role in every provisioned company project
    CreateAll {
        /// Also assign the role to these users (comma-separated emails)
        #[arg(long)]
        users: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the role as stored in one project
    Describe {
        #[arg(long)]
        project: String,
    },
    /// Update the role's permission set in one project
    Update {
        #[arg(long)]
        project: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Assign the role to users in one project
    Assign {
        #[arg(long)]
        project: String,
        /// Comma-separated emails
        #[arg(long)]
        users: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// List members holding the role in one project
    ListUsers {
        #[arg(long)]
        project: String,
    },
}

pub fn run(
    config: &Config,
    subcmd: RoleSubcommand,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    match subcmd {
        RoleSubcommand::Create { project, dry_run } => {
            let actions = action::plan_role_creation(&project, config);
            run_actions(&actions, mode(dry_run), progress)
        }
        RoleSubcommand::CreateAll { users, dry_run } => {
            create_all(config, users.as_deref(), mode(dry_run), progress, cancel)
        }
        RoleSubcommand::Describe { project } => describe(config, &project),
        RoleSubcommand::Update { project, dry_run } => {
            let actions = action::plan_role_update(&project, config);
            run_actions(&actions, mode(dry_run), progress)
        }
        RoleSubcommand::Assign {
            project,
            users,
            dry_run,
        } => {
            let users = split_users(&users)?;
            let actions = action::plan_role_assignment(&project, &users, config);
            run_actions(&actions, mode(dry_run), progress)
        }
        RoleSubcommand::ListUsers { project } => list_users(config, &project, progress),
    }
}

fn mode(dry_run: bool) -> Mode {
    if dry_run {
        Mode::DryRun
    } else {
        Mode::Real
    }
}

fn split_users(users: &str) -> anyhow::Result<Vec<String>> {
    let parsed: Vec<String> = users
        .split(',')
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if parsed.is_empty() {
        anyhow::bail!("no user emails given");
    }
    Ok(parsed)
}

/// Single-project role operations run through the executor directly; any
/// failed action fails the command.
fn run_actions(actions: &[Action], mode: Mode, progress: &mut Progress) -> anyhow::Result<()> {
    let clients = connect()?;
    let executor = Executor::new(&clients, mode);

    let mut failures = Vec::new();
    for act in actions {
        let outcome = executor.run(act);
        let mut line = format!("{} … {}", act.describe(), outcome.result);
        if let Some(note) = &outcome.note {
            line.push_str(&format!(" ({note})"));
        }
        progress.line(&line);
        if let ExecutionResult::Failed(reason) = outcome.result {
            failures.push(reason);
        }
    }
    if let Some(first) = failures.into_iter().next() {
        anyhow::bail!(first);
    }
    Ok(())
}

fn create_all(
    config: &Config,
    users: Option<&str>,
    mode: Mode,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let users = match users {
        Some(list) => Some(split_users(list)?),
        None => None,
    };

    if !mode.is_dry_run() && !menu::confirm_apply()? {
        progress.line("cancelled: no actions executed");
        return Ok(());
    }

    let clients = connect()?;
    let directory = CompanyDirectory::new(&clients.bigquery, config.source.clone());
    let companies = directory.list(CompanyFilter::Provisioned)?;

    if companies.is_empty() {
        progress.line("no provisioned companies, nothing to do");
        return Ok(());
    }

    let items: Vec<BatchItem> = companies
        .iter()
        .map(|company| {
            let project_id = company.project_id.clone().unwrap_or_default();
            let mut actions = action::plan_role_creation(&project_id, config);
            if let Some(users) = &users {
                actions.extend(action::plan_role_assignment(&project_id, users, config));
            }
            BatchItem {
                company: company.clone(),
                project_id,
                actions,
            }
        })
        .collect();

    if !mode.is_dry_run() {
        let projects: Vec<String> = items.iter().map(|i| i.project_id.clone()).collect();
        preflight_permissions(&clients, &projects, &["iam.roles.create", "iam.roles.get"])?;
    }

    let runner = Runner::new(&clients, mode, cancel);
    let summary = runner.run_batch(&items, &mut |e| print_event(progress, &e));
    finish(progress, &summary)
}

fn describe(config: &Config, project: &str) -> anyhow::Result<()> {
    let clients = connect()?;
    match clients.iam.get_role(project, &config.role.id)? {
        Some(role) => print_json(&role),
        None => anyhow::bail!(
            "role {} does not exist",
            identifier::role_name(project, &config.role.id)
        ),
    }
}

fn list_users(config: &Config, project: &str, progress: &mut Progress) -> anyhow::Result<()> {
    let clients = connect()?;
    let role = identifier::role_name(project, &config.role.id);
    let members = clients.resourcemanager.members_with_role(project, &role)?;

    if members.is_empty() {
        progress.line(&format!("no members hold {role}"));
        return Ok(());
    }
    for member in &members {
        progress.line(member);
    }
    progress.line(&format!("{} member(s) hold {role}", members.len()));
    Ok(())
}

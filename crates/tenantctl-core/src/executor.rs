//! Action execution. Dry-run constructs nothing and calls nothing; real mode
//! probes first and only then issues the mutating request.

use crate::action::Action;
use crate::check::StateProbe;
use crate::error::Error;
use crate::gcp::GcpClients;
use crate::outcome::{CheckState, ExecutionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DryRun,
    Real,
}

impl Mode {
    pub fn is_dry_run(self) -> bool {
        matches!(self, Mode::DryRun)
    }
}

/// Outcome of one action attempt, with enough context for the runner to
/// decide whether the company's remaining actions are still worth trying.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub result: ExecutionResult,
    pub note: Option<String>,
    /// Permission failures poison every later action on the same company.
    pub fatal_for_item: bool,
}

impl ActionOutcome {
    fn ok(result: ExecutionResult) -> Self {
        Self {
            result,
            note: None,
            fatal_for_item: false,
        }
    }

    fn skipped(note: impl Into<String>) -> Self {
        Self {
            result: ExecutionResult::Skipped,
            note: Some(note.into()),
            fatal_for_item: false,
        }
    }
}

pub struct Executor<'a> {
    clients: &'a GcpClients,
    probe: StateProbe<'a>,
    mode: Mode,
}

impl<'a> Executor<'a> {
    pub fn new(clients: &'a GcpClients, mode: Mode) -> Self {
        Self {
            clients,
            probe: StateProbe::new(clients),
            mode,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Attempt one action. Errors never escape: they are folded into the
    /// returned outcome so one company's failure cannot abort the run.
    pub fn run(&self, action: &Action) -> ActionOutcome {
        if self.mode.is_dry_run() {
            return ActionOutcome::ok(ExecutionResult::WouldSucceed);
        }

        match self.probe.probe(action) {
            Ok(CheckState::PresentMatching) => ActionOutcome::ok(ExecutionResult::Skipped),
            Ok(CheckState::PresentConflicting) => {
                ActionOutcome::skipped("target exists in a conflicting state")
            }
            Ok(CheckState::Absent) => match self.perform(action) {
                Ok(()) => ActionOutcome::ok(ExecutionResult::Succeeded),
                Err(e) => Self::failure(e),
            },
            Err(e) => Self::failure(e),
        }
    }

    fn perform(&self, action: &Action) -> crate::error::Result<()> {
        match action {
            Action::CreateProject {
                project_id,
                display_name,
            } => self
                .clients
                .resourcemanager
                .create_project(project_id, display_name),
            Action::EnableService {
                project_id,
                service,
            } => self.clients.serviceusage.enable(project_id, service),
            Action::CreateDataset {
                project_id,
                dataset_id,
                location,
            } => self
                .clients
                .bigquery
                .create_dataset(project_id, dataset_id, location),
            Action::CreateServiceAccount {
                project_id,
                account_id,
                display_name,
            } => self
                .clients
                .iam
                .create_service_account(project_id, account_id, display_name),
            Action::BindRole {
                project_id,
                member,
                role,
            } => self
                .clients
                .resourcemanager
                .add_binding(project_id, role, member),
            Action::GrantTableRead {
                project_id,
                dataset_id,
                table_id,
                member,
            } => self
                .clients
                .bigquery
                .grant_table_read(project_id, dataset_id, table_id, member),
            Action::AuthorizeView {
                project_id,
                dataset_id,
                view,
            } => self
                .clients
                .bigquery
                .authorize_view(project_id, dataset_id, view),
            Action::RevokeViewAccess {
                project_id,
                dataset_id,
                view,
            } => self
                .clients
                .bigquery
                .revoke_view(project_id, dataset_id, view)
                .map(|_| ()),
            Action::CreateRole { project_id, role } => {
                self.clients.iam.create_role(project_id, role)
            }
            Action::UpdateRole { project_id, role } => {
                self.clients.iam.update_role(project_id, role)
            }
            Action::SetTableExpiration {
                project_id,
                dataset_id,
                expiration_ms,
            } => self.clients.bigquery.set_default_table_expiration(
                project_id,
                dataset_id,
                *expiration_ms,
            ),
            Action::DeleteProject { project_id } => {
                self.clients.resourcemanager.delete_project(project_id)
            }
        }
    }

    fn failure(e: Error) -> ActionOutcome {
        match e {
            // A 409 on the mutating call means someone satisfied the target
            // between probe and call: already-exists is a skip, not a failure.
            Error::Conflict { resource } => {
                ActionOutcome::skipped(format!("{resource} already exists"))
            }
            Error::PermissionDenied { .. } => ActionOutcome {
                result: ExecutionResult::Failed(e.to_string()),
                note: None,
                fatal_for_item: true,
            },
            other => ActionOutcome {
                result: ExecutionResult::Failed(other.to_string()),
                note: None,
                fatal_for_item: false,
            },
        }
    }
}

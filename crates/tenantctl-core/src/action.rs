use crate::company::Company;
use crate::config::Config;
use crate::error::Result;
use crate::identifier;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ViewRef
// ---------------------------------------------------------------------------

/// Exact project/dataset/table triple identifying a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl fmt::Display for ViewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

// ---------------------------------------------------------------------------
// RoleDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub role_id: String,
    pub title: String,
    pub description: String,
    pub permissions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One idempotent operation against the target system. Constructed by the
/// plan builders, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    CreateProject {
        project_id: String,
        display_name: String,
    },
    EnableService {
        project_id: String,
        service: String,
    },
    CreateDataset {
        project_id: String,
        dataset_id: String,
        location: String,
    },
    CreateServiceAccount {
        project_id: String,
        account_id: String,
        display_name: String,
    },
    /// Project-level IAM policy binding for one member+role pair.
    BindRole {
        project_id: String,
        member: String,
        role: String,
    },
    /// Table-level read grant for one member.
    GrantTableRead {
        project_id: String,
        dataset_id: String,
        table_id: String,
        member: String,
    },
    /// Dataset access entry granting a view read access to the dataset.
    AuthorizeView {
        project_id: String,
        dataset_id: String,
        view: ViewRef,
    },
    RevokeViewAccess {
        project_id: String,
        dataset_id: String,
        view: ViewRef,
    },
    CreateRole {
        project_id: String,
        role: RoleDefinition,
    },
    UpdateRole {
        project_id: String,
        role: RoleDefinition,
    },
    SetTableExpiration {
        project_id: String,
        dataset_id: String,
        expiration_ms: i64,
    },
    DeleteProject {
        project_id: String,
    },
}

/// Kind tag used for per-kind tallies in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateProject,
    EnableService,
    CreateDataset,
    CreateServiceAccount,
    BindRole,
    GrantTableRead,
    AuthorizeView,
    RevokeViewAccess,
    CreateRole,
    UpdateRole,
    SetTableExpiration,
    DeleteProject,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::CreateProject => "create-project",
            ActionKind::EnableService => "enable-service",
            ActionKind::CreateDataset => "create-dataset",
            ActionKind::CreateServiceAccount => "create-service-account",
            ActionKind::BindRole => "bind-role",
            ActionKind::GrantTableRead => "grant-table-read",
            ActionKind::AuthorizeView => "authorize-view",
            ActionKind::RevokeViewAccess => "revoke-view-access",
            ActionKind::CreateRole => "create-role",
            ActionKind::UpdateRole => "update-role",
            ActionKind::SetTableExpiration => "set-table-expiration",
            ActionKind::DeleteProject => "delete-project",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::CreateProject { .. } => ActionKind::CreateProject,
            Action::EnableService { .. } => ActionKind::EnableService,
            Action::CreateDataset { .. } => ActionKind::CreateDataset,
            Action::CreateServiceAccount { .. } => ActionKind::CreateServiceAccount,
            Action::BindRole { .. } => ActionKind::BindRole,
            Action::GrantTableRead { .. } => ActionKind::GrantTableRead,
            Action::AuthorizeView { .. } => ActionKind::AuthorizeView,
            Action::RevokeViewAccess { .. } => ActionKind::RevokeViewAccess,
            Action::CreateRole { .. } => ActionKind::CreateRole,
            Action::UpdateRole { .. } => ActionKind::UpdateRole,
            Action::SetTableExpiration { .. } => ActionKind::SetTableExpiration,
            Action::DeleteProject { .. } => ActionKind::DeleteProject,
        }
    }

    /// The project the action mutates; the unit of the permission preflight.
    pub fn target_project(&self) -> &str {
        match self {
            Action::CreateProject { project_id, .. }
            | Action::EnableService { project_id, .. }
            | Action::CreateDataset { project_id, .. }
            | Action::CreateServiceAccount { project_id, .. }
            | Action::BindRole { project_id, .. }
            | Action::GrantTableRead { project_id, .. }
            | Action::AuthorizeView { project_id, .. }
            | Action::RevokeViewAccess { project_id, .. }
            | Action::CreateRole { project_id, .. }
            | Action::UpdateRole { project_id, .. }
            | Action::SetTableExpiration { project_id, .. }
            | Action::DeleteProject { project_id } => project_id,
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Action::DeleteProject { .. } | Action::RevokeViewAccess { .. }
        )
    }

    /// Human-readable one-liner, printed verbatim in dry-run previews.
    pub fn describe(&self) -> String {
        match self {
            Action::CreateProject {
                project_id,
                display_name,
            } => format!("create project {project_id} (\"{display_name}\")"),
            Action::EnableService {
                project_id,
                service,
            } => format!("enable {service} on {project_id}"),
            Action::CreateDataset {
                project_id,
                dataset_id,
                location,
            } => format!("create dataset {project_id}:{dataset_id} in {location}"),
            Action::CreateServiceAccount {
                project_id,
                account_id,
                ..
            } => format!(
                "create service account {}",
                identifier::service_account_email(account_id, project_id)
            ),
            Action::BindRole {
                project_id,
                member,
                role,
            } => format!("bind {role} to {member} on {project_id}"),
            Action::GrantTableRead {
                project_id,
                dataset_id,
                table_id,
                member,
            } => format!(
                "grant roles/bigquery.dataViewer to {member} on {project_id}:{dataset_id}.{table_id}"
            ),
            Action::AuthorizeView {
                project_id,
                dataset_id,
                view,
            } => format!("authorize view {view} in {project_id}:{dataset_id}"),
            Action::RevokeViewAccess {
                project_id,
                dataset_id,
                view,
            } => format!("revoke view {view} from {project_id}:{dataset_id}"),
            Action::CreateRole { project_id, role } => format!(
                "create role {} ({} permissions)",
                identifier::role_name(project_id, &role.role_id),
                role.permissions.len()
            ),
            Action::UpdateRole { project_id, role } => format!(
                "update role {} ({} permissions)",
                identifier::role_name(project_id, &role.role_id),
                role.permissions.len()
            ),
            Action::SetTableExpiration {
                project_id,
                dataset_id,
                expiration_ms,
            } => format!(
                "set default table expiration on {project_id}:{dataset_id} to {expiration_ms} ms ({} days)",
                expiration_ms / crate::config::MS_PER_DAY
            ),
            Action::DeleteProject { project_id } => format!("delete project {project_id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan builders
// ---------------------------------------------------------------------------

/// Full provisioning sequence for one company, in dependency order:
/// project → services → datasets → identity → bindings.
pub fn plan_provisioning(company: &Company, config: &Config) -> Result<(String, Vec<Action>)> {
    let project_id = identifier::derive_project_id(&company.company_new_name, company.company_id)?;
    let mut actions = Vec::new();

    actions.push(Action::CreateProject {
        project_id: project_id.clone(),
        display_name: company.company_new_name.clone(),
    });
    for service in &config.provisioning.services {
        actions.push(Action::EnableService {
            project_id: project_id.clone(),
            service: service.clone(),
        });
    }
    for dataset in &config.provisioning.datasets {
        actions.push(Action::CreateDataset {
            project_id: project_id.clone(),
            dataset_id: dataset.clone(),
            location: config.provisioning.location.clone(),
        });
    }
    actions.push(Action::CreateServiceAccount {
        project_id: project_id.clone(),
        account_id: config.provisioning.ingest_account.clone(),
        display_name: config.provisioning.ingest_display_name.clone(),
    });
    let member = format!(
        "serviceAccount:{}",
        identifier::service_account_email(&config.provisioning.ingest_account, &project_id)
    );
    for role in &config.provisioning.ingest_roles {
        actions.push(Action::BindRole {
            project_id: project_id.clone(),
            member: member.clone(),
            role: role.clone(),
        });
    }

    Ok((project_id, actions))
}

/// Deletion is a single destructive action against the derived id.
pub fn plan_deletion(company: &Company) -> Result<(String, Vec<Action>)> {
    let project_id = identifier::derive_project_id(&company.company_new_name, company.company_id)?;
    let actions = vec![Action::DeleteProject {
        project_id: project_id.clone(),
    }];
    Ok((project_id, actions))
}

/// Authorize the central consolidated view in the company's tenant dataset.
pub fn plan_view_authorization(project_id: &str, config: &Config) -> Vec<Action> {
    vec![Action::AuthorizeView {
        project_id: project_id.to_string(),
        dataset_id: identifier::tenant_dataset_id(project_id),
        view: central_view(config),
    }]
}

pub fn plan_view_revocation(project_id: &str, config: &Config) -> Vec<Action> {
    vec![Action::RevokeViewAccess {
        project_id: project_id.to_string(),
        dataset_id: identifier::tenant_dataset_id(project_id),
        view: central_view(config),
    }]
}

/// Create the central analytics account (once) and grant it read access on
/// the company's call table.
pub fn plan_call_table_grant(project_id: &str, config: &Config) -> Vec<Action> {
    let member = format!(
        "serviceAccount:{}",
        identifier::service_account_email(&config.analytics.account, &config.central_view.project)
    );
    vec![
        Action::CreateServiceAccount {
            project_id: config.central_view.project.clone(),
            account_id: config.analytics.account.clone(),
            display_name: config.analytics.display_name.clone(),
        },
        Action::GrantTableRead {
            project_id: project_id.to_string(),
            dataset_id: identifier::tenant_dataset_id(project_id),
            table_id: config.analytics.call_table.clone(),
            member,
        },
    ]
}

pub fn plan_role_creation(project_id: &str, config: &Config) -> Vec<Action> {
    vec![Action::CreateRole {
        project_id: project_id.to_string(),
        role: role_definition(config),
    }]
}

pub fn plan_role_update(project_id: &str, config: &Config) -> Vec<Action> {
    vec![Action::UpdateRole {
        project_id: project_id.to_string(),
        role: role_definition(config),
    }]
}

pub fn plan_role_assignment(project_id: &str, users: &[String], config: &Config) -> Vec<Action> {
    let role = identifier::role_name(project_id, &config.role.id);
    users
        .iter()
        .map(|email| Action::BindRole {
            project_id: project_id.to_string(),
            member: format!("user:{}", email.trim()),
            role: role.clone(),
        })
        .collect()
}

pub fn plan_expiration(project_id: &str, dataset_id: &str, expiration_ms: i64) -> Vec<Action> {
    vec![Action::SetTableExpiration {
        project_id: project_id.to_string(),
        dataset_id: dataset_id.to_string(),
        expiration_ms,
    }]
}

fn central_view(config: &Config) -> ViewRef {
    ViewRef {
        project_id: config.central_view.project.clone(),
        dataset_id: config.central_view.dataset.clone(),
        table_id: config.central_view.view.clone(),
    }
}

fn role_definition(config: &Config) -> RoleDefinition {
    RoleDefinition {
        role_id: config.role.id.clone(),
        title: config.role.title.clone(),
        description: config.role.description.clone(),
        permissions: config.role.permissions.clone(),
    }
}

//! Idempotency probe: read-only inspection of the target system, answering
//! whether an action's desired state already holds.

use crate::action::Action;
use crate::error::{Error, Result};
use crate::gcp::bigquery::BigQueryClient;
use crate::gcp::GcpClients;
use crate::identifier;
use crate::outcome::CheckState;
use std::collections::BTreeSet;

pub struct StateProbe<'a> {
    clients: &'a GcpClients,
}

impl<'a> StateProbe<'a> {
    pub fn new(clients: &'a GcpClients) -> Self {
        Self { clients }
    }

    /// Probe the target for one action. Every call here is read-only; the
    /// equality predicate is specific to the action kind.
    pub fn probe(&self, action: &Action) -> Result<CheckState> {
        match action {
            Action::CreateProject { project_id, .. } => {
                match self.clients.resourcemanager.project_state(project_id)? {
                    None => Ok(CheckState::Absent),
                    Some(state) if state == "ACTIVE" => Ok(CheckState::PresentMatching),
                    Some(_) => Ok(CheckState::PresentConflicting),
                }
            }

            Action::EnableService {
                project_id,
                service,
            } => {
                if self.clients.serviceusage.is_enabled(project_id, service)? {
                    Ok(CheckState::PresentMatching)
                } else {
                    Ok(CheckState::Absent)
                }
            }

            Action::CreateDataset {
                project_id,
                dataset_id,
                ..
            } => {
                if self.clients.bigquery.dataset_exists(project_id, dataset_id)? {
                    Ok(CheckState::PresentMatching)
                } else {
                    Ok(CheckState::Absent)
                }
            }

            Action::CreateServiceAccount {
                project_id,
                account_id,
                ..
            } => {
                if self
                    .clients
                    .iam
                    .service_account_exists(project_id, account_id)?
                {
                    Ok(CheckState::PresentMatching)
                } else {
                    Ok(CheckState::Absent)
                }
            }

            Action::BindRole {
                project_id,
                member,
                role,
            } => {
                if self
                    .clients
                    .resourcemanager
                    .has_binding(project_id, role, member)?
                {
                    Ok(CheckState::PresentMatching)
                } else {
                    Ok(CheckState::Absent)
                }
            }

            Action::GrantTableRead {
                project_id,
                dataset_id,
                table_id,
                member,
            } => {
                // A missing table is a NotFound failure, not a probe state.
                if !self
                    .clients
                    .bigquery
                    .table_exists(project_id, dataset_id, table_id)?
                {
                    return Err(Error::NotFound {
                        resource: format!("table {project_id}:{dataset_id}.{table_id}"),
                    });
                }
                if self
                    .clients
                    .bigquery
                    .table_read_granted(project_id, dataset_id, table_id, member)?
                {
                    Ok(CheckState::PresentMatching)
                } else {
                    Ok(CheckState::Absent)
                }
            }

            Action::AuthorizeView {
                project_id,
                dataset_id,
                view,
            } => {
                let dataset = self
                    .clients
                    .bigquery
                    .get_dataset(project_id, dataset_id)?
                    .ok_or_else(|| Error::NotFound {
                        resource: format!("dataset {project_id}:{dataset_id}"),
                    })?;
                if BigQueryClient::view_is_authorized(&dataset, view) {
                    Ok(CheckState::PresentMatching)
                } else {
                    Ok(CheckState::Absent)
                }
            }

            // Desired state is the entry's absence, so the membership test
            // inverts.
            Action::RevokeViewAccess {
                project_id,
                dataset_id,
                view,
            } => {
                let dataset = self
                    .clients
                    .bigquery
                    .get_dataset(project_id, dataset_id)?
                    .ok_or_else(|| Error::NotFound {
                        resource: format!("dataset {project_id}:{dataset_id}"),
                    })?;
                if BigQueryClient::view_is_authorized(&dataset, view) {
                    Ok(CheckState::Absent)
                } else {
                    Ok(CheckState::PresentMatching)
                }
            }

            Action::CreateRole { project_id, role } => {
                match self
                    .clients
                    .iam
                    .role_permissions(project_id, &role.role_id)?
                {
                    None => Ok(CheckState::Absent),
                    Some(current) => {
                        if permission_sets_match(&current, &role.permissions) {
                            Ok(CheckState::PresentMatching)
                        } else {
                            Ok(CheckState::PresentConflicting)
                        }
                    }
                }
            }

            Action::UpdateRole { project_id, role } => {
                match self
                    .clients
                    .iam
                    .role_permissions(project_id, &role.role_id)?
                {
                    None => Err(Error::NotFound {
                        resource: format!(
                            "role {}",
                            identifier::role_name(project_id, &role.role_id)
                        ),
                    }),
                    Some(current) if permission_sets_match(&current, &role.permissions) => {
                        Ok(CheckState::PresentMatching)
                    }
                    Some(_) => Ok(CheckState::Absent),
                }
            }

            Action::SetTableExpiration {
                project_id,
                dataset_id,
                expiration_ms,
            } => {
                let current = self
                    .clients
                    .bigquery
                    .default_table_expiration_ms(project_id, dataset_id)?;
                if current == Some(*expiration_ms) {
                    Ok(CheckState::PresentMatching)
                } else {
                    Ok(CheckState::Absent)
                }
            }

            // A project already gone (or pending deletion) needs no call.
            Action::DeleteProject { project_id } => {
                match self.clients.resourcemanager.project_state(project_id)? {
                    None => Ok(CheckState::PresentMatching),
                    Some(state) if state == "DELETE_REQUESTED" => Ok(CheckState::PresentMatching),
                    Some(_) => Ok(CheckState::Absent),
                }
            }
        }
    }
}

fn permission_sets_match(current: &[String], desired: &[String]) -> bool {
    current.iter().collect::<BTreeSet<_>>() == desired.iter().collect::<BTreeSet<_>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{RoleDefinition, ViewRef};
    use crate::gcp::{
        AccessToken, BigQueryClient, IamClient, ResourceManagerClient, ServiceUsageClient,
    };

    fn clients(server: &mockito::ServerGuard) -> GcpClients {
        let token = AccessToken::new("t");
        GcpClients {
            bigquery: BigQueryClient::with_base_url(&token, server.url()),
            resourcemanager: ResourceManagerClient::with_base_url(&token, server.url()),
            serviceusage: ServiceUsageClient::with_base_url(&token, server.url()),
            iam: IamClient::with_base_url(&token, server.url()),
        }
    }

    #[test]
    fn existing_dataset_probes_present_matching() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/bronze")
            .with_status(200)
            .with_body(r#"{"datasetReference": {"datasetId": "bronze"}}"#)
            .create();

        let clients = clients(&server);
        let probe = StateProbe::new(&clients);
        let state = probe
            .probe(&Action::CreateDataset {
                project_id: "acme-7".into(),
                dataset_id: "bronze".into(),
                location: "US".into(),
            })
            .unwrap();
        assert_eq!(state, CheckState::PresentMatching);
    }

    #[test]
    fn missing_dataset_probes_absent() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/bronze")
            .with_status(404)
            .with_body("{}")
            .create();

        let clients = clients(&server);
        let probe = StateProbe::new(&clients);
        let state = probe
            .probe(&Action::CreateDataset {
                project_id: "acme-7".into(),
                dataset_id: "bronze".into(),
                location: "US".into(),
            })
            .unwrap();
        assert_eq!(state, CheckState::Absent);
    }

    #[test]
    fn non_active_project_probes_conflicting() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/projects/acme-7")
            .with_status(200)
            .with_body(r#"{"lifecycleState": "DELETE_REQUESTED"}"#)
            .create();

        let clients = clients(&server);
        let probe = StateProbe::new(&clients);
        let state = probe
            .probe(&Action::CreateProject {
                project_id: "acme-7".into(),
                display_name: "Acme".into(),
            })
            .unwrap();
        assert_eq!(state, CheckState::PresentConflicting);
    }

    #[test]
    fn delete_of_absent_project_probes_present_matching() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/projects/acme-7")
            .with_status(404)
            .with_body("{}")
            .create();

        let clients = clients(&server);
        let probe = StateProbe::new(&clients);
        let state = probe
            .probe(&Action::DeleteProject {
                project_id: "acme-7".into(),
            })
            .unwrap();
        assert_eq!(state, CheckState::PresentMatching);
    }

    #[test]
    fn authorize_view_on_missing_dataset_is_not_found() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/servicetitan_acme_7")
            .with_status(404)
            .with_body("{}")
            .create();

        let clients = clients(&server);
        let probe = StateProbe::new(&clients);
        let err = probe
            .probe(&Action::AuthorizeView {
                project_id: "acme-7".into(),
                dataset_id: "servicetitan_acme_7".into(),
                view: ViewRef {
                    project_id: "central".into(),
                    dataset_id: "bronze".into(),
                    table_id: "consolidated_call".into(),
                },
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn role_with_different_permissions_probes_conflicting() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/projects/acme-7/roles/pphSheetsAnalyst")
            .with_status(200)
            .with_body(r#"{"includedPermissions": ["bigquery.tables.get"]}"#)
            .create();

        let clients = clients(&server);
        let probe = StateProbe::new(&clients);
        let state = probe
            .probe(&Action::CreateRole {
                project_id: "acme-7".into(),
                role: RoleDefinition {
                    role_id: "pphSheetsAnalyst".into(),
                    title: "t".into(),
                    description: "d".into(),
                    permissions: vec!["bigquery.tables.getData".into()],
                },
            })
            .unwrap();
        assert_eq!(state, CheckState::PresentConflicting);
    }

    #[test]
    fn permission_sets_ignore_order() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "x".to_string()];
        assert!(permission_sets_match(&a, &b));
        assert!(!permission_sets_match(&a, &a[..1].to_vec()));
    }

    #[test]
    fn expiration_mismatch_probes_absent() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/bronze")
            .with_status(200)
            .with_body(r#"{"defaultTableExpirationMs": "1000"}"#)
            .create();

        let clients = clients(&server);
        let probe = StateProbe::new(&clients);
        let state = probe
            .probe(&Action::SetTableExpiration {
                project_id: "acme-7".into(),
                dataset_id: "bronze".into(),
                expiration_ms: 7_776_000_000,
            })
            .unwrap();
        assert_eq!(state, CheckState::Absent);
    }
}

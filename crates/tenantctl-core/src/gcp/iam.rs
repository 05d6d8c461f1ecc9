//! IAM v1: per-project service accounts and custom roles.

use crate::action::RoleDefinition;
use crate::error::Result;
use crate::gcp::{AccessToken, Rest};
use crate::identifier;
use reqwest::Method;
use serde_json::{json, Value};

const ENDPOINT: &str = "https://iam.googleapis.com";

pub struct IamClient {
    rest: Rest,
}

impl IamClient {
    pub fn new(token: &AccessToken) -> Self {
        Self::with_base_url(token, ENDPOINT)
    }

    pub fn with_base_url(token: &AccessToken, base: impl Into<String>) -> Self {
        Self {
            rest: Rest::new(token, base, "iam"),
        }
    }

    // -- service accounts ---------------------------------------------------

    pub fn service_account_exists(&self, project_id: &str, account_id: &str) -> Result<bool> {
        let email = identifier::service_account_email(account_id, project_id);
        let path = format!("/v1/projects/{project_id}/serviceAccounts/{email}");
        let value = self.rest.execute_opt(
            self.rest.request(Method::GET, &path),
            project_id,
            &format!("service account {email}"),
        )?;
        Ok(value.is_some())
    }

    pub fn create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        display_name: &str,
    ) -> Result<()> {
        let body = json!({
            "accountId": account_id,
            "serviceAccount": {"displayName": display_name},
        });
        self.rest.execute(
            self.rest
                .request(Method::POST, &format!("/v1/projects/{project_id}/serviceAccounts"))
                .json(&body),
            project_id,
            &format!(
                "service account {}",
                identifier::service_account_email(account_id, project_id)
            ),
        )?;
        Ok(())
    }

    // -- custom roles -------------------------------------------------------

    /// The role's current `includedPermissions`, `None` when the role does
    /// not exist (a deleted role reports itself as deleted).
    pub fn role_permissions(&self, project_id: &str, role_id: &str) -> Result<Option<Vec<String>>> {
        let path = format!("/v1/projects/{project_id}/roles/{role_id}");
        let value = self.rest.execute_opt(
            self.rest.request(Method::GET, &path),
            project_id,
            &format!("role {role_id}"),
        )?;
        Ok(value.and_then(|v| {
            if v.get("deleted").and_then(Value::as_bool).unwrap_or(false) {
                return None;
            }
            Some(
                v.get("includedPermissions")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|p| p.as_str().map(String::from))
                    .collect(),
            )
        }))
    }

    pub fn role_exists(&self, project_id: &str, role_id: &str) -> Result<bool> {
        Ok(self.role_permissions(project_id, role_id)?.is_some())
    }

    /// Full role payload for `describe` output.
    pub fn get_role(&self, project_id: &str, role_id: &str) -> Result<Option<Value>> {
        let path = format!("/v1/projects/{project_id}/roles/{role_id}");
        self.rest.execute_opt(
            self.rest.request(Method::GET, &path),
            project_id,
            &format!("role {role_id}"),
        )
    }

    pub fn create_role(&self, project_id: &str, role: &RoleDefinition) -> Result<()> {
        let body = json!({
            "roleId": role.role_id,
            "role": {
                "title": role.title,
                "description": role.description,
                "stage": "GA",
                "includedPermissions": role.permissions,
            },
        });
        self.rest.execute(
            self.rest
                .request(Method::POST, &format!("/v1/projects/{project_id}/roles"))
                .json(&body),
            project_id,
            &format!("role {}", role.role_id),
        )?;
        Ok(())
    }

    pub fn update_role(&self, project_id: &str, role: &RoleDefinition) -> Result<()> {
        let body = json!({
            "title": role.title,
            "description": role.description,
            "stage": "GA",
            "includedPermissions": role.permissions,
        });
        let path = format!("/v1/projects/{project_id}/roles/{}", role.role_id);
        self.rest.execute(
            self.rest.request(Method::PATCH, &path).json(&body),
            project_id,
            &format!("role {}", role.role_id),
        )?;
        Ok(())
    }
}

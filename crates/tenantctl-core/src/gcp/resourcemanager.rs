//! Cloud Resource Manager v1: project lifecycle, project-level IAM policy,
//! and the permission preflight.

use crate::error::Result;
use crate::gcp::bigquery::{add_member, binding_has_member};
use crate::gcp::{AccessToken, Rest};
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

const ENDPOINT: &str = "https://cloudresourcemanager.googleapis.com";

pub struct ResourceManagerClient {
    rest: Rest,
}

impl ResourceManagerClient {
    pub fn new(token: &AccessToken) -> Self {
        Self::with_base_url(token, ENDPOINT)
    }

    pub fn with_base_url(token: &AccessToken, base: impl Into<String>) -> Self {
        Self {
            rest: Rest::new(token, base, "cloudresourcemanager"),
        }
    }

    /// Shorten operation polling, for tests.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.rest.set_poll_interval(interval);
        self
    }

    /// Create a project and block until its operation finishes.
    pub fn create_project(&self, project_id: &str, display_name: &str) -> Result<()> {
        let body = json!({"projectId": project_id, "name": display_name});
        let operation = self.rest.execute(
            self.rest.request(Method::POST, "/v1/projects").json(&body),
            project_id,
            &format!("project {project_id}"),
        )?;
        self.rest.wait_operation(&operation, project_id)
    }

    /// `Some(lifecycleState)` when the project exists, `None` otherwise.
    pub fn project_state(&self, project_id: &str) -> Result<Option<String>> {
        let value = self.rest.execute_opt(
            self.rest
                .request(Method::GET, &format!("/v1/projects/{project_id}")),
            project_id,
            &format!("project {project_id}"),
        )?;
        Ok(value.and_then(|v| {
            v.get("lifecycleState")
                .and_then(Value::as_str)
                .map(String::from)
        }))
    }

    pub fn project_is_active(&self, project_id: &str) -> Result<bool> {
        Ok(self.project_state(project_id)?.as_deref() == Some("ACTIVE"))
    }

    /// Request deletion (30-day pending-delete window on Google's side).
    pub fn delete_project(&self, project_id: &str) -> Result<()> {
        self.rest.execute(
            self.rest
                .request(Method::DELETE, &format!("/v1/projects/{project_id}")),
            project_id,
            &format!("project {project_id}"),
        )?;
        Ok(())
    }

    pub fn get_iam_policy(&self, project_id: &str) -> Result<Value> {
        self.rest.execute(
            self.rest
                .request(Method::POST, &format!("/v1/projects/{project_id}:getIamPolicy"))
                .json(&json!({})),
            project_id,
            &format!("IAM policy of {project_id}"),
        )
    }

    pub fn has_binding(&self, project_id: &str, role: &str, member: &str) -> Result<bool> {
        let policy = self.get_iam_policy(project_id)?;
        let bindings = policy
            .get("bindings")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(binding_has_member(&bindings, role, member))
    }

    /// Read-modify-write: add the member to the role's binding if absent.
    pub fn add_binding(&self, project_id: &str, role: &str, member: &str) -> Result<()> {
        let policy = self.get_iam_policy(project_id)?;
        let mut bindings = policy
            .get("bindings")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if binding_has_member(&bindings, role, member) {
            return Ok(());
        }
        add_member(&mut bindings, role, member);

        let mut updated = policy.clone();
        updated["bindings"] = Value::Array(bindings);
        self.rest.execute(
            self.rest
                .request(Method::POST, &format!("/v1/projects/{project_id}:setIamPolicy"))
                .json(&json!({"policy": updated})),
            project_id,
            &format!("IAM policy of {project_id}"),
        )?;
        Ok(())
    }

    /// Members holding `role` on the project.
    pub fn members_with_role(&self, project_id: &str, role: &str) -> Result<Vec<String>> {
        let policy = self.get_iam_policy(project_id)?;
        let members = policy
            .get("bindings")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|b| b.get("role").and_then(Value::as_str) == Some(role))
            .flat_map(|b| {
                b.get("members")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            })
            .filter_map(|m| m.as_str().map(String::from))
            .collect();
        Ok(members)
    }

    /// The subset of `permissions` the caller actually holds on the project.
    pub fn test_permissions(&self, project_id: &str, permissions: &[&str]) -> Result<Vec<String>> {
        let body = json!({"permissions": permissions});
        let value = self.rest.execute(
            self.rest
                .request(
                    Method::POST,
                    &format!("/v1/projects/{project_id}:testIamPermissions"),
                )
                .json(&body),
            project_id,
            &format!("permissions on {project_id}"),
        )?;
        Ok(value
            .get("permissions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|p| p.as_str().map(String::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> ResourceManagerClient {
        ResourceManagerClient::with_base_url(&AccessToken::new("t"), server.url())
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn create_project_waits_for_operation() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/projects")
            .with_status(200)
            .with_body(r#"{"name": "operations/cp.1234", "done": false}"#)
            .create();
        let poll = server
            .mock("GET", "/v1/operations/cp.1234")
            .with_status(200)
            .with_body(r#"{"name": "operations/cp.1234", "done": true, "response": {}}"#)
            .create();

        client(&server).create_project("acme-7", "Acme-West").unwrap();
        poll.assert();
    }

    #[test]
    fn project_state_absent_is_none() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/projects/ghost-1")
            .with_status(404)
            .with_body("{}")
            .create();

        assert_eq!(client(&server).project_state("ghost-1").unwrap(), None);
    }

    #[test]
    fn active_project_is_detected() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/projects/acme-7")
            .with_status(200)
            .with_body(r#"{"projectId": "acme-7", "lifecycleState": "ACTIVE"}"#)
            .create();

        assert!(client(&server).project_is_active("acme-7").unwrap());
    }

    #[test]
    fn delete_requested_project_is_not_active() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/projects/acme-7")
            .with_status(200)
            .with_body(r#"{"projectId": "acme-7", "lifecycleState": "DELETE_REQUESTED"}"#)
            .create();

        assert!(!client(&server).project_is_active("acme-7").unwrap());
    }

    #[test]
    fn add_binding_skips_when_member_already_bound() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/projects/acme-7:getIamPolicy")
            .with_status(200)
            .with_body(
                r#"{"bindings": [{"role": "roles/bigquery.admin", "members": ["serviceAccount:sa@acme-7.iam.gserviceaccount.com"]}]}"#,
            )
            .create();
        let set = server
            .mock("POST", "/v1/projects/acme-7:setIamPolicy")
            .expect(0)
            .create();

        client(&server)
            .add_binding(
                "acme-7",
                "roles/bigquery.admin",
                "serviceAccount:sa@acme-7.iam.gserviceaccount.com",
            )
            .unwrap();
        set.assert();
    }

    #[test]
    fn add_binding_appends_to_existing_role() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/projects/acme-7:getIamPolicy")
            .with_status(200)
            .with_body(r#"{"etag": "e", "bindings": [{"role": "roles/viewer", "members": ["user:a@x.com"]}]}"#)
            .create();
        let set = server
            .mock("POST", "/v1/projects/acme-7:setIamPolicy")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"policy": {"bindings": [{"role": "roles/viewer", "members": ["user:a@x.com", "user:b@x.com"]}]}}"#
                    .to_string(),
            ))
            .with_status(200)
            .with_body("{}")
            .create();

        client(&server)
            .add_binding("acme-7", "roles/viewer", "user:b@x.com")
            .unwrap();
        set.assert();
    }

    #[test]
    fn test_permissions_returns_granted_subset() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/projects/acme-7:testIamPermissions")
            .with_status(200)
            .with_body(r#"{"permissions": ["bigquery.datasets.update"]}"#)
            .create();

        let granted = client(&server)
            .test_permissions(
                "acme-7",
                &["bigquery.datasets.update", "resourcemanager.projects.delete"],
            )
            .unwrap();
        assert_eq!(granted, vec!["bigquery.datasets.update"]);
    }

    #[test]
    fn members_with_role_flattens_bindings() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/projects/acme-7:getIamPolicy")
            .with_status(200)
            .with_body(
                r#"{"bindings": [
                    {"role": "projects/acme-7/roles/pphSheetsAnalyst", "members": ["user:a@x.com", "user:b@x.com"]},
                    {"role": "roles/owner", "members": ["user:o@x.com"]}
                ]}"#,
            )
            .create();

        let members = client(&server)
            .members_with_role("acme-7", "projects/acme-7/roles/pphSheetsAnalyst")
            .unwrap();
        assert_eq!(members, vec!["user:a@x.com", "user:b@x.com"]);
    }
}

//! Service Usage v1: check and enable per-project service APIs.

use crate::error::Result;
use crate::gcp::{AccessToken, Rest};
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

const ENDPOINT: &str = "https://serviceusage.googleapis.com";

pub struct ServiceUsageClient {
    rest: Rest,
}

impl ServiceUsageClient {
    pub fn new(token: &AccessToken) -> Self {
        Self::with_base_url(token, ENDPOINT)
    }

    pub fn with_base_url(token: &AccessToken, base: impl Into<String>) -> Self {
        Self {
            rest: Rest::new(token, base, "serviceusage"),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.rest.set_poll_interval(interval);
        self
    }

    /// `Some("ENABLED" | "DISABLED" | …)`, `None` when the service name is
    /// unknown to the project.
    pub fn service_state(&self, project_id: &str, service: &str) -> Result<Option<String>> {
        let path = format!("/v1/projects/{project_id}/services/{service}");
        let value = self.rest.execute_opt(
            self.rest.request(Method::GET, &path),
            project_id,
            &format!("service {service} on {project_id}"),
        )?;
        Ok(value.and_then(|v| v.get("state").and_then(Value::as_str).map(String::from)))
    }

    pub fn is_enabled(&self, project_id: &str, service: &str) -> Result<bool> {
        Ok(self.service_state(project_id, service)?.as_deref() == Some("ENABLED"))
    }

    /// Enable the service and block until the operation finishes.
    pub fn enable(&self, project_id: &str, service: &str) -> Result<()> {
        let path = format!("/v1/projects/{project_id}/services/{service}:enable");
        let operation = self.rest.execute(
            self.rest.request(Method::POST, &path).json(&json!({})),
            project_id,
            &format!("service {service} on {project_id}"),
        )?;
        self.rest.wait_operation(&operation, project_id)
    }
}

//! Typed, blocking clients for the Google control-plane APIs this tool
//! touches. Each client wraps one REST surface; dry-run never constructs a
//! client call, so everything here is real-mode (or read-only probe) code.

pub mod auth;
pub mod bigquery;
pub mod iam;
pub mod resourcemanager;
pub mod serviceusage;

pub use auth::AccessToken;
pub use bigquery::BigQueryClient;
pub use iam::IamClient;
pub use resourcemanager::ResourceManagerClient;
pub use serviceusage::ServiceUsageClient;

use crate::error::{Error, Result};
use reqwest::blocking::{RequestBuilder, Response};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Rest: plumbing shared by every client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) struct Rest {
    http: reqwest::blocking::Client,
    token: String,
    base: String,
    api: &'static str,
    poll_interval: Duration,
}

impl Rest {
    pub(crate) fn new(token: &AccessToken, base: impl Into<String>, api: &'static str) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            token: token.secret().to_string(),
            base: base.into(),
            api,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub(crate) fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base, path))
            .bearer_auth(&self.token)
    }

    /// Send and map the response to the error taxonomy. `project` scopes
    /// permission errors; `resource` names what a 404/409 is about.
    pub(crate) fn execute(
        &self,
        builder: RequestBuilder,
        project: &str,
        resource: &str,
    ) -> Result<Value> {
        let response = builder.send().map_err(|e| self.transport_error(e))?;
        self.parse(response, project, resource)
    }

    /// Like `execute`, but a 404 is `None` rather than an error, the shape
    /// every existence probe wants.
    pub(crate) fn execute_opt(
        &self,
        builder: RequestBuilder,
        project: &str,
        resource: &str,
    ) -> Result<Option<Value>> {
        let response = builder.send().map_err(|e| self.transport_error(e))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        self.parse(response, project, resource).map(Some)
    }

    fn parse(&self, response: Response, project: &str, resource: &str) -> Result<Value> {
        let status = response.status();
        let body = response.text().map_err(|e| self.transport_error(e))?;
        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&body)?);
        }
        Err(self.status_error(status.as_u16(), project, resource, &body))
    }

    fn status_error(&self, status: u16, project: &str, resource: &str, body: &str) -> Error {
        let message = error_message(body);
        match status {
            401 | 403 => Error::PermissionDenied {
                project: project.to_string(),
                detail: message,
            },
            404 => Error::NotFound {
                resource: resource.to_string(),
            },
            409 => Error::Conflict {
                resource: resource.to_string(),
            },
            _ => Error::Api {
                api: self.api.to_string(),
                status,
                message,
            },
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        Error::Connectivity {
            target: self.api.to_string(),
            detail: e.to_string(),
        }
    }

    /// Wait for a long-running operation (`{"name": "...", "done": bool}`)
    /// to finish. Both project creation and service enablement return these.
    pub(crate) fn wait_operation(&self, operation: &Value, project: &str) -> Result<()> {
        if operation
            .get("done")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return check_operation_error(self.api, project, operation);
        }
        let Some(name) = operation.get("name").and_then(Value::as_str) else {
            // Some calls return the finished resource directly.
            return Ok(());
        };
        let name = name.to_string();

        const MAX_POLLS: u32 = 60;
        for _ in 0..MAX_POLLS {
            std::thread::sleep(self.poll_interval);
            let current = self.execute(
                self.request(Method::GET, &format!("/v1/{name}")),
                project,
                &name,
            )?;
            if current
                .get("done")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                return check_operation_error(self.api, project, &current);
            }
        }
        Err(Error::Api {
            api: self.api.to_string(),
            status: 0,
            message: format!("operation {name} did not complete"),
        })
    }
}

fn check_operation_error(api: &str, project: &str, operation: &Value) -> Result<()> {
    match operation.get("error") {
        None => Ok(()),
        Some(err) => {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("operation failed")
                .to_string();
            match code {
                // google.rpc codes 6/7 and their HTTP equivalents.
                6 | 409 => Err(Error::Conflict { resource: message }),
                7 | 403 => Err(Error::PermissionDenied {
                    project: project.to_string(),
                    detail: message,
                }),
                _ => Err(Error::Api {
                    api: api.to_string(),
                    status: code as u16,
                    message,
                }),
            }
        }
    }
}

/// Pull the human message out of a Google error payload, falling back to the
/// raw body (truncated) for non-JSON responses.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .pointer("/error/message")
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
    }
    body.chars().take(300).collect()
}

// ---------------------------------------------------------------------------
// GcpClients: one bundle per run
// ---------------------------------------------------------------------------

pub struct GcpClients {
    pub bigquery: BigQueryClient,
    pub resourcemanager: ResourceManagerClient,
    pub serviceusage: ServiceUsageClient,
    pub iam: IamClient,
}

impl GcpClients {
    pub fn new(token: &AccessToken) -> Self {
        Self {
            bigquery: BigQueryClient::new(token),
            resourcemanager: ResourceManagerClient::new(token),
            serviceusage: ServiceUsageClient::new(token),
            iam: IamClient::new(token),
        }
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot reach {target}: {detail}")]
    Connectivity { target: String, detail: String },

    #[error("gcloud not found on PATH: install the Google Cloud SDK and run 'gcloud auth login'")]
    GcloudMissing,

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{resource} already exists")]
    Conflict { resource: String },

    #[error("permission denied on project '{project}': {detail}")]
    PermissionDenied { project: String, detail: String },

    #[error("cannot derive a project id from company name '{0}'")]
    Generation(String),

    #[error("invalid menu choice: {0}")]
    InvalidChoice(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{api} returned HTTP {status}: {message}")]
    Api {
        api: String,
        status: u16,
        message: String,
    },

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error aborts the whole run rather than one action.
    /// Source-reader connectivity and permission-preflight failures are the
    /// only run-fatal classes; everything else is folded into a per-action
    /// `ExecutionResult` at the executor boundary.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::Connectivity { .. } | Error::GcloudMissing | Error::Interrupted
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_is_run_fatal() {
        let e = Error::Connectivity {
            target: "bigquery".into(),
            detail: "dns failure".into(),
        };
        assert!(e.is_run_fatal());
    }

    #[test]
    fn not_found_is_not_run_fatal() {
        let e = Error::NotFound {
            resource: "dataset bronze".into(),
        };
        assert!(!e.is_run_fatal());
    }
}

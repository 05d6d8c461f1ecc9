use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Company
// ---------------------------------------------------------------------------

/// One row of the companies table. Immutable within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: i64,
    pub company_name: String,
    pub company_new_name: String,
    /// Set once provisioning has succeeded; null until then.
    pub project_id: Option<String>,
}

impl Company {
    pub fn is_provisioned(&self) -> bool {
        self.project_id
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }

    /// `[id] name` prefix used by every progress line.
    pub fn label(&self) -> String {
        format!("[{}] {}", self.company_id, self.company_name)
    }
}

// ---------------------------------------------------------------------------
// CompanyFilter
// ---------------------------------------------------------------------------

/// Which slice of the table an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyFilter {
    /// Every row (audit surfaces report rows with no project id instead of
    /// silently dropping them).
    All,
    /// Rows with no project id yet: provisioning candidates.
    Unprovisioned,
    /// Rows with a project id: authorization, permissions, expiration.
    Provisioned,
}

impl CompanyFilter {
    /// WHERE clause fragment appended to the companies query.
    pub fn predicate(self) -> Option<&'static str> {
        match self {
            CompanyFilter::All => None,
            CompanyFilter::Unprovisioned => Some("company_project_id IS NULL"),
            CompanyFilter::Provisioned => Some("company_project_id IS NOT NULL"),
        }
    }
}

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// SourceTable
// ---------------------------------------------------------------------------

/// Location of the canonical companies table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTable {
    #[serde(default = "default_source_project")]
    pub project: String,
    #[serde(default = "default_source_dataset")]
    pub dataset: String,
    #[serde(default = "default_source_table")]
    pub table: String,
}

fn default_source_project() -> String {
    "platform-partners-des".to_string()
}

fn default_source_dataset() -> String {
    "settings".to_string()
}

fn default_source_table() -> String {
    "companies".to_string()
}

impl SourceTable {
    pub fn table_ref(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

impl Default for SourceTable {
    fn default() -> Self {
        Self {
            project: default_source_project(),
            dataset: default_source_dataset(),
            table: default_source_table(),
        }
    }
}

// ---------------------------------------------------------------------------
// CentralView
// ---------------------------------------------------------------------------

/// The consolidated view (in the central project) that tenant datasets
/// authorize for read access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentralView {
    #[serde(default = "default_source_project")]
    pub project: String,
    #[serde(default = "default_central_dataset")]
    pub dataset: String,
    #[serde(default = "default_central_view")]
    pub view: String,
}

fn default_central_dataset() -> String {
    "bronze".to_string()
}

fn default_central_view() -> String {
    "consolidated_call".to_string()
}

impl Default for CentralView {
    fn default() -> Self {
        Self {
            project: default_source_project(),
            dataset: default_central_dataset(),
            view: default_central_view(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProvisioningConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Datasets created in every new tenant project, in creation order.
    #[serde(default = "default_datasets")]
    pub datasets: Vec<String>,
    #[serde(default = "default_location")]
    pub location: String,
    /// Services enabled on every new tenant project.
    #[serde(default = "default_services")]
    pub services: Vec<String>,
    /// Ingestion service account created per tenant project.
    #[serde(default = "default_ingest_account")]
    pub ingest_account: String,
    #[serde(default = "default_ingest_display_name")]
    pub ingest_display_name: String,
    /// Roles bound to the ingestion account on its own project.
    #[serde(default = "default_ingest_roles")]
    pub ingest_roles: Vec<String>,
}

fn default_datasets() -> Vec<String> {
    ["settings", "fivetran", "bronze", "silver", "gold", "management"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_location() -> String {
    "US".to_string()
}

fn default_services() -> Vec<String> {
    vec!["bigquery.googleapis.com".to_string()]
}

fn default_ingest_account() -> String {
    "fivetran-account-service".to_string()
}

fn default_ingest_display_name() -> String {
    "Fivetran Account Service".to_string()
}

fn default_ingest_roles() -> Vec<String> {
    vec!["roles/bigquery.admin".to_string()]
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            datasets: default_datasets(),
            location: default_location(),
            services: default_services(),
            ingest_account: default_ingest_account(),
            ingest_display_name: default_ingest_display_name(),
            ingest_roles: default_ingest_roles(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnalyticsConfig
// ---------------------------------------------------------------------------

/// The central analytics identity granted read access on tenant call tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_analytics_account")]
    pub account: String,
    #[serde(default = "default_analytics_display_name")]
    pub display_name: String,
    #[serde(default = "default_call_table")]
    pub call_table: String,
}

fn default_analytics_account() -> String {
    "data-analytics".to_string()
}

fn default_analytics_display_name() -> String {
    "Data Analytics Service Account".to_string()
}

fn default_call_table() -> String {
    "call".to_string()
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            account: default_analytics_account(),
            display_name: default_analytics_display_name(),
            call_table: default_call_table(),
        }
    }
}

// ---------------------------------------------------------------------------
// RoleConfig
// ---------------------------------------------------------------------------

/// The custom role bundled for spreadsheet analysts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default = "default_role_id")]
    pub id: String,
    #[serde(default = "default_role_title")]
    pub title: String,
    #[serde(default = "default_role_description")]
    pub description: String,
    #[serde(default = "default_role_permissions")]
    pub permissions: Vec<String>,
}

fn default_role_id() -> String {
    "pphSheetsAnalyst".to_string()
}

fn default_role_title() -> String {
    "PPH Sheets Analyst".to_string()
}

fn default_role_description() -> String {
    "Read and query access for analysts working from connected spreadsheets".to_string()
}

fn default_role_permissions() -> Vec<String> {
    [
        "bigquery.datasets.get",
        "bigquery.datasets.getIamPolicy",
        "bigquery.models.getData",
        "bigquery.models.getMetadata",
        "bigquery.models.list",
        "bigquery.routines.get",
        "bigquery.routines.list",
        "bigquery.tables.get",
        "bigquery.tables.getData",
        "bigquery.tables.list",
        "bigquery.tables.export",
        "bigquery.jobs.create",
        "bigquery.jobs.list",
        "bigquery.jobs.get",
        "resourcemanager.projects.get",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            id: default_role_id(),
            title: default_role_title(),
            description: default_role_description(),
            permissions: default_role_permissions(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExpirationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpirationConfig {
    #[serde(default = "default_expiration_days")]
    pub default_days: u32,
}

fn default_expiration_days() -> u32 {
    90
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            default_days: default_expiration_days(),
        }
    }
}

pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceTable,
    #[serde(default)]
    pub central_view: CentralView,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub role: RoleConfig,
    #[serde(default)]
    pub expiration: ExpirationConfig,
}

impl Config {
    /// Load from a YAML file; a missing file yields the built-in defaults.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// `~/.config/tenantctl/config.yaml`, or the relative fallback when the
    /// home directory cannot be resolved.
    pub fn default_path() -> PathBuf {
        match home::home_dir() {
            Some(h) => h.join(".config").join("tenantctl").join("config.yaml"),
            None => PathBuf::from("tenantctl.yaml"),
        }
    }
}

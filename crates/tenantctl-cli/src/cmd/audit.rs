use crate::cmd::connect;
use crate::output::{print_json, Progress};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tenantctl_core::company::CompanyFilter;
use tenantctl_core::config::Config;
use tenantctl_core::gcp::GcpClients;
use tenantctl_core::identifier;
use tenantctl_core::source::CompanyDirectory;

#[derive(Debug, Serialize)]
struct AuditFinding {
    company_id: i64,
    company_name: String,
    project_id: Option<String>,
    missing: Vec<String>,
}

impl AuditFinding {
    fn ok(&self) -> bool {
        self.project_id.is_some() && self.missing.is_empty()
    }
}

/// Read-only audit: for every company with a recorded project, verify the
/// project is active, the required services are enabled, the datasets exist,
/// and the ingest account exists with its roles bound.
pub fn run(
    config: &Config,
    json: bool,
    progress: &mut Progress,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let clients = connect()?;
    let directory = CompanyDirectory::new(&clients.bigquery, config.source.clone());
    let companies = directory.list(CompanyFilter::All)?;

    let mut findings = Vec::with_capacity(companies.len());
    let mut interrupted = false;

    for company in &companies {
        if cancel.load(Ordering::Relaxed) {
            interrupted = true;
            break;
        }
        let mut finding = AuditFinding {
            company_id: company.company_id,
            company_name: company.company_name.clone(),
            project_id: company.project_id.clone(),
            missing: Vec::new(),
        };

        match &company.project_id {
            None => finding.missing.push("no project id recorded".to_string()),
            Some(project_id) => audit_project(&clients, config, project_id, &mut finding.missing),
        }

        if !json {
            if finding.ok() {
                progress.line(&format!(
                    "{} ({}): OK",
                    company.label(),
                    finding.project_id.as_deref().unwrap_or("-")
                ));
            } else {
                progress.line(&format!(
                    "{} ({}):",
                    company.label(),
                    finding.project_id.as_deref().unwrap_or("-")
                ));
                for item in &finding.missing {
                    progress.line(&format!("  - {item}"));
                }
            }
        }
        findings.push(finding);
    }

    if json {
        print_json(&findings)?;
    } else {
        let ok = findings.iter().filter(|f| f.ok()).count();
        progress.rule();
        progress.line(&format!(
            "audited {} companies: {} fully configured, {} with findings",
            findings.len(),
            ok,
            findings.len() - ok
        ));
    }
    if interrupted {
        anyhow::bail!("interrupted before the audit finished");
    }
    Ok(())
}

fn audit_project(
    clients: &GcpClients,
    config: &Config,
    project_id: &str,
    missing: &mut Vec<String>,
) {
    match clients.resourcemanager.project_is_active(project_id) {
        Ok(true) => {}
        Ok(false) => {
            missing.push("project does not exist or is not active".to_string());
            return;
        }
        Err(e) => {
            missing.push(format!("project check failed: {e}"));
            return;
        }
    }

    for service in &config.provisioning.services {
        match clients.serviceusage.is_enabled(project_id, service) {
            Ok(true) => {}
            Ok(false) => missing.push(format!("service {service} not enabled")),
            Err(e) => missing.push(format!("service check failed for {service}: {e}")),
        }
    }

    for dataset in &config.provisioning.datasets {
        match clients.bigquery.dataset_exists(project_id, dataset) {
            Ok(true) => {}
            Ok(false) => missing.push(format!("dataset '{dataset}' does not exist")),
            Err(e) => missing.push(format!("dataset check failed for '{dataset}': {e}")),
        }
    }

    let account = &config.provisioning.ingest_account;
    match clients.iam.service_account_exists(project_id, account) {
        Ok(true) => {
            let member = format!(
                "serviceAccount:{}",
                identifier::service_account_email(account, project_id)
            );
            for role in &config.provisioning.ingest_roles {
                match clients.resourcemanager.has_binding(project_id, role, &member) {
                    Ok(true) => {}
                    Ok(false) => missing.push(format!("ingest account missing {role}")),
                    Err(e) => missing.push(format!("role check failed for {role}: {e}")),
                }
            }
        }
        Ok(false) => missing.push(format!("service account '{account}' does not exist")),
        Err(e) => missing.push(format!("service account check failed: {e}")),
    }
}

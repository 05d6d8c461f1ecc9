//! The per-company pipeline: generate → check → execute → tally, strictly
//! sequential, with failures isolated per company.

use crate::action::{self, Action};
use crate::company::Company;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{Executor, Mode};
use crate::gcp::GcpClients;
use crate::outcome::{ExecutionResult, ItemPhase};
use crate::report::{Reporter, RunSummary};
use crate::source::CompanyDirectory;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// RunEvent: progress stream consumed by the CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum RunEvent {
    CompanyStarted {
        label: String,
        project_id: String,
    },
    GenerationFailed {
        label: String,
        reason: String,
    },
    ActionFinished {
        description: String,
        result: ExecutionResult,
        note: Option<String>,
    },
    /// Remaining actions dropped after a permission failure on the company.
    RemainingDropped {
        dropped: usize,
    },
    CompanyFinished {
        label: String,
        phase: ItemPhase,
    },
    WriteBack {
        company_id: i64,
        project_id: String,
        ok: bool,
    },
}

pub type OnEvent<'e> = dyn FnMut(RunEvent) + 'e;

/// One pre-planned unit of work for the generic batch pipeline.
pub struct BatchItem {
    pub company: Company,
    pub project_id: String,
    pub actions: Vec<Action>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct Runner<'a> {
    executor: Executor<'a>,
    cancel: Arc<AtomicBool>,
}

impl<'a> Runner<'a> {
    pub fn new(clients: &'a GcpClients, mode: Mode, cancel: Arc<AtomicBool>) -> Self {
        Self {
            executor: Executor::new(clients, mode),
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Provision every company in the list. In real mode a fully successful
    /// company gets its project id written back to the source table, once.
    pub fn run_provisioning(
        &self,
        companies: &[Company],
        config: &Config,
        directory: &CompanyDirectory<'_>,
        on_event: &mut OnEvent<'_>,
    ) -> RunSummary {
        let mut reporter = Reporter::new();

        for company in companies {
            if self.cancelled() {
                reporter.mark_interrupted();
                break;
            }

            let mut phase = ItemPhase::Pending.advance(ItemPhase::Generating).expect("legal");
            let (project_id, actions) = match action::plan_provisioning(company, config) {
                Ok(plan) => plan,
                Err(e) => {
                    phase = phase.advance(ItemPhase::GenerationFailed).expect("legal");
                    on_event(RunEvent::GenerationFailed {
                        label: company.label(),
                        reason: e.to_string(),
                    });
                    reporter.record_company(phase);
                    continue;
                }
            };
            phase = phase.advance(ItemPhase::Generated).expect("legal");

            on_event(RunEvent::CompanyStarted {
                label: company.label(),
                project_id: project_id.clone(),
            });

            let final_phase = self.execute_item(phase, &actions, &mut reporter, on_event);
            reporter.record_company(final_phase);
            on_event(RunEvent::CompanyFinished {
                label: company.label(),
                phase: final_phase,
            });

            if final_phase == ItemPhase::Completed && !self.executor.mode().is_dry_run() {
                let ok = directory.record_project_id(company.company_id, &project_id).is_ok();
                on_event(RunEvent::WriteBack {
                    company_id: company.company_id,
                    project_id: project_id.clone(),
                    ok,
                });
            }
        }

        reporter.finish()
    }

    /// Delete the derived project of every company in the list.
    pub fn run_deletion(&self, companies: &[Company], on_event: &mut OnEvent<'_>) -> RunSummary {
        let mut reporter = Reporter::new();

        for company in companies {
            if self.cancelled() {
                reporter.mark_interrupted();
                break;
            }

            let mut phase = ItemPhase::Pending.advance(ItemPhase::Generating).expect("legal");
            let (project_id, actions) = match action::plan_deletion(company) {
                Ok(plan) => plan,
                Err(e) => {
                    phase = phase.advance(ItemPhase::GenerationFailed).expect("legal");
                    on_event(RunEvent::GenerationFailed {
                        label: company.label(),
                        reason: e.to_string(),
                    });
                    reporter.record_company(phase);
                    continue;
                }
            };
            phase = phase.advance(ItemPhase::Generated).expect("legal");

            on_event(RunEvent::CompanyStarted {
                label: company.label(),
                project_id: project_id.clone(),
            });
            let final_phase = self.execute_item(phase, &actions, &mut reporter, on_event);
            reporter.record_company(final_phase);
            on_event(RunEvent::CompanyFinished {
                label: company.label(),
                phase: final_phase,
            });
        }

        reporter.finish()
    }

    /// Generic pipeline for pre-planned work (views, permissions, roles,
    /// expiration): plans were built from table-recorded project ids, so
    /// there is no generation stage to fail.
    pub fn run_batch(&self, items: &[BatchItem], on_event: &mut OnEvent<'_>) -> RunSummary {
        let mut reporter = Reporter::new();

        for item in items {
            if self.cancelled() {
                reporter.mark_interrupted();
                break;
            }

            on_event(RunEvent::CompanyStarted {
                label: item.company.label(),
                project_id: item.project_id.clone(),
            });
            let phase = ItemPhase::Pending
                .advance(ItemPhase::Generating)
                .and_then(|p| p.advance(ItemPhase::Generated))
                .expect("legal");
            let final_phase = self.execute_item(phase, &item.actions, &mut reporter, on_event);
            reporter.record_company(final_phase);
            on_event(RunEvent::CompanyFinished {
                label: item.company.label(),
                phase: final_phase,
            });
        }

        reporter.finish()
    }

    /// Run one company's actions in order. Returns the terminal phase.
    fn execute_item(
        &self,
        phase: ItemPhase,
        actions: &[Action],
        reporter: &mut Reporter,
        on_event: &mut OnEvent<'_>,
    ) -> ItemPhase {
        let phase = phase.advance(ItemPhase::Checking).expect("legal");

        let mut succeeded = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;

        for (index, act) in actions.iter().enumerate() {
            if self.cancelled() {
                break;
            }
            let outcome = self.executor.run(act);
            reporter.record_action(act.kind(), &outcome.result);
            on_event(RunEvent::ActionFinished {
                description: act.describe(),
                result: outcome.result.clone(),
                note: outcome.note.clone(),
            });

            match &outcome.result {
                ExecutionResult::Succeeded | ExecutionResult::WouldSucceed => succeeded += 1,
                ExecutionResult::Skipped => skipped += 1,
                ExecutionResult::Failed(_) => failed += 1,
            }

            if outcome.fatal_for_item {
                let dropped = actions.len() - index - 1;
                if dropped > 0 {
                    on_event(RunEvent::RemainingDropped { dropped });
                }
                break;
            }
        }

        if failed == 0 && succeeded == 0 && skipped > 0 {
            // Everything already held; no mutating call was issued.
            return phase.advance(ItemPhase::SkipAll).expect("legal");
        }
        let phase = phase.advance(ItemPhase::Executing).expect("legal");
        let terminal = if failed == 0 {
            ItemPhase::Completed
        } else if succeeded > 0 || skipped > 0 {
            ItemPhase::PartiallyFailed
        } else {
            ItemPhase::Failed
        };
        phase.advance(terminal).expect("legal")
    }
}

// ---------------------------------------------------------------------------
// Permission preflight
// ---------------------------------------------------------------------------

/// Verify the caller holds `permissions` on every target project before a
/// real multi-project run. Any shortfall aborts the whole run.
pub fn preflight_permissions(
    clients: &GcpClients,
    projects: &[String],
    permissions: &[&str],
) -> Result<()> {
    for project in projects {
        let granted = clients.resourcemanager.test_permissions(project, permissions)?;
        let missing: Vec<&str> = permissions
            .iter()
            .copied()
            .filter(|p| !granted.iter().any(|g| g == p))
            .collect();
        if !missing.is_empty() {
            return Err(Error::PermissionDenied {
                project: project.clone(),
                detail: format!("missing {}", missing.join(", ")),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    fn acme(new_name: &str) -> Company {
        Company {
            company_id: 7,
            company_name: "Acme Co".into(),
            company_new_name: new_name.into(),
            project_id: None,
        }
    }

    #[test]
    fn dry_run_provisioning_previews_everything_without_calls() {
        let mut server = mockito::Server::new();
        // The only permitted traffic in a dry-run batch is nothing at all.
        let any_post = server
            .mock("POST", mockito::Matcher::Regex(".*".to_string()))
            .expect(0)
            .create();

        let clients = clients(&server);
        let runner = Runner::new(&clients, Mode::DryRun, no_cancel());
        let config = Config::default();
        let companies = vec![acme("Acme-West")];

        let mut events = 0;
        let bigquery = BigQueryClient::with_base_url(&AccessToken::new("t"), server.url());
        let directory = CompanyDirectory::new(&bigquery, config.source.clone());
        let summary = runner.run_provisioning(&companies, &config, &directory, &mut |e| {
            if matches!(e, RunEvent::ActionFinished { .. }) {
                events += 1;
            }
        });

        assert_eq!(summary.companies_processed, 1);
        assert_eq!(summary.companies_succeeded, 1);
        assert_eq!(events, 10);
        assert_eq!(summary.actions_attempted(), 10);
        any_post.assert();
    }

    #[test]
    fn underivable_name_is_unprocessable_and_run_continues() {
        let server = mockito::Server::new();
        let clients = clients(&server);
        let runner = Runner::new(&clients, Mode::DryRun, no_cancel());
        let config = Config::default();
        let companies = vec![acme("???"), acme("Acme-West")];

        let bigquery = BigQueryClient::with_base_url(&AccessToken::new("t"), server.url());
        let directory = CompanyDirectory::new(&bigquery, config.source.clone());
        let summary =
            runner.run_provisioning(&companies, &config, &directory, &mut |_| {});

        assert_eq!(summary.companies_processed, 2);
        assert_eq!(summary.companies_unprocessable, 1);
        assert_eq!(summary.companies_succeeded, 1);
        assert!(summary.is_balanced());
    }

    #[test]
    fn all_skipped_batch_lands_in_skip_all() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/bronze")
            .with_status(200)
            .with_body(r#"{"datasetReference": {"datasetId": "bronze"}}"#)
            .create();

        let clients = clients(&server);
        let runner = Runner::new(&clients, Mode::Real, no_cancel());
        let items = vec![BatchItem {
            company: acme("Acme-West"),
            project_id: "acme-7".into(),
            actions: vec![Action::CreateDataset {
                project_id: "acme-7".into(),
                dataset_id: "bronze".into(),
                location: "US".into(),
            }],
        }];

        let mut phases = Vec::new();
        let summary = runner.run_batch(&items, &mut |e| {
            if let RunEvent::CompanyFinished { phase, .. } = e {
                phases.push(phase);
            }
        });

        assert_eq!(phases, vec![ItemPhase::SkipAll]);
        assert_eq!(summary.companies_succeeded, 1);
        assert_eq!(summary.per_kind.values().map(|t| t.skipped).sum::<usize>(), 1);
    }

    #[test]
    fn permission_failure_drops_remaining_actions() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/bronze")
            .with_status(403)
            .with_body(r#"{"error": {"message": "forbidden"}}"#)
            .create();

        let clients = clients(&server);
        let runner = Runner::new(&clients, Mode::Real, no_cancel());
        let items = vec![BatchItem {
            company: acme("Acme-West"),
            project_id: "acme-7".into(),
            actions: vec![
                Action::CreateDataset {
                    project_id: "acme-7".into(),
                    dataset_id: "bronze".into(),
                    location: "US".into(),
                },
                Action::CreateDataset {
                    project_id: "acme-7".into(),
                    dataset_id: "silver".into(),
                    location: "US".into(),
                },
            ],
        }];

        let mut dropped = 0;
        let summary = runner.run_batch(&items, &mut |e| {
            if let RunEvent::RemainingDropped { dropped: d, .. } = e {
                dropped = d;
            }
        });

        assert_eq!(dropped, 1);
        assert_eq!(summary.companies_failed, 1);
        // Only the first action was attempted.
        assert_eq!(summary.actions_attempted(), 1);
    }

    #[test]
    fn cancellation_interrupts_between_companies() {
        let server = mockito::Server::new();
        let clients = clients(&server);
        let cancel = Arc::new(AtomicBool::new(true));
        let runner = Runner::new(&clients, Mode::DryRun, cancel);
        let config = Config::default();
        let companies = vec![acme("Acme-West")];

        let bigquery = BigQueryClient::with_base_url(&AccessToken::new("t"), server.url());
        let directory = CompanyDirectory::new(&bigquery, config.source.clone());
        let summary =
            runner.run_provisioning(&companies, &config, &directory, &mut |_| {});

        assert!(summary.interrupted);
        assert_eq!(summary.companies_processed, 0);
    }

    #[test]
    fn completed_real_provisioning_writes_back_once() {
        let mut server = mockito::Server::new();
        // Probes: everything absent.
        server
            .mock("GET", mockito::Matcher::Regex("^/v1/projects/sole-3$".to_string()))
            .with_status(404)
            .with_body("{}")
            .create();
        // Creation succeeds immediately.
        server
            .mock("POST", "/v1/projects")
            .with_status(200)
            .with_body(r#"{"name": "operations/cp.1", "done": true, "response": {}}"#)
            .create();
        let write_back = server
            .mock("POST", "/projects/platform-partners-des/queries")
            .match_body(mockito::Matcher::Regex("UPDATE".to_string()))
            .with_status(200)
            .with_body(r#"{"jobComplete": true}"#)
            .expect(1)
            .create();

        let clients = clients(&server);
        let runner = Runner::new(&clients, Mode::Real, no_cancel());
        let mut config = Config::default();
        // Single-action plan keeps the mock surface small.
        config.provisioning.services.clear();
        config.provisioning.datasets.clear();
        config.provisioning.ingest_roles.clear();

        let company = Company {
            company_id: 3,
            company_name: "Sole".into(),
            company_new_name: "Sole".into(),
            project_id: None,
        };
        // Remaining plan: create project, then the ingest service account.
        let bigquery = BigQueryClient::with_base_url(&AccessToken::new("t"), server.url());
        let directory = CompanyDirectory::new(&bigquery, config.source.clone());

        // Service-account probe (absent) and creation.
        server
            .mock(
                "GET",
                "/v1/projects/sole-3/serviceAccounts/fivetran-account-service@sole-3.iam.gserviceaccount.com",
            )
            .with_status(404)
            .with_body("{}")
            .create();
        server
            .mock("POST", "/v1/projects/sole-3/serviceAccounts")
            .with_status(200)
            .with_body("{}")
            .create();

        let summary =
            runner.run_provisioning(&[company], &config, &directory, &mut |_| {});

        assert_eq!(summary.companies_succeeded, 1);
        write_back.assert();
    }

    #[test]
    fn preflight_rejects_missing_permissions() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/projects/acme-7:testIamPermissions")
            .with_status(200)
            .with_body(r#"{"permissions": ["bigquery.datasets.get"]}"#)
            .create();

        let clients = clients(&server);
        let err = preflight_permissions(
            &clients,
            &["acme-7".to_string()],
            &["bigquery.datasets.get", "bigquery.datasets.update"],
        )
        .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[test]
    fn preflight_accepts_full_grants() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/projects/acme-7:testIamPermissions")
            .with_status(200)
            .with_body(r#"{"permissions": ["bigquery.datasets.update"]}"#)
            .create();

        let clients = clients(&server);
        preflight_permissions(&clients, &["acme-7".to_string()], &["bigquery.datasets.update"])
            .unwrap();
    }
}

//! Source Reader: the canonical companies table in BigQuery.

use crate::company::{Company, CompanyFilter};
use crate::config::SourceTable;
use crate::error::{Error, Result};
use crate::gcp::bigquery::{BigQueryClient, QueryParam};

pub struct CompanyDirectory<'a> {
    bigquery: &'a BigQueryClient,
    table: SourceTable,
}

impl<'a> CompanyDirectory<'a> {
    pub fn new(bigquery: &'a BigQueryClient, table: SourceTable) -> Self {
        Self { bigquery, table }
    }

    /// Companies matching the filter, ordered by id. Any failure here is a
    /// source-level failure and aborts the whole run, so everything maps to
    /// `Connectivity`.
    pub fn list(&self, filter: CompanyFilter) -> Result<Vec<Company>> {
        let mut sql = format!(
            "SELECT company_id, company_name, company_new_name, company_project_id \
             FROM `{}`",
            self.table.table_ref()
        );
        if let Some(predicate) = filter.predicate() {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        sql.push_str(" ORDER BY company_id");

        let rows = self
            .bigquery
            .query(&self.table.project, &sql, &[])
            .map_err(|e| self.fatal(e))?;

        rows.into_iter().map(|row| self.parse_row(row)).collect()
    }

    fn parse_row(&self, row: Vec<Option<String>>) -> Result<Company> {
        let mut cells = row.into_iter();
        let company_id = cells
            .next()
            .flatten()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| self.malformed("company_id"))?;
        let company_name = cells.next().flatten().unwrap_or_default();
        let company_new_name = cells.next().flatten().unwrap_or_default();
        let project_id = cells
            .next()
            .flatten()
            .filter(|p| !p.trim().is_empty());

        Ok(Company {
            company_id,
            company_name,
            company_new_name,
            project_id,
        })
    }

    /// Record a freshly provisioned project id on its company row. Called
    /// exactly once per fully successful company; never retried.
    pub fn record_project_id(&self, company_id: i64, project_id: &str) -> Result<()> {
        let sql = format!(
            "UPDATE `{}` SET company_project_id = @project_id WHERE company_id = @company_id",
            self.table.table_ref()
        );
        self.bigquery.query(
            &self.table.project,
            &sql,
            &[
                QueryParam::string("project_id", project_id),
                QueryParam::int64("company_id", company_id),
            ],
        )?;
        Ok(())
    }

    fn fatal(&self, e: Error) -> Error {
        Error::Connectivity {
            target: format!("companies table {}", self.table.table_ref()),
            detail: e.to_string(),
        }
    }

    fn malformed(&self, column: &str) -> Error {
        Error::Connectivity {
            target: format!("companies table {}", self.table.table_ref()),
            detail: format!("malformed {column} in query result"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::AccessToken;

    fn table() -> SourceTable {
        SourceTable {
            project: "src".into(),
            dataset: "settings".into(),
            table: "companies".into(),
        }
    }

    #[test]
    fn list_parses_companies_in_order() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/projects/src/queries")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"useLegacySql": false}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"jobComplete": true, "rows": [
                    {"f": [{"v": "7"}, {"v": "Acme Co"}, {"v": "Acme-West"}, {"v": null}]},
                    {"f": [{"v": "9"}, {"v": "Borealis"}, {"v": "Borealis-East"}, {"v": "borealis-9"}]}
                ]}"#,
            )
            .create();

        let bigquery = BigQueryClient::with_base_url(&AccessToken::new("t"), server.url());
        let directory = CompanyDirectory::new(&bigquery, table());
        let companies = directory.list(CompanyFilter::All).unwrap();

        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].company_id, 7);
        assert!(!companies[0].is_provisioned());
        assert_eq!(companies[1].project_id.as_deref(), Some("borealis-9"));
    }

    #[test]
    fn unprovisioned_filter_lands_in_sql() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/projects/src/queries")
            .match_body(mockito::Matcher::Regex(
                "WHERE company_project_id IS NULL ORDER BY company_id".to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"jobComplete": true}"#)
            .create();

        let bigquery = BigQueryClient::with_base_url(&AccessToken::new("t"), server.url());
        let directory = CompanyDirectory::new(&bigquery, table());
        directory.list(CompanyFilter::Unprovisioned).unwrap();
        mock.assert();
    }

    #[test]
    fn query_failure_is_run_fatal() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/projects/src/queries")
            .with_status(403)
            .with_body(r#"{"error": {"message": "no access"}}"#)
            .create();

        let bigquery = BigQueryClient::with_base_url(&AccessToken::new("t"), server.url());
        let directory = CompanyDirectory::new(&bigquery, table());
        let err = directory.list(CompanyFilter::All).unwrap_err();
        assert!(err.is_run_fatal());
    }

    #[test]
    fn write_back_uses_named_parameters() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/projects/src/queries")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex("UPDATE".to_string()),
                mockito::Matcher::Regex("company_project_id = @project_id".to_string()),
                mockito::Matcher::PartialJsonString(
                    r#"{"queryParameters": [
                        {"name": "project_id", "parameterType": {"type": "STRING"}, "parameterValue": {"value": "acme-7"}},
                        {"name": "company_id", "parameterType": {"type": "INT64"}, "parameterValue": {"value": "7"}}
                    ]}"#
                    .to_string(),
                ),
            ]))
            .with_status(200)
            .with_body(r#"{"jobComplete": true}"#)
            .create();

        let bigquery = BigQueryClient::with_base_url(&AccessToken::new("t"), server.url());
        let directory = CompanyDirectory::new(&bigquery, table());
        directory.record_project_id(7, "acme-7").unwrap();
        mock.assert();
    }

    #[test]
    fn malformed_company_id_is_rejected() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/projects/src/queries")
            .with_status(200)
            .with_body(
                r#"{"jobComplete": true, "rows": [
                    {"f": [{"v": "not-a-number"}, {"v": "X"}, {"v": "X"}, {"v": null}]}
                ]}"#,
            )
            .create();

        let bigquery = BigQueryClient::with_base_url(&AccessToken::new("t"), server.url());
        let directory = CompanyDirectory::new(&bigquery, table());
        assert!(directory.list(CompanyFilter::All).is_err());
    }
}

//! BigQuery v2 REST client: parameterized queries against the companies
//! table, dataset metadata edits (authorized views, default table
//! expiration), and existence probes.

use crate::action::ViewRef;
use crate::error::{Error, Result};
use crate::gcp::{AccessToken, Rest};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

const ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct QueryParam {
    pub name: &'static str,
    pub param_type: &'static str,
    pub value: String,
}

impl QueryParam {
    pub fn string(name: &'static str, value: impl Into<String>) -> QueryParam {
        QueryParam {
            name,
            param_type: "STRING",
            value: value.into(),
        }
    }

    pub fn int64(name: &'static str, value: i64) -> QueryParam {
        QueryParam {
            name,
            param_type: "INT64",
            value: value.to_string(),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "parameterType": {"type": self.param_type},
            "parameterValue": {"value": self.value},
        })
    }
}

// ---------------------------------------------------------------------------
// Response shapes (only the fields we read)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "jobComplete", default)]
    job_complete: bool,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Value,
}

#[derive(Debug, Deserialize)]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<DatasetListEntry>,
}

#[derive(Debug, Deserialize)]
struct DatasetListEntry {
    #[serde(rename = "datasetReference")]
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
struct DatasetReference {
    #[serde(rename = "datasetId")]
    dataset_id: String,
}

// ---------------------------------------------------------------------------
// BigQueryClient
// ---------------------------------------------------------------------------

pub struct BigQueryClient {
    rest: Rest,
}

impl BigQueryClient {
    pub fn new(token: &AccessToken) -> Self {
        Self::with_base_url(token, ENDPOINT)
    }

    pub fn with_base_url(token: &AccessToken, base: impl Into<String>) -> Self {
        Self {
            rest: Rest::new(token, base, "bigquery"),
        }
    }

    /// Run a parameterized standard-SQL query and return its rows as cell
    /// strings (NULL cells become `None`). The companies table is small; the
    /// synchronous query path with no pagination is deliberate.
    pub fn query(
        &self,
        project: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Vec<Option<String>>>> {
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
        });
        if !params.is_empty() {
            body["parameterMode"] = json!("NAMED");
            body["queryParameters"] = Value::Array(params.iter().map(QueryParam::to_json).collect());
        }

        let value = self.rest.execute(
            self.rest
                .request(Method::POST, &format!("/projects/{project}/queries"))
                .json(&body),
            project,
            "query job",
        )?;
        let response: QueryResponse = serde_json::from_value(value)?;
        if !response.job_complete {
            return Err(Error::Api {
                api: "bigquery".to_string(),
                status: 0,
                message: "query did not complete within the synchronous window".to_string(),
            });
        }

        Ok(response
            .rows
            .into_iter()
            .map(|row| {
                row.f
                    .into_iter()
                    .map(|cell| match cell.v {
                        Value::String(s) => Some(s),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect()
            })
            .collect())
    }

    pub fn get_dataset(&self, project: &str, dataset: &str) -> Result<Option<Value>> {
        self.rest.execute_opt(
            self.rest
                .request(Method::GET, &format!("/projects/{project}/datasets/{dataset}")),
            project,
            &format!("dataset {project}:{dataset}"),
        )
    }

    pub fn dataset_exists(&self, project: &str, dataset: &str) -> Result<bool> {
        Ok(self.get_dataset(project, dataset)?.is_some())
    }

    pub fn create_dataset(&self, project: &str, dataset: &str, location: &str) -> Result<()> {
        let body = json!({
            "datasetReference": {"projectId": project, "datasetId": dataset},
            "location": location,
        });
        self.rest.execute(
            self.rest
                .request(Method::POST, &format!("/projects/{project}/datasets"))
                .json(&body),
            project,
            &format!("dataset {project}:{dataset}"),
        )?;
        Ok(())
    }

    pub fn list_dataset_ids(&self, project: &str) -> Result<Vec<String>> {
        let value = self.rest.execute(
            self.rest
                .request(Method::GET, &format!("/projects/{project}/datasets")),
            project,
            "dataset list",
        )?;
        let list: DatasetList = serde_json::from_value(value)?;
        Ok(list
            .datasets
            .into_iter()
            .map(|d| d.dataset_reference.dataset_id)
            .collect())
    }

    pub fn table_exists(&self, project: &str, dataset: &str, table: &str) -> Result<bool> {
        let value = self.rest.execute_opt(
            self.rest.request(
                Method::GET,
                &format!("/projects/{project}/datasets/{dataset}/tables/{table}"),
            ),
            project,
            &format!("table {project}:{dataset}.{table}"),
        )?;
        Ok(value.is_some())
    }

    // -- authorized views ---------------------------------------------------

    /// Whether the dataset's access list already carries this exact view.
    pub fn view_is_authorized(dataset: &Value, view: &ViewRef) -> bool {
        dataset
            .get("access")
            .and_then(Value::as_array)
            .is_some_and(|entries| entries.iter().any(|entry| entry_matches(entry, view)))
    }

    /// Append the view to the dataset's access list. The caller probes for
    /// membership first; re-adding an existing entry is still harmless
    /// because the membership test runs again on the freshly fetched list.
    pub fn authorize_view(&self, project: &str, dataset: &str, view: &ViewRef) -> Result<()> {
        let resource = format!("dataset {project}:{dataset}");
        let current = self
            .get_dataset(project, dataset)?
            .ok_or(Error::NotFound { resource })?;
        if Self::view_is_authorized(&current, view) {
            return Ok(());
        }

        let mut access = current
            .get("access")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        access.push(json!({
            "view": {
                "projectId": view.project_id,
                "datasetId": view.dataset_id,
                "tableId": view.table_id,
            }
        }));
        self.patch_dataset(project, dataset, json!({"access": access}))
    }

    /// Drop the view from the access list. Returns `false` when the entry
    /// was not present (nothing to patch).
    pub fn revoke_view(&self, project: &str, dataset: &str, view: &ViewRef) -> Result<bool> {
        let resource = format!("dataset {project}:{dataset}");
        let current = self
            .get_dataset(project, dataset)?
            .ok_or(Error::NotFound { resource })?;
        let Some(entries) = current.get("access").and_then(Value::as_array) else {
            return Ok(false);
        };

        let remaining: Vec<Value> = entries
            .iter()
            .filter(|entry| !entry_matches(entry, view))
            .cloned()
            .collect();
        if remaining.len() == entries.len() {
            return Ok(false);
        }
        self.patch_dataset(project, dataset, json!({"access": remaining}))?;
        Ok(true)
    }

    // -- table-level read grants -------------------------------------------

    /// Grant a member `dataViewer` on one table through the table's IAM
    /// policy (read-modify-write on getIamPolicy/setIamPolicy).
    pub fn grant_table_read(
        &self,
        project: &str,
        dataset: &str,
        table: &str,
        member: &str,
    ) -> Result<()> {
        let path =
            format!("/projects/{project}/datasets/{dataset}/tables/{table}:getIamPolicy");
        let policy = self.rest.execute(
            self.rest.request(Method::POST, &path).json(&json!({})),
            project,
            &format!("table {project}:{dataset}.{table}"),
        )?;

        let mut bindings = policy
            .get("bindings")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if binding_has_member(&bindings, "roles/bigquery.dataViewer", member) {
            return Ok(());
        }
        add_member(&mut bindings, "roles/bigquery.dataViewer", member);

        let mut updated = policy.clone();
        updated["bindings"] = Value::Array(bindings);
        let set_path =
            format!("/projects/{project}/datasets/{dataset}/tables/{table}:setIamPolicy");
        self.rest.execute(
            self.rest
                .request(Method::POST, &set_path)
                .json(&json!({"policy": updated})),
            project,
            &format!("table {project}:{dataset}.{table}"),
        )?;
        Ok(())
    }

    pub fn table_read_granted(
        &self,
        project: &str,
        dataset: &str,
        table: &str,
        member: &str,
    ) -> Result<bool> {
        let path =
            format!("/projects/{project}/datasets/{dataset}/tables/{table}:getIamPolicy");
        let policy = self.rest.execute(
            self.rest.request(Method::POST, &path).json(&json!({})),
            project,
            &format!("table {project}:{dataset}.{table}"),
        )?;
        let bindings = policy
            .get("bindings")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(binding_has_member(&bindings, "roles/bigquery.dataViewer", member))
    }

    // -- default table expiration ------------------------------------------

    /// Current `defaultTableExpirationMs`, `None` when unset. The REST field
    /// is a stringified int64.
    pub fn default_table_expiration_ms(
        &self,
        project: &str,
        dataset: &str,
    ) -> Result<Option<i64>> {
        let resource = format!("dataset {project}:{dataset}");
        let value = self
            .get_dataset(project, dataset)?
            .ok_or(Error::NotFound { resource })?;
        Ok(value
            .get("defaultTableExpirationMs")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok()))
    }

    pub fn set_default_table_expiration(
        &self,
        project: &str,
        dataset: &str,
        expiration_ms: i64,
    ) -> Result<()> {
        self.patch_dataset(
            project,
            dataset,
            json!({"defaultTableExpirationMs": expiration_ms.to_string()}),
        )
    }

    fn patch_dataset(&self, project: &str, dataset: &str, body: Value) -> Result<()> {
        self.rest.execute(
            self.rest
                .request(Method::PATCH, &format!("/projects/{project}/datasets/{dataset}"))
                .json(&body),
            project,
            &format!("dataset {project}:{dataset}"),
        )?;
        Ok(())
    }
}

fn entry_matches(entry: &Value, view: &ViewRef) -> bool {
    let Some(v) = entry.get("view") else {
        return false;
    };
    v.get("projectId").and_then(Value::as_str) == Some(view.project_id.as_str())
        && v.get("datasetId").and_then(Value::as_str) == Some(view.dataset_id.as_str())
        && v.get("tableId").and_then(Value::as_str) == Some(view.table_id.as_str())
}

pub(crate) fn binding_has_member(bindings: &[Value], role: &str, member: &str) -> bool {
    bindings.iter().any(|b| {
        b.get("role").and_then(Value::as_str) == Some(role)
            && b.get("members")
                .and_then(Value::as_array)
                .is_some_and(|m| m.iter().any(|v| v.as_str() == Some(member)))
    })
}

pub(crate) fn add_member(bindings: &mut Vec<Value>, role: &str, member: &str) {
    for binding in bindings.iter_mut() {
        if binding.get("role").and_then(Value::as_str) == Some(role) {
            if let Some(members) = binding.get_mut("members").and_then(Value::as_array_mut) {
                members.push(Value::String(member.to_string()));
                return;
            }
        }
    }
    bindings.push(json!({"role": role, "members": [member]}));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> BigQueryClient {
        BigQueryClient::with_base_url(&AccessToken::new("test-token"), server.url())
    }

    fn view() -> ViewRef {
        ViewRef {
            project_id: "platform-partners-des".into(),
            dataset_id: "bronze".into(),
            table_id: "consolidated_call".into(),
        }
    }

    #[test]
    fn query_parses_rows_and_nulls() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/projects/src/queries")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"useLegacySql": false}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"jobComplete": true, "rows": [
                    {"f": [{"v": "7"}, {"v": "Acme Co"}, {"v": null}]}
                ]}"#,
            )
            .create();

        let rows = client(&server).query("src", "SELECT 1", &[]).unwrap();
        mock.assert();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_deref(), Some("7"));
        assert_eq!(rows[0][2], None);
    }

    #[test]
    fn incomplete_query_is_an_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/projects/src/queries")
            .with_status(200)
            .with_body(r#"{"jobComplete": false}"#)
            .create();

        assert!(client(&server).query("src", "SELECT 1", &[]).is_err());
    }

    #[test]
    fn query_sends_named_parameters() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/projects/src/queries")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"parameterMode": "NAMED", "queryParameters": [
                    {"name": "company_id", "parameterType": {"type": "INT64"}, "parameterValue": {"value": "7"}}
                ]}"#
                .to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"jobComplete": true}"#)
            .create();

        client(&server)
            .query("src", "UPDATE x", &[QueryParam::int64("company_id", 7)])
            .unwrap();
        mock.assert();
    }

    #[test]
    fn missing_dataset_is_none_not_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/bronze")
            .with_status(404)
            .with_body(r#"{"error": {"message": "Not found"}}"#)
            .create();

        assert!(!client(&server).dataset_exists("acme-7", "bronze").unwrap());
    }

    #[test]
    fn authorize_view_appends_and_patches() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/servicetitan_acme_7")
            .with_status(200)
            .with_body(r#"{"access": [{"role": "OWNER", "userByEmail": "o@x.com"}]}"#)
            .create();
        let patch = server
            .mock("PATCH", "/projects/acme-7/datasets/servicetitan_acme_7")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"access": [
                    {"role": "OWNER", "userByEmail": "o@x.com"},
                    {"view": {"projectId": "platform-partners-des", "datasetId": "bronze", "tableId": "consolidated_call"}}
                ]}"#
                .to_string(),
            ))
            .with_status(200)
            .with_body("{}")
            .create();

        client(&server)
            .authorize_view("acme-7", "servicetitan_acme_7", &view())
            .unwrap();
        patch.assert();
    }

    #[test]
    fn authorize_view_already_present_issues_no_patch() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/servicetitan_acme_7")
            .with_status(200)
            .with_body(
                r#"{"access": [{"view": {"projectId": "platform-partners-des", "datasetId": "bronze", "tableId": "consolidated_call"}}]}"#,
            )
            .create();
        let patch = server
            .mock("PATCH", "/projects/acme-7/datasets/servicetitan_acme_7")
            .expect(0)
            .create();

        client(&server)
            .authorize_view("acme-7", "servicetitan_acme_7", &view())
            .unwrap();
        patch.assert();
    }

    #[test]
    fn revoke_view_filters_the_entry() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/servicetitan_acme_7")
            .with_status(200)
            .with_body(
                r#"{"access": [
                    {"role": "OWNER", "userByEmail": "o@x.com"},
                    {"view": {"projectId": "platform-partners-des", "datasetId": "bronze", "tableId": "consolidated_call"}}
                ]}"#,
            )
            .create();
        let patch = server
            .mock("PATCH", "/projects/acme-7/datasets/servicetitan_acme_7")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"access": [{"role": "OWNER", "userByEmail": "o@x.com"}]}"#.to_string(),
            ))
            .with_status(200)
            .with_body("{}")
            .create();

        let removed = client(&server)
            .revoke_view("acme-7", "servicetitan_acme_7", &view())
            .unwrap();
        assert!(removed);
        patch.assert();
    }

    #[test]
    fn revoke_absent_view_reports_false() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/servicetitan_acme_7")
            .with_status(200)
            .with_body(r#"{"access": []}"#)
            .create();

        let removed = client(&server)
            .revoke_view("acme-7", "servicetitan_acme_7", &view())
            .unwrap();
        assert!(!removed);
    }

    #[test]
    fn expiration_round_trip() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets/bronze")
            .with_status(200)
            .with_body(r#"{"defaultTableExpirationMs": "7776000000"}"#)
            .create();

        let ms = client(&server)
            .default_table_expiration_ms("acme-7", "bronze")
            .unwrap();
        assert_eq!(ms, Some(7_776_000_000));
    }

    #[test]
    fn permission_error_maps_to_taxonomy() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/projects/acme-7/datasets")
            .with_status(403)
            .with_body(r#"{"error": {"message": "caller lacks bigquery.datasets.list"}}"#)
            .create();

        let err = client(&server).list_dataset_ids("acme-7").unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[test]
    fn grant_table_read_adds_binding_once() {
        let mut server = mockito::Server::new();
        server
            .mock(
                "POST",
                "/projects/acme-7/datasets/servicetitan_acme_7/tables/call:getIamPolicy",
            )
            .with_status(200)
            .with_body(r#"{"etag": "abc", "bindings": []}"#)
            .create();
        let set = server
            .mock(
                "POST",
                "/projects/acme-7/datasets/servicetitan_acme_7/tables/call:setIamPolicy",
            )
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"policy": {"bindings": [{"role": "roles/bigquery.dataViewer", "members": ["serviceAccount:sa@x.iam.gserviceaccount.com"]}]}}"#
                    .to_string(),
            ))
            .with_status(200)
            .with_body("{}")
            .create();

        client(&server)
            .grant_table_read(
                "acme-7",
                "servicetitan_acme_7",
                "call",
                "serviceAccount:sa@x.iam.gserviceaccount.com",
            )
            .unwrap();
        set.assert();
    }
}

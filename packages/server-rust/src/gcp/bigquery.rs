//! BigQuery [`QueryEngine`] over the v2 REST API.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context as _};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{encode_path_segment, ensure_success, GcpClient};
use crate::traits::{QueryEngine, TableRef};

/// Production endpoint.
pub const BIGQUERY_URL: &str = "https://bigquery.googleapis.com";

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    error_result: Option<Value>,
}

pub struct BigQueryClient {
    client: GcpClient,
}

impl BigQueryClient {
    #[must_use]
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    /// Creates the dataset, treating "already exists" as success.
    async fn ensure_dataset(&self, project_id: &str, dataset_id: &str) -> anyhow::Result<()> {
        let path = format!("/bigquery/v2/projects/{}/datasets", encode_path_segment(project_id));
        let response = self
            .client
            .request(Method::POST, &path)
            .await?
            .json(&json!({
                "datasetReference": { "projectId": project_id, "datasetId": dataset_id }
            }))
            .send()
            .await
            .context("creating dataset")?;
        if response.status() == StatusCode::CONFLICT {
            debug!(dataset_id, "dataset already exists");
            return Ok(());
        }
        ensure_success(response, "dataset creation").await?;
        info!(dataset_id, "dataset created");
        Ok(())
    }

    async fn insert_job(
        &self,
        sql: &str,
        parameter: (&str, &str),
        destination: &TableRef,
    ) -> anyhow::Result<Job> {
        let path = format!(
            "/bigquery/v2/projects/{}/jobs",
            encode_path_segment(&destination.project_id)
        );
        let response = self
            .client
            .request(Method::POST, &path)
            .await?
            .json(&query_job_body(sql, parameter, destination))
            .send()
            .await
            .context("inserting query job")?;
        ensure_success(response, "query job insert")
            .await?
            .json()
            .await
            .context("parsing job")
    }

    async fn get_job(&self, project_id: &str, reference: &JobReference) -> anyhow::Result<Job> {
        let path = format!(
            "/bigquery/v2/projects/{}/jobs/{}",
            encode_path_segment(project_id),
            encode_path_segment(&reference.job_id)
        );
        let mut request = self.client.request(Method::GET, &path).await?;
        if let Some(location) = &reference.location {
            request = request.query(&[("location", location)]);
        }
        let response = request.send().await.context("polling query job")?;
        ensure_success(response, "query job poll")
            .await?
            .json()
            .await
            .context("parsing job")
    }
}

fn query_job_body(sql: &str, (name, value): (&str, &str), destination: &TableRef) -> Value {
    json!({
        "configuration": {
            "query": {
                "query": sql,
                "useLegacySql": false,
                "parameterMode": "NAMED",
                "queryParameters": [{
                    "name": name,
                    "parameterType": { "type": "STRING" },
                    "parameterValue": { "value": value },
                }],
                "destinationTable": {
                    "projectId": destination.project_id,
                    "datasetId": destination.dataset_id,
                    "tableId": destination.table_id,
                },
                "createDisposition": "CREATE_IF_NEEDED",
                "writeDisposition": "WRITE_TRUNCATE",
            }
        }
    })
}

/// Polls with `fetch` every [`POLL_INTERVAL`] until the job reports `DONE`.
/// Long-running jobs are waited out; there is no deadline.
async fn wait_for_job<F, Fut>(mut job: Job, mut fetch: F) -> anyhow::Result<Job>
where
    F: FnMut(JobReference) -> Fut,
    Fut: Future<Output = anyhow::Result<Job>>,
{
    while !check_done(&job)? {
        debug!(job_id = %job.job_reference.job_id, state = %job.status.state, "query job pending");
        tokio::time::sleep(POLL_INTERVAL).await;
        job = fetch(job.job_reference.clone()).await?;
    }
    Ok(job)
}

fn check_done(job: &Job) -> anyhow::Result<bool> {
    if job.status.state != "DONE" {
        return Ok(false);
    }
    match &job.status.error_result {
        Some(error) => bail!("query job {} failed: {error}", job.job_reference.job_id),
        None => Ok(true),
    }
}

#[async_trait]
impl QueryEngine for BigQueryClient {
    async fn run_into_table(
        &self,
        sql: &str,
        parameter: (&str, &str),
        destination: &TableRef,
    ) -> anyhow::Result<String> {
        self.ensure_dataset(&destination.project_id, &destination.dataset_id)
            .await?;

        let inserted = self.insert_job(sql, parameter, destination).await?;
        let project_id = destination.project_id.as_str();
        let job = wait_for_job(inserted, |reference| async move {
            self.get_job(project_id, &reference).await
        })
        .await?;
        Ok(job.job_reference.job_id)
    }
}

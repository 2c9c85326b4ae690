//! Query stage: materializes per-country case counts into a table.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use relay_core::{CanonicalPayload, ReplyPayload, RequestContext};
use serde::Serialize;
use tracing::info;

use super::{expect_text, Stage, StageOutcome};
use crate::error::DomainOperationError;
use crate::traits::{QueryEngine, TableRef};

/// Dataset the result tables are written to.
pub const DATASET_ID: &str = "covid19_jhu_csse";

const QUERY: &str = "SELECT date, SUM(confirmed) num_reports \
    FROM `bigquery-public-data.covid19_jhu_csse.summary` \
    WHERE country_region = @country \
    GROUP BY date \
    ORDER BY date ASC";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryCompleted<'a> {
    dataset_id: &'a str,
    table_id: &'a str,
    country: &'a str,
}

pub struct QueryStage {
    engine: Arc<dyn QueryEngine>,
    project_id: String,
}

impl QueryStage {
    #[must_use]
    pub fn new(engine: Arc<dyn QueryEngine>, project_id: impl Into<String>) -> Self {
        Self {
            engine,
            project_id: project_id.into(),
        }
    }
}

/// Table name for `country`: spaces removed, lowercased.
///
/// # Errors
///
/// Rejects empty names and names with characters a table id cannot hold.
pub fn table_id_for(country: &str) -> Result<String, DomainOperationError> {
    let table_id: String = country
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if table_id.is_empty() {
        return Err(DomainOperationError::Rejected("country is empty".to_string()));
    }
    if !table_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(DomainOperationError::Rejected(format!(
            "country `{country}` cannot be used as a table name"
        )));
    }
    Ok(table_id)
}

#[async_trait]
impl Stage for QueryStage {
    fn name(&self) -> &'static str {
        "query"
    }

    async fn invoke(
        &self,
        payload: CanonicalPayload,
        ctx: &RequestContext,
    ) -> Result<StageOutcome, DomainOperationError> {
        let text = expect_text(self.name(), payload)?;
        let country = text.trim();
        let destination = TableRef {
            project_id: self.project_id.clone(),
            dataset_id: DATASET_ID.to_string(),
            table_id: table_id_for(country)?,
        };

        let job_id = self
            .engine
            .run_into_table(QUERY, ("country", country), &destination)
            .await
            .with_context(|| format!("querying cases for {country}"))?;
        info!(
            request_id = %ctx.request_id,
            country,
            table = %destination.table_id,
            job_id,
            "query completed"
        );

        let reply = ReplyPayload::from_serializable(&QueryCompleted {
            dataset_id: &destination.dataset_id,
            table_id: &destination.table_id,
            country,
        })
        .context("encoding query reply")?;
        Ok(StageOutcome::Reply(reply))
    }
}

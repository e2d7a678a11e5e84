use std::fmt;
use std::time::Duration;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use gcp_bigquery_client::Client;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::tabledata::ListQueryParameters;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::bigquery::encoding::{multipart_related_body, record_batch_to_ndjson, rows_to_record_batch};
use crate::bigquery::model::{
    Job, JobConfiguration, JobConfigurationLoad, JobReference, QueryResultsPage, TableDataPage,
    TableSchema,
};
use crate::bigquery::read::BigQueryReadClient;
use crate::bigquery::rest::RestTransport;
use crate::clients::{LoadJob, QueryJob, WarehouseClient};
use crate::error::{BqError, BqResult, ErrorKind};
use crate::types::{JobError, LoadJobConfig, MaterializeOptions, TableReference};
use crate::{bail, bq_error};

/// Source format of the data uploaded by [`BigQueryClient::load_table`].
const LOAD_SOURCE_FORMAT: &str = "NEWLINE_DELIMITED_JSON";

/// First delay between two load job status polls.
const INITIAL_POLL_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for the delay between two load job status polls.
const MAX_POLL_DELAY: Duration = Duration::from_secs(5);

/// Converts [`BQError`] to [`BqError`] with appropriate error kind.
///
/// Maps errors based on their semantic meaning: authentication problems, transport failures,
/// failed requests and data shape errors. Error responses map to [`ErrorKind::QueryFailed`].
pub(crate) fn bq_error_to_bq_error(err: BQError) -> BqError {
    bq_error_with_failure_kind(err, ErrorKind::QueryFailed)
}

/// Like [`bq_error_to_bq_error`], with error responses other than authorization failures
/// mapped to `failure_kind`.
pub(crate) fn bq_error_with_failure_kind(err: BQError, failure_kind: ErrorKind) -> BqError {
    if let BQError::ResponseError { error } = &err {
        let kind = match error.error.code {
            401 | 403 => ErrorKind::AuthenticationError,
            _ => failure_kind,
        };
        let job_errors = error
            .error
            .errors
            .iter()
            .map(|entry| JobError {
                reason: entry.get("reason").cloned(),
                location: entry.get("location").cloned(),
                message: entry.get("message").cloned(),
            })
            .collect();
        let detail = format!("{}: {}", error.error.code, error.error.message);

        return bq_error!(kind, "BigQuery response error", detail, source: err)
            .with_job_errors(job_errors);
    }

    let (kind, description) = match &err {
        // Authentication related errors
        BQError::InvalidServiceAccountKey(_) => (
            ErrorKind::InvalidCredentials,
            "Invalid BigQuery service account key",
        ),
        BQError::InvalidServiceAccountAuthenticator(_)
        | BQError::InvalidInstalledFlowAuthenticator(_)
        | BQError::InvalidApplicationDefaultCredentialsAuthenticator(_)
        | BQError::InvalidAuthorizedUserAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Failed to build BigQuery authenticator",
        ),
        BQError::AuthError(_) | BQError::YupAuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication error",
        ),
        BQError::NoToken => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication token missing",
        ),

        // Transport errors
        BQError::RequestError(_)
        | BQError::TonicTransportError(_)
        | BQError::TonicStatusError(_) => (ErrorKind::RemoteIoError, "BigQuery request failed"),

        // Data errors
        BQError::InvalidColumnIndex { .. } | BQError::InvalidColumnName { .. } => {
            (ErrorKind::InvalidData, "BigQuery invalid column reference")
        }
        BQError::InvalidColumnType { .. } => {
            (ErrorKind::ConversionError, "BigQuery column type mismatch")
        }
        BQError::SerializationError(_) => (
            ErrorKind::SerializationError,
            "BigQuery JSON serialization error",
        ),

        _ => (ErrorKind::Unknown, "Unexpected BigQuery client error"),
    };

    bq_error!(kind, description, err.to_string(), source: err)
}

/// Reads a library response through the local model of the same REST resource.
fn from_library_model<T: Serialize, U: DeserializeOwned>(value: &T) -> BqResult<U> {
    Ok(serde_json::from_value(serde_json::to_value(value)?)?)
}

fn query_results_parameters(
    job_reference: &JobReference,
    page_token: Option<&str>,
    max_results: Option<u32>,
    timeout: Option<Duration>,
) -> GetQueryResultsParameters {
    GetQueryResultsParameters {
        location: job_reference.location.clone(),
        max_results: max_results.map(|max| i32::try_from(max).unwrap_or(i32::MAX)),
        page_token: page_token.map(str::to_string),
        timeout_ms: timeout.map(|timeout| i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)),
        ..GetQueryResultsParameters::default()
    }
}

fn table_rows_parameters(start_index: u64, max_results: u64) -> ListQueryParameters {
    ListQueryParameters {
        start_index: Some(start_index.to_string()),
        max_results: Some(u32::try_from(max_results).unwrap_or(u32::MAX)),
        page_token: None,
        selected_fields: None,
        format_options: None,
    }
}

/// Fetches one page of a query's results; `max_results = Some(0)` only polls for completion.
pub(crate) async fn get_query_results(
    client: &Client,
    job_reference: &JobReference,
    page_token: Option<&str>,
    max_results: Option<u32>,
    timeout: Option<Duration>,
) -> BqResult<QueryResultsPage> {
    let parameters = query_results_parameters(job_reference, page_token, max_results, timeout);
    let response = client
        .job()
        .get_query_results(&job_reference.project_id, &job_reference.job_id, parameters)
        .await
        .map_err(bq_error_to_bq_error)?;

    from_library_model(&response)
}

/// Fetches a job resource, mapping error responses to `failure_kind`.
pub(crate) async fn get_job(
    client: &Client,
    job_reference: &JobReference,
    failure_kind: ErrorKind,
) -> BqResult<Job> {
    let job = client
        .job()
        .get_job(
            &job_reference.project_id,
            &job_reference.job_id,
            job_reference.location.as_deref(),
        )
        .await
        .map_err(|err| bq_error_with_failure_kind(err, failure_kind))?;

    from_library_model(&job)
}

/// Lists up to `max_results` rows of `table` starting at `start_index`.
pub(crate) async fn list_table_rows(
    client: &Client,
    table: &TableReference,
    start_index: u64,
    max_results: u64,
) -> BqResult<TableDataPage> {
    let response = client
        .tabledata()
        .list(
            &table.project_id,
            &table.dataset_id,
            &table.table_id,
            table_rows_parameters(start_index, max_results),
        )
        .await
        .map_err(bq_error_to_bq_error)?;

    from_library_model(&response)
}

/// Query and load client backed by `gcp_bigquery_client`, with load uploads over REST.
pub struct BigQueryClient {
    project_id: String,
    client: Client,
    rest: RestTransport,
}

impl BigQueryClient {
    pub(crate) fn new(project_id: String, client: Client, rest: RestTransport) -> Self {
        Self {
            project_id,
            client,
            rest,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .finish()
    }
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    type ReadClient = BigQueryReadClient;
    type QueryJob = BigQueryQueryJob;
    type LoadJob = BigQueryLoadJob;

    async fn query(&self, sql: &str) -> BqResult<BigQueryQueryJob> {
        let response = self
            .client
            .job()
            .query(&self.project_id, QueryRequest::new(sql))
            .await
            .map_err(bq_error_to_bq_error)?;

        let first_page: QueryResultsPage = from_library_model(&response)?;
        let Some(job_reference) = first_page.job_reference.clone() else {
            bail!(
                ErrorKind::InvalidData,
                "BigQuery query response has no job reference"
            );
        };

        debug!(job_id = %job_reference.job_id, "query job submitted");

        Ok(BigQueryQueryJob {
            client: self.client.clone(),
            job_reference,
            first_page,
        })
    }

    async fn load_table(
        &self,
        data: &RecordBatch,
        destination: &TableReference,
        config: &LoadJobConfig,
    ) -> BqResult<BigQueryLoadJob> {
        let job = load_job_resource(destination, config);
        let metadata = serde_json::to_vec(&job).map_err(|err| {
            bq_error!(
                ErrorKind::SerializationError,
                "Failed to encode BigQuery load job",
                err.to_string(),
                source: err
            )
        })?;
        let rows = record_batch_to_ndjson(data)?;

        let boundary = Uuid::new_v4().simple().to_string();
        let (body, content_type) = multipart_related_body(&metadata, &rows, &boundary);

        let submitted = self
            .rest
            .upload_job(&self.project_id, body, content_type)
            .await?;
        let Some(job_reference) = submitted.job_reference.clone() else {
            bail!(
                ErrorKind::InvalidData,
                "BigQuery load job response has no job reference"
            );
        };

        debug!(job_id = %job_reference.job_id, %destination, "load job submitted");

        Ok(BigQueryLoadJob {
            client: self.client.clone(),
            job_reference,
            latest: submitted,
            outcome: None,
        })
    }
}

/// Builds the job resource describing a load into `destination`.
fn load_job_resource(destination: &TableReference, config: &LoadJobConfig) -> Job {
    let schema = config.schema.as_ref().map(|fields| TableSchema {
        fields: fields.iter().map(Into::into).collect(),
    });

    Job {
        configuration: Some(JobConfiguration {
            load: Some(JobConfigurationLoad {
                destination_table: destination.clone(),
                source_format: LOAD_SOURCE_FORMAT.to_string(),
                create_disposition: config.create_disposition,
                write_disposition: config.write_disposition,
                autodetect: config.autodetect,
                schema,
            }),
            ..JobConfiguration::default()
        }),
        ..Job::default()
    }
}

/// A query submitted through [`BigQueryClient::query`].
pub struct BigQueryQueryJob {
    client: Client,
    job_reference: JobReference,
    first_page: QueryResultsPage,
}

impl BigQueryQueryJob {
    pub fn job_reference(&self) -> &JobReference {
        &self.job_reference
    }
}

impl fmt::Debug for BigQueryQueryJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryQueryJob")
            .field("job_reference", &self.job_reference)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QueryJob for BigQueryQueryJob {
    type ReadClient = BigQueryReadClient;

    async fn to_record_batch(
        self,
        read_client: Option<&BigQueryReadClient>,
        options: &MaterializeOptions,
    ) -> BqResult<RecordBatch> {
        match read_client {
            Some(read_client) => {
                read_client
                    .read_query_results(&self.job_reference, options)
                    .await
            }
            None => {
                page_query_results(&self.client, &self.job_reference, self.first_page, options)
                    .await
            }
        }
    }
}

/// Materializes a query by following `jobs.getQueryResults` page tokens.
///
/// Starts from `first_page` and polls until the job completes.
pub(crate) async fn page_query_results(
    client: &Client,
    job_reference: &JobReference,
    first_page: QueryResultsPage,
    options: &MaterializeOptions,
) -> BqResult<RecordBatch> {
    let mut page = first_page;
    while !page.is_complete() {
        page = get_query_results(client, job_reference, None, Some(0), options.timeout).await?;
    }

    let mut schema = page.schema.take();
    let mut rows = Vec::new();
    let limit = options.max_rows.and_then(|max| usize::try_from(max).ok());

    // A completed poll without rows still has to fetch the first page.
    let mut next_token = if page.rows.is_empty() && page.total_rows().unwrap_or(0) > 0 {
        Some(None)
    } else {
        rows.append(&mut page.rows);
        page.page_token.take().map(Some)
    };

    while let Some(token) = next_token {
        if limit.is_some_and(|limit| rows.len() >= limit) {
            break;
        }

        let mut page = get_query_results(
            client,
            job_reference,
            token.as_deref(),
            options.page_size,
            options.timeout,
        )
        .await?;
        if schema.is_none() {
            schema = page.schema.take();
        }
        rows.append(&mut page.rows);
        next_token = page.page_token.take().map(Some);
    }

    if let Some(limit) = limit {
        rows.truncate(limit);
    }

    rows_to_record_batch(&schema.unwrap_or_default(), &rows)
}

/// Terminal result of a load job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LoadOutcome {
    errors: Vec<JobError>,
    output_rows: Option<u64>,
}

/// Returns the outcome of `job` once it reached state `DONE`.
fn load_outcome(job: &Job) -> Option<LoadOutcome> {
    let status = job.status.as_ref()?;
    if !status.is_done() {
        return None;
    }

    let output_rows = job
        .statistics
        .as_ref()
        .and_then(|statistics| statistics.load.as_ref())
        .and_then(|load| load.output_rows.as_deref())
        .and_then(|rows| rows.parse().ok());

    Some(LoadOutcome {
        errors: status.all_errors(),
        output_rows,
    })
}

/// A load job submitted through [`BigQueryClient::load_table`].
pub struct BigQueryLoadJob {
    client: Client,
    job_reference: JobReference,
    latest: Job,
    outcome: Option<LoadOutcome>,
}

impl BigQueryLoadJob {
    pub fn job_reference(&self) -> &JobReference {
        &self.job_reference
    }
}

impl fmt::Debug for BigQueryLoadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryLoadJob")
            .field("job_reference", &self.job_reference)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LoadJob for BigQueryLoadJob {
    async fn wait(&mut self) -> BqResult<()> {
        let mut delay = INITIAL_POLL_DELAY;

        loop {
            if let Some(outcome) = load_outcome(&self.latest) {
                debug!(job_id = %self.job_reference.job_id, "load job finished");
                self.outcome = Some(outcome);

                return Ok(());
            }

            sleep(delay).await;
            delay = (delay * 2).min(MAX_POLL_DELAY);

            self.latest =
                get_job(&self.client, &self.job_reference, ErrorKind::LoadJobFailed).await?;
        }
    }

    fn errors(&self) -> &[JobError] {
        self.outcome
            .as_ref()
            .map(|outcome| outcome.errors.as_slice())
            .unwrap_or_default()
    }

    fn output_rows(&self) -> Option<u64> {
        self.outcome.as_ref().and_then(|outcome| outcome.output_rows)
    }
}

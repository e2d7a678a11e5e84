use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::clients::{
    ClientFactory, Credentials, LoadJob, QueryJob, ReadClient, WarehouseClient,
};
use crate::error::{BqError, BqResult};
use crate::types::{JobError, LoadJobConfig, MaterializeOptions, TableReference};

/// A load job as received by [`MockWarehouseClient::load_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLoad {
    pub destination: TableReference,
    pub config: LoadJobConfig,
    pub row_count: usize,
}

/// A materialization request received by [`MockQueryJob::to_record_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMaterialization {
    pub sql: String,
    pub read_client_passed: bool,
    pub options: MaterializeOptions,
}

#[derive(Debug, Default)]
struct Behavior {
    query_result: Option<RecordBatch>,
    query_error: Option<BqError>,
    load_errors: Vec<JobError>,
    output_rows: Option<Option<u64>>,
    client_error: Option<BqError>,
    read_client_error: Option<BqError>,
}

#[derive(Debug, Default)]
struct Calls {
    clients_created: usize,
    read_clients_created: usize,
    credentials: Vec<Credentials>,
    project_ids: Vec<String>,
    queries: Vec<String>,
    materializations: Vec<RecordedMaterialization>,
    loads: Vec<RecordedLoad>,
    waits: usize,
    read_client_closes: usize,
}

#[derive(Debug, Default)]
struct Inner {
    behavior: Behavior,
    calls: Calls,
}

type SharedInner = Arc<Mutex<Inner>>;

fn lock(inner: &SharedInner) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory producing in-memory clients that record every call.
///
/// Clones share their configuration and recorded calls, so a test can keep one clone for
/// assertions while the connector owns another.
#[derive(Debug, Clone, Default)]
pub struct MockClientFactory {
    inner: SharedInner,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result returned by every query. Defaults to an empty batch without columns.
    pub fn with_query_result(self, batch: RecordBatch) -> Self {
        lock(&self.inner).behavior.query_result = Some(batch);
        self
    }

    /// Makes every query submission fail with `error`.
    pub fn with_query_error(self, error: BqError) -> Self {
        lock(&self.inner).behavior.query_error = Some(error);
        self
    }

    /// Errors reported by every finished load job.
    pub fn with_load_errors(self, errors: Vec<JobError>) -> Self {
        lock(&self.inner).behavior.load_errors = errors;
        self
    }

    /// Row count reported by every successful load job. Defaults to the number of input rows.
    pub fn with_output_rows(self, output_rows: Option<u64>) -> Self {
        lock(&self.inner).behavior.output_rows = Some(output_rows);
        self
    }

    /// Makes building the query/load client fail with `error`.
    pub fn with_client_error(self, error: BqError) -> Self {
        lock(&self.inner).behavior.client_error = Some(error);
        self
    }

    /// Makes building the read client fail with `error`.
    pub fn with_read_client_error(self, error: BqError) -> Self {
        lock(&self.inner).behavior.read_client_error = Some(error);
        self
    }

    pub fn clients_created(&self) -> usize {
        lock(&self.inner).calls.clients_created
    }

    pub fn read_clients_created(&self) -> usize {
        lock(&self.inner).calls.read_clients_created
    }

    /// Credentials passed to each client creation.
    pub fn credentials(&self) -> Vec<Credentials> {
        lock(&self.inner).calls.credentials.clone()
    }

    /// Project ids passed to each query/load client creation.
    pub fn project_ids(&self) -> Vec<String> {
        lock(&self.inner).calls.project_ids.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.inner).calls.queries.clone()
    }

    pub fn materializations(&self) -> Vec<RecordedMaterialization> {
        lock(&self.inner).calls.materializations.clone()
    }

    pub fn loads(&self) -> Vec<RecordedLoad> {
        lock(&self.inner).calls.loads.clone()
    }

    pub fn wait_count(&self) -> usize {
        lock(&self.inner).calls.waits
    }

    pub fn read_client_closes(&self) -> usize {
        lock(&self.inner).calls.read_client_closes
    }

    /// Number of calls that would have reached BigQuery.
    pub fn remote_calls(&self) -> usize {
        let inner = lock(&self.inner);
        let calls = &inner.calls;

        calls.clients_created
            + calls.read_clients_created
            + calls.queries.len()
            + calls.materializations.len()
            + calls.loads.len()
            + calls.waits
    }
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    type Client = MockWarehouseClient;

    async fn create_client(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> BqResult<MockWarehouseClient> {
        let mut inner = lock(&self.inner);
        inner.calls.clients_created += 1;
        inner.calls.credentials.push(credentials.clone());
        inner.calls.project_ids.push(project_id.to_string());
        if let Some(error) = inner.behavior.client_error.clone() {
            return Err(error);
        }

        Ok(MockWarehouseClient {
            inner: Arc::clone(&self.inner),
        })
    }

    async fn create_read_client(&self, credentials: &Credentials) -> BqResult<MockReadClient> {
        let mut inner = lock(&self.inner);
        inner.calls.read_clients_created += 1;
        inner.calls.credentials.push(credentials.clone());
        if let Some(error) = inner.behavior.read_client_error.clone() {
            return Err(error);
        }

        Ok(MockReadClient {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// In-memory query/load client created by [`MockClientFactory`].
#[derive(Debug)]
pub struct MockWarehouseClient {
    inner: SharedInner,
}

#[async_trait]
impl WarehouseClient for MockWarehouseClient {
    type ReadClient = MockReadClient;
    type QueryJob = MockQueryJob;
    type LoadJob = MockLoadJob;

    async fn query(&self, sql: &str) -> BqResult<MockQueryJob> {
        let mut inner = lock(&self.inner);
        inner.calls.queries.push(sql.to_string());
        if let Some(error) = inner.behavior.query_error.clone() {
            return Err(error);
        }

        let result = inner
            .behavior
            .query_result
            .clone()
            .unwrap_or_else(|| RecordBatch::new_empty(Arc::new(Schema::empty())));

        Ok(MockQueryJob {
            inner: Arc::clone(&self.inner),
            sql: sql.to_string(),
            result,
        })
    }

    async fn load_table(
        &self,
        data: &RecordBatch,
        destination: &TableReference,
        config: &LoadJobConfig,
    ) -> BqResult<MockLoadJob> {
        let mut inner = lock(&self.inner);
        inner.calls.loads.push(RecordedLoad {
            destination: destination.clone(),
            config: config.clone(),
            row_count: data.num_rows(),
        });

        Ok(MockLoadJob {
            inner: Arc::clone(&self.inner),
            pending_errors: inner.behavior.load_errors.clone(),
            errors: Vec::new(),
            output_rows: inner
                .behavior
                .output_rows
                .unwrap_or(Some(data.num_rows() as u64)),
            done: false,
        })
    }
}

/// Query job returning the batch configured on the factory.
#[derive(Debug)]
pub struct MockQueryJob {
    inner: SharedInner,
    sql: String,
    result: RecordBatch,
}

#[async_trait]
impl QueryJob for MockQueryJob {
    type ReadClient = MockReadClient;

    async fn to_record_batch(
        self,
        read_client: Option<&MockReadClient>,
        options: &MaterializeOptions,
    ) -> BqResult<RecordBatch> {
        lock(&self.inner)
            .calls
            .materializations
            .push(RecordedMaterialization {
                sql: self.sql,
                read_client_passed: read_client.is_some(),
                options: options.clone(),
            });

        Ok(self.result)
    }
}

/// Load job that finishes on its first wait with the errors configured on the factory.
#[derive(Debug)]
pub struct MockLoadJob {
    inner: SharedInner,
    pending_errors: Vec<JobError>,
    errors: Vec<JobError>,
    output_rows: Option<u64>,
    done: bool,
}

#[async_trait]
impl LoadJob for MockLoadJob {
    async fn wait(&mut self) -> BqResult<()> {
        lock(&self.inner).calls.waits += 1;
        self.errors = std::mem::take(&mut self.pending_errors);
        self.done = true;

        Ok(())
    }

    fn errors(&self) -> &[JobError] {
        &self.errors
    }

    fn output_rows(&self) -> Option<u64> {
        if self.done && self.errors.is_empty() {
            self.output_rows
        } else {
            None
        }
    }
}

/// Read client that only counts how often it was closed.
#[derive(Debug)]
pub struct MockReadClient {
    inner: SharedInner,
}

impl ReadClient for MockReadClient {
    fn close(&self) {
        lock(&self.inner).calls.read_client_closes += 1;
    }
}

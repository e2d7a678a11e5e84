//! Seams between the connection lifecycle and the remote BigQuery clients.
//!
//! [`crate::connector::BigQueryConnector`] only talks to these traits. The production
//! implementation lives in [`crate::bigquery`]; tests plug in the in-memory doubles from
//! `crate::test_utils`.

mod credentials;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::error::BqResult;
use crate::types::{JobError, LoadJobConfig, MaterializeOptions, TableReference};

pub use credentials::Credentials;

/// Read client type produced by a [`ClientFactory`].
pub type ReadClientOf<F> = <<F as ClientFactory>::Client as WarehouseClient>::ReadClient;

/// Builds the two remote clients a connector holds while open.
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    type Client: WarehouseClient;

    /// Builds the query and load client bound to `project_id`.
    async fn create_client(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> BqResult<Self::Client>;

    /// Builds the high-throughput read client.
    async fn create_read_client(&self, credentials: &Credentials) -> BqResult<ReadClientOf<Self>>;
}

/// Client that submits query and load jobs.
#[async_trait]
pub trait WarehouseClient: Send + Sync + 'static {
    type ReadClient: ReadClient;
    type QueryJob: QueryJob<ReadClient = Self::ReadClient>;
    type LoadJob: LoadJob;

    /// Submits `sql` as a query job.
    async fn query(&self, sql: &str) -> BqResult<Self::QueryJob>;

    /// Submits a load job writing `data` into `destination`.
    ///
    /// Returns once the job is accepted; use [`LoadJob::wait`] to await completion.
    async fn load_table(
        &self,
        data: &RecordBatch,
        destination: &TableReference,
        config: &LoadJobConfig,
    ) -> BqResult<Self::LoadJob>;
}

/// A submitted query whose result set can be materialized.
#[async_trait]
pub trait QueryJob: Send + Sync + Sized {
    type ReadClient: ReadClient;

    /// Collects the result set, downloading it through `read_client` when one is given.
    async fn to_record_batch(
        self,
        read_client: Option<&Self::ReadClient>,
        options: &MaterializeOptions,
    ) -> BqResult<RecordBatch>;
}

/// A submitted load job.
#[async_trait]
pub trait LoadJob: Send + Sync {
    /// Blocks until the job reaches its terminal state.
    async fn wait(&mut self) -> BqResult<()>;

    /// Errors reported by the job. Empty until [`LoadJob::wait`] returned.
    fn errors(&self) -> &[JobError];

    /// Rows written by the job, when reported.
    fn output_rows(&self) -> Option<u64>;
}

/// High-throughput read client.
pub trait ReadClient: Send + Sync + 'static {
    /// Releases the client's transport. Calling it twice is harmless.
    fn close(&self);
}

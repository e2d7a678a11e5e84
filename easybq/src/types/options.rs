use std::time::Duration;

use crate::bail;
use crate::error::{BqResult, ErrorKind};
use crate::types::{SchemaField, TableReference, WriteDisposition};

/// Options for [`crate::workers::FetchWorker::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Downloads the result through the high-throughput read client when `true`.
    pub use_read_client: bool,
    /// Forwarded untouched to the materialization step.
    pub materialize: MaterializeOptions,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_read_client: true,
            materialize: MaterializeOptions::default(),
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_client(mut self, use_read_client: bool) -> Self {
        self.use_read_client = use_read_client;
        self
    }

    pub fn with_materialize(mut self, materialize: MaterializeOptions) -> Self {
        self.materialize = materialize;
        self
    }
}

/// Knobs for turning a finished query into a [`arrow::record_batch::RecordBatch`].
///
/// `None` leaves the choice to the client implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeOptions {
    /// Rows requested per page or per downloaded range.
    pub page_size: Option<u32>,
    /// Stops after this many rows.
    pub max_rows: Option<u64>,
    /// Server-side wait per poll for the query to complete.
    pub timeout: Option<Duration>,
    /// Ranges downloaded at once by the read client.
    pub max_concurrency: Option<usize>,
}

/// Options for [`crate::workers::PushWorker::push`].
///
/// Destination segments left unset fall back to the connector's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    pub project_id: Option<String>,
    pub dataset: Option<String>,
    pub table: Option<String>,
    /// Explicit schema; when `None` BigQuery autodetects it.
    pub schema: Option<Vec<SchemaField>>,
    pub write_disposition: WriteDisposition,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_schema(mut self, schema: Vec<SchemaField>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_write_disposition(mut self, write_disposition: WriteDisposition) -> Self {
        self.write_disposition = write_disposition;
        self
    }

    /// Resolves the destination, taking each segment from these options or else from the
    /// matching default.
    pub fn destination(
        &self,
        default_project_id: Option<&str>,
        default_dataset: Option<&str>,
        default_table: Option<&str>,
    ) -> BqResult<TableReference> {
        Ok(TableReference {
            project_id: resolve_segment("project", self.project_id.as_deref(), default_project_id)?,
            dataset_id: resolve_segment("dataset", self.dataset.as_deref(), default_dataset)?,
            table_id: resolve_segment("table", self.table.as_deref(), default_table)?,
        })
    }
}

fn resolve_segment(
    segment: &'static str,
    override_value: Option<&str>,
    default_value: Option<&str>,
) -> BqResult<String> {
    match override_value.or(default_value) {
        Some(value) => Ok(value.to_string()),
        None => bail!(
            ErrorKind::ConfigError,
            "Load destination is incomplete",
            format!("no {segment} was given and the connector has no default {segment}")
        ),
    }
}

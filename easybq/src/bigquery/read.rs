use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use arrow::record_batch::RecordBatch;
use futures::{StreamExt, TryStreamExt, stream};
use gcp_bigquery_client::Client;
use tracing::{debug, info};

use crate::bail;
use crate::bigquery::client::{get_job, get_query_results, list_table_rows, page_query_results};
use crate::bigquery::encoding::rows_to_record_batch;
use crate::bigquery::model::{JobReference, QueryResultsPage, TableRow};
use crate::clients::ReadClient;
use crate::error::{BqResult, ErrorKind};
use crate::types::{MaterializeOptions, TableReference};

/// Rows requested per range when no page size is configured.
const DEFAULT_RANGE_SIZE: u64 = 10_000;

/// Ranges downloaded at once when no concurrency is configured.
const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// High-throughput reader that downloads a finished query's destination table in row ranges.
pub struct BigQueryReadClient {
    client: Client,
    closed: AtomicBool,
}

impl BigQueryReadClient {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits for the query to complete and downloads its result set.
    ///
    /// Statements without a destination table, such as DML, fall back to paging the results.
    pub async fn read_query_results(
        &self,
        job_reference: &JobReference,
        options: &MaterializeOptions,
    ) -> BqResult<RecordBatch> {
        if self.is_closed() {
            bail!(
                ErrorKind::ClientUnavailable,
                "BigQuery read client is closed."
            );
        }

        let mut status =
            get_query_results(&self.client, job_reference, None, Some(0), options.timeout).await?;
        while !status.is_complete() {
            status = get_query_results(&self.client, job_reference, None, Some(0), options.timeout)
                .await?;
        }

        let job = get_job(&self.client, job_reference, ErrorKind::QueryFailed).await?;
        let destination = job
            .configuration
            .and_then(|configuration| configuration.query)
            .and_then(|query| query.destination_table);
        let Some(destination) = destination else {
            debug!(job_id = %job_reference.job_id, "query has no destination table, paging results");
            return page_query_results(&self.client, job_reference, status, options).await;
        };

        self.download(&destination, status, options).await
    }

    async fn download(
        &self,
        destination: &TableReference,
        status: QueryResultsPage,
        options: &MaterializeOptions,
    ) -> BqResult<RecordBatch> {
        let total_rows = status.total_rows().unwrap_or(0);
        let row_count = options
            .max_rows
            .map_or(total_rows, |max_rows| max_rows.min(total_rows));
        let range_size = options
            .page_size
            .map_or(DEFAULT_RANGE_SIZE, u64::from)
            .max(1);
        let max_concurrency = options
            .max_concurrency
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1);

        let ranges = row_ranges(row_count, range_size);
        info!(%destination, row_count, ranges = ranges.len(), "downloading query results");

        let chunks: Vec<Vec<TableRow>> = stream::iter(ranges)
            .map(|(start, len)| self.read_range(destination, start, len))
            .buffered(max_concurrency)
            .try_collect()
            .await?;
        let rows: Vec<TableRow> = chunks.into_iter().flatten().collect();

        rows_to_record_batch(&status.schema.unwrap_or_default(), &rows)
    }

    /// Reads exactly `len` rows from `start`, following up when a response is truncated.
    async fn read_range(
        &self,
        table: &TableReference,
        start: u64,
        len: u64,
    ) -> BqResult<Vec<TableRow>> {
        let mut rows = Vec::new();

        while (rows.len() as u64) < len {
            if self.is_closed() {
                bail!(
                    ErrorKind::ClientUnavailable,
                    "BigQuery read client is closed."
                );
            }

            let offset = start + rows.len() as u64;
            let remaining = len - rows.len() as u64;
            let mut page = list_table_rows(&self.client, table, offset, remaining).await?;
            if page.rows.is_empty() {
                break;
            }
            page.rows.truncate(remaining as usize);
            rows.append(&mut page.rows);
        }

        Ok(rows)
    }
}

impl fmt::Debug for BigQueryReadClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryReadClient")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ReadClient for BigQueryReadClient {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closed bigquery read client");
        }
    }
}

/// Splits `[0, total)` into consecutive `(start, len)` ranges of at most `range_size` rows.
pub(crate) fn row_ranges(total: u64, range_size: u64) -> Vec<(u64, u64)> {
    let range_size = range_size.max(1);

    (0..total.div_ceil(range_size))
        .map(|index| {
            let start = index * range_size;
            (start, range_size.min(total - start))
        })
        .collect()
}

use std::fmt;

use arrow::record_batch::RecordBatch;
use tracing::{error, info};

use crate::clients::{ClientFactory, LoadJob, WarehouseClient};
use crate::connector::BigQueryConnector;
use crate::error::{BqResult, ErrorKind};
use crate::types::{CreateDisposition, LoadJobConfig, PushOptions};
use crate::{bail, bq_error};

/// Loads Arrow record batches into BigQuery tables.
pub struct PushWorker<F: ClientFactory> {
    connector: BigQueryConnector<F>,
}

impl<F: ClientFactory> PushWorker<F> {
    /// Binds a worker to `connector`, which must hold a query/load client.
    pub fn new(connector: &BigQueryConnector<F>) -> BqResult<Self> {
        if !connector.has_client() {
            bail!(
                ErrorKind::ConnectionNotOpen,
                "Connector must be connected first."
            );
        }

        Ok(Self {
            connector: connector.clone(),
        })
    }

    /// Loads `data` into the destination resolved from `options` and the connector defaults,
    /// then waits for the load job to finish.
    ///
    /// The table is created when missing. Without an explicit schema BigQuery autodetects one.
    pub async fn push(&self, data: &RecordBatch, options: PushOptions) -> BqResult<()> {
        let Some(client) = self.connector.client() else {
            bail!(
                ErrorKind::ClientUnavailable,
                "BigQuery client not initialized."
            );
        };

        let destination = options.destination(
            self.connector.project_id().as_deref(),
            self.connector.dataset(),
            self.connector.table(),
        )?;
        let PushOptions {
            schema,
            write_disposition,
            ..
        } = options;
        let config = LoadJobConfig {
            create_disposition: CreateDisposition::CreateIfNeeded,
            write_disposition,
            autodetect: schema.is_none(),
            schema,
        };

        let row_count = data.num_rows();
        info!(%destination, %write_disposition, "loading {row_count} rows to {destination}");

        let mut job = client.load_table(data, &destination, &config).await?;
        job.wait().await?;

        let job_errors = job.errors();
        if !job_errors.is_empty() {
            for job_error in job_errors {
                error!(%destination, %job_error, "load job error");
            }

            return Err(bq_error!(
                ErrorKind::LoadJobFailed,
                "BigQuery load job failed.",
                format!("{} error(s) loading into {destination}", job_errors.len())
            )
            .with_job_errors(job_errors.to_vec()));
        }

        let loaded_rows = job.output_rows().unwrap_or(row_count as u64);
        info!(%destination, loaded_rows, "successfully loaded {loaded_rows} rows");

        Ok(())
    }
}

impl<F: ClientFactory> fmt::Debug for PushWorker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushWorker")
            .field("connector", &self.connector)
            .finish()
    }
}

impl<F: ClientFactory> Clone for PushWorker<F> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
        }
    }
}

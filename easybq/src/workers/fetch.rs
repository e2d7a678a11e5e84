use std::fmt;

use arrow::record_batch::RecordBatch;
use tracing::info;

use crate::bail;
use crate::clients::{ClientFactory, QueryJob, WarehouseClient};
use crate::connector::BigQueryConnector;
use crate::error::{BqResult, ErrorKind};
use crate::types::FetchOptions;

/// Runs SQL queries and materializes their results.
pub struct FetchWorker<F: ClientFactory> {
    connector: BigQueryConnector<F>,
}

impl<F: ClientFactory> FetchWorker<F> {
    /// Binds a worker to `connector`, which must be open.
    pub fn new(connector: &BigQueryConnector<F>) -> BqResult<Self> {
        if !connector.has_client() || !connector.has_read_client() {
            bail!(
                ErrorKind::ConnectionNotOpen,
                "Connector must be connected first."
            );
        }

        Ok(Self {
            connector: connector.clone(),
        })
    }

    /// Runs `query` and returns its full result set.
    ///
    /// The read client is handed to the materialization step only when
    /// [`FetchOptions::use_read_client`] is set.
    pub async fn fetch(&self, query: &str, options: FetchOptions) -> BqResult<RecordBatch> {
        let Some((client, read_client)) = self.connector.clients() else {
            bail!(
                ErrorKind::ClientUnavailable,
                "BigQuery client is not available."
            );
        };
        let use_read_client = options.use_read_client;
        let read_client = use_read_client.then_some(read_client);

        info!(use_read_client, "executing query");

        let job = client.query(query).await?;
        let batch = job
            .to_record_batch(read_client.as_deref(), &options.materialize)
            .await?;

        let row_count = batch.num_rows();
        info!(row_count, "query returned {row_count} rows");

        Ok(batch)
    }
}

impl<F: ClientFactory> fmt::Debug for FetchWorker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchWorker")
            .field("connector", &self.connector)
            .finish()
    }
}

impl<F: ClientFactory> Clone for FetchWorker<F> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
        }
    }
}

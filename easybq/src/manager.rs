use std::ops::{Deref, DerefMut};

use arrow::record_batch::RecordBatch;
use config::shared::ConnectorConfig;
use tracing::info;

use crate::bigquery::BigQueryClientFactory;
use crate::clients::ClientFactory;
use crate::connector::BigQueryConnector;
use crate::error::{BqResult, ErrorKind};
use crate::types::{FetchOptions, PushOptions};
use crate::workers::{FetchWorker, PushWorker};
use crate::{bail, bq_error};

/// Single entry point combining a connector with its fetch and push workers.
///
/// Work happens inside a scope opened by [`BigQueryManager::enter`]; leaving the scope always
/// closes the connection.
///
/// ```no_run
/// # async fn run() -> easybq::error::BqResult<()> {
/// use easybq::{BigQueryManager, FetchOptions};
///
/// let mut manager = BigQueryManager::from_env();
/// let scope = manager.enter().await?;
/// let batch = scope.fetch("select 1 as one", FetchOptions::default()).await?;
/// assert_eq!(batch.num_rows(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BigQueryManager<F: ClientFactory = BigQueryClientFactory> {
    connector: BigQueryConnector<F>,
    fetcher: Option<FetchWorker<F>>,
    pusher: Option<PushWorker<F>>,
}

impl BigQueryManager<BigQueryClientFactory> {
    pub fn new(config: ConnectorConfig) -> Self {
        Self::with_factory(config, BigQueryClientFactory::new())
    }

    /// Builds a manager from the `BIGQUERY_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(ConnectorConfig::from_env())
    }

    /// Builds a manager from `configuration/bigquery.*` layered under the environment.
    pub fn from_configuration() -> BqResult<Self> {
        let config = config::load_connector_config().map_err(|err| {
            bq_error!(
                ErrorKind::ConfigError,
                "Failed to load connector configuration",
                err.to_string(),
                source: err
            )
        })?;

        Ok(Self::new(config))
    }
}

impl<F: ClientFactory> BigQueryManager<F> {
    pub fn with_factory(config: ConnectorConfig, factory: F) -> Self {
        Self {
            connector: BigQueryConnector::with_factory(config, factory),
            fetcher: None,
            pusher: None,
        }
    }

    /// Connects and prepares both workers.
    ///
    /// The connection is closed again before an error is returned.
    pub async fn enter(&mut self) -> BqResult<ManagerScope<'_, F>> {
        if let Err(err) = self.activate().await {
            self.deactivate();
            return Err(err);
        }

        Ok(ManagerScope { manager: self })
    }

    /// Runs `query` through the fetch worker of the active scope.
    pub async fn fetch(&self, query: &str, options: FetchOptions) -> BqResult<RecordBatch> {
        let Some(fetcher) = &self.fetcher else {
            bail!(
                ErrorKind::ContextNotActive,
                "Manager context is not active."
            );
        };

        fetcher.fetch(query, options).await
    }

    /// Loads `data` through the push worker of the active scope.
    pub async fn push(&self, data: &RecordBatch, options: PushOptions) -> BqResult<()> {
        let Some(pusher) = &self.pusher else {
            bail!(
                ErrorKind::ContextNotActive,
                "Manager context is not active."
            );
        };

        pusher.push(data, options).await
    }

    pub fn connector(&self) -> &BigQueryConnector<F> {
        &self.connector
    }

    /// Returns `true` while a scope is open and its workers exist.
    pub fn is_active(&self) -> bool {
        self.fetcher.is_some() && self.pusher.is_some()
    }

    async fn activate(&mut self) -> BqResult<()> {
        self.connector.connect().await?;
        self.fetcher = Some(FetchWorker::new(&self.connector)?);
        self.pusher = Some(PushWorker::new(&self.connector)?);

        info!("bigquery manager context entered");

        Ok(())
    }

    fn deactivate(&mut self) {
        self.fetcher = None;
        self.pusher = None;
        self.connector.close();
    }
}

/// Active scope of a [`BigQueryManager`].
///
/// Dereferences to the manager. Dropping the scope, including while unwinding, closes the
/// connection and discards the workers.
#[derive(Debug)]
pub struct ManagerScope<'a, F: ClientFactory = BigQueryClientFactory> {
    manager: &'a mut BigQueryManager<F>,
}

impl<F: ClientFactory> ManagerScope<'_, F> {
    /// Leaves the scope explicitly.
    pub fn exit(self) {}
}

impl<F: ClientFactory> Deref for ManagerScope<'_, F> {
    type Target = BigQueryManager<F>;

    fn deref(&self) -> &Self::Target {
        self.manager
    }
}

impl<F: ClientFactory> DerefMut for ManagerScope<'_, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.manager
    }
}

impl<F: ClientFactory> Drop for ManagerScope<'_, F> {
    fn drop(&mut self) {
        self.manager.deactivate();
        info!("bigquery manager context exited");
    }
}

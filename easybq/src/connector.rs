use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use config::shared::ConnectorConfig;
use tracing::info;

use crate::bail;
use crate::bigquery::BigQueryClientFactory;
use crate::clients::{ClientFactory, Credentials, ReadClient, ReadClientOf};
use crate::error::{BqResult, ErrorKind};

/// Connection state of a [`BigQueryConnector`].
///
/// Both clients exist together or not at all.
enum ConnectionState<C, R> {
    Closed,
    Open {
        project_id: String,
        client: Arc<C>,
        read_client: Arc<R>,
    },
}

struct ConnectorInner<F: ClientFactory> {
    config: ConnectorConfig,
    factory: F,
    state: Mutex<ConnectionState<F::Client, ReadClientOf<F>>>,
}

/// Handle owning the lifecycle of the BigQuery query/load client and read client.
///
/// The handle is cheap to clone; clones share the same connection, so workers built from it
/// observe a later [`BigQueryConnector::close`].
pub struct BigQueryConnector<F: ClientFactory = BigQueryClientFactory> {
    inner: Arc<ConnectorInner<F>>,
}

impl BigQueryConnector<BigQueryClientFactory> {
    /// Creates a closed connector backed by the real BigQuery clients.
    pub fn new(config: ConnectorConfig) -> Self {
        Self::with_factory(config, BigQueryClientFactory::new())
    }
}

impl<F: ClientFactory> BigQueryConnector<F> {
    /// Creates a closed connector that builds its clients with `factory`.
    ///
    /// No remote call is made until [`BigQueryConnector::connect`].
    pub fn with_factory(config: ConnectorConfig, factory: F) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                config,
                factory,
                state: Mutex::new(ConnectionState::Closed),
            }),
        }
    }

    /// Resolves the credentials and opens both clients.
    ///
    /// Without stored credentials info, application default credentials are used. A project id
    /// missing from the configuration is taken from the service account key. Connecting an
    /// open connector replaces its clients after closing the previous read client.
    pub async fn connect(&self) -> BqResult<()> {
        let credentials = Credentials::from_info(self.inner.config.credentials_info.as_ref())?;

        let Some(project_id) = self
            .inner
            .config
            .project_id
            .clone()
            .or_else(|| credentials.project_id().map(str::to_string))
        else {
            bail!(
                ErrorKind::ConfigError,
                "BigQuery project id is not configured",
                "set a project id or use a service account key that carries one"
            );
        };

        let client = self
            .inner
            .factory
            .create_client(&project_id, &credentials)
            .await?;
        let read_client = self.inner.factory.create_read_client(&credentials).await?;

        let previous = std::mem::replace(
            &mut *self.lock_state(),
            ConnectionState::Open {
                project_id: project_id.clone(),
                client: Arc::new(client),
                read_client: Arc::new(read_client),
            },
        );
        if let ConnectionState::Open { read_client, .. } = previous {
            read_client.close();
        }

        info!(%project_id, "connected to bigquery");

        Ok(())
    }

    /// Closes the read client's transport and drops both clients.
    ///
    /// Does nothing when the connector is already closed.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), ConnectionState::Closed);

        if let ConnectionState::Open {
            project_id,
            read_client,
            ..
        } = previous
        {
            read_client.close();
            info!(%project_id, "closed bigquery connection");
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock_state(), ConnectionState::Open { .. })
    }

    pub fn has_client(&self) -> bool {
        self.client().is_some()
    }

    pub fn has_read_client(&self) -> bool {
        self.read_client().is_some()
    }

    /// Returns the query/load client while open.
    pub fn client(&self) -> Option<Arc<F::Client>> {
        match &*self.lock_state() {
            ConnectionState::Open { client, .. } => Some(Arc::clone(client)),
            ConnectionState::Closed => None,
        }
    }

    /// Returns the read client while open.
    pub fn read_client(&self) -> Option<Arc<ReadClientOf<F>>> {
        match &*self.lock_state() {
            ConnectionState::Open { read_client, .. } => Some(Arc::clone(read_client)),
            ConnectionState::Closed => None,
        }
    }

    /// Returns both clients from one look at the connection state, so they always belong to the
    /// same connection.
    pub fn clients(&self) -> Option<(Arc<F::Client>, Arc<ReadClientOf<F>>)> {
        match &*self.lock_state() {
            ConnectionState::Open {
                client,
                read_client,
                ..
            } => Some((Arc::clone(client), Arc::clone(read_client))),
            ConnectionState::Closed => None,
        }
    }

    /// Returns the project id in use while open, or the configured one otherwise.
    pub fn project_id(&self) -> Option<String> {
        match &*self.lock_state() {
            ConnectionState::Open { project_id, .. } => Some(project_id.clone()),
            ConnectionState::Closed => self.inner.config.project_id.clone(),
        }
    }

    /// Default dataset for load destinations.
    pub fn dataset(&self) -> Option<&str> {
        self.inner.config.dataset.as_deref()
    }

    /// Default table for load destinations.
    pub fn table(&self) -> Option<&str> {
        self.inner.config.table.as_deref()
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState<F::Client, ReadClientOf<F>>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: ClientFactory> Clone for BigQueryConnector<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ClientFactory> fmt::Debug for BigQueryConnector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryConnector")
            .field("project_id", &self.project_id())
            .field("dataset", &self.dataset())
            .field("table", &self.table())
            .field("is_open", &self.is_open())
            .finish()
    }
}

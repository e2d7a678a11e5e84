use std::sync::Arc;

use async_trait::async_trait;
use gcp_bigquery_client::Client;
use gcp_bigquery_client::client_builder::ClientBuilder;
use tracing::debug;

use crate::bigquery::auth::TokenSource;
use crate::bigquery::client::{BigQueryClient, bq_error_to_bq_error};
use crate::bigquery::encryption::install_crypto_provider;
use crate::bigquery::read::BigQueryReadClient;
use crate::bigquery::rest::RestTransport;
use crate::clients::{ClientFactory, Credentials};
use crate::error::BqResult;

/// Builds clients talking to the real BigQuery service.
#[derive(Debug, Clone, Default)]
pub struct BigQueryClientFactory;

impl BigQueryClientFactory {
    pub fn new() -> Self {
        Self
    }
}

async fn build_client(tokens: &TokenSource) -> BqResult<Client> {
    ClientBuilder::new()
        .build_from_authenticator(Arc::new(tokens.clone()))
        .await
        .map_err(bq_error_to_bq_error)
}

#[async_trait]
impl ClientFactory for BigQueryClientFactory {
    type Client = BigQueryClient;

    async fn create_client(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> BqResult<BigQueryClient> {
        install_crypto_provider();

        let tokens = TokenSource::new(credentials).await?;
        let client = build_client(&tokens).await?;
        let rest = RestTransport::new(tokens)?;

        debug!(project_id, "bigquery client created");

        Ok(BigQueryClient::new(project_id.to_string(), client, rest))
    }

    async fn create_read_client(&self, credentials: &Credentials) -> BqResult<BigQueryReadClient> {
        install_crypto_provider();

        let tokens = TokenSource::new(credentials).await?;
        let client = build_client(&tokens).await?;

        debug!("bigquery read client created");

        Ok(BigQueryReadClient::new(client))
    }
}

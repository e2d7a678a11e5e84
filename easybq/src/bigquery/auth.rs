//! OAuth token source shared by the client library and the upload transport.

use std::fmt;

use async_trait::async_trait;
use gcp_bigquery_client::auth::Authenticator;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::yup_oauth2::authenticator::{
    ApplicationDefaultCredentialsTypes, DefaultAuthenticator,
};
use gcp_bigquery_client::yup_oauth2::{
    ApplicationDefaultCredentialsAuthenticator, ApplicationDefaultCredentialsFlowOpts,
    ServiceAccountAuthenticator,
};

use crate::bigquery::client::bq_error_to_bq_error;
use crate::bq_error;
use crate::clients::Credentials;
use crate::error::{BqResult, ErrorKind};

/// OAuth scope granting access to BigQuery.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Hands out access tokens for [`BIGQUERY_SCOPE`], refreshing them when they expire.
///
/// Clones share one token cache.
#[derive(Clone)]
pub struct TokenSource {
    authenticator: DefaultAuthenticator,
}

impl TokenSource {
    /// Builds a token source from a service account key or application default credentials.
    pub async fn new(credentials: &Credentials) -> BqResult<Self> {
        let authenticator = match credentials {
            Credentials::ServiceAccount(key) => {
                ServiceAccountAuthenticator::builder((**key).clone())
                    .build()
                    .await
            }
            Credentials::ApplicationDefault => {
                let opts = ApplicationDefaultCredentialsFlowOpts::default();
                match ApplicationDefaultCredentialsAuthenticator::builder(opts).await {
                    ApplicationDefaultCredentialsTypes::ServiceAccount(builder) => {
                        builder.build().await
                    }
                    ApplicationDefaultCredentialsTypes::InstanceMetadata(builder) => {
                        builder.build().await
                    }
                }
            }
        }
        .map_err(|err| {
            bq_error!(
                ErrorKind::AuthenticationError,
                "Failed to build BigQuery authenticator",
                err.to_string(),
                source: err
            )
        })?;

        Ok(Self { authenticator })
    }

    /// Returns a valid access token.
    pub async fn token(&self) -> BqResult<String> {
        self.access_token().await.map_err(bq_error_to_bq_error)
    }
}

#[async_trait]
impl Authenticator for TokenSource {
    async fn access_token(&self) -> Result<String, BQError> {
        let token = self.authenticator.token(&[BIGQUERY_SCOPE]).await?;

        token.token().map(str::to_string).ok_or(BQError::NoToken)
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource").finish_non_exhaustive()
    }
}

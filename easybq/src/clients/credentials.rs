use std::fmt;

use gcp_bigquery_client::yup_oauth2::{ServiceAccountKey, parse_service_account_key};
use secrecy::{ExposeSecret, SecretString};

use crate::bq_error;
use crate::error::{BqResult, ErrorKind};

/// Credential material used to build remote clients.
#[derive(Clone)]
pub enum Credentials {
    /// A parsed service account key.
    ServiceAccount(Box<ServiceAccountKey>),
    /// Discovery through the environment, the gcloud configuration or the metadata server.
    ApplicationDefault,
}

impl Credentials {
    /// Parses a service account key JSON blob, or selects application default credentials when
    /// no blob is given.
    pub fn from_info(credentials_info: Option<&SecretString>) -> BqResult<Self> {
        let Some(credentials_info) = credentials_info else {
            return Ok(Credentials::ApplicationDefault);
        };

        let key = parse_service_account_key(credentials_info.expose_secret()).map_err(|err| {
            bq_error!(
                ErrorKind::InvalidCredentials,
                "Credentials info is not a valid service account key",
                err.to_string(),
                source: err
            )
        })?;

        Ok(Credentials::ServiceAccount(Box::new(key)))
    }

    /// Returns the project the service account key belongs to, if known.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Credentials::ServiceAccount(key) => key.project_id.as_deref(),
            Credentials::ApplicationDefault => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ServiceAccount(key) => f
                .debug_struct("ServiceAccount")
                .field("client_email", &key.client_email)
                .field("project_id", &key.project_id)
                .finish_non_exhaustive(),
            Credentials::ApplicationDefault => f.write_str("ApplicationDefault"),
        }
    }
}

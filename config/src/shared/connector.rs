use secrecy::SecretString;
use serde::Deserialize;

/// Environment variable holding the BigQuery project id.
pub const PROJECT_ID_ENV_NAME: &str = "BIGQUERY_PROJECT_ID";

/// Environment variable holding the service account key JSON.
pub const CREDENTIALS_INFO_ENV_NAME: &str = "BIGQUERY_CREDENTIALS_INFO";

/// Environment variable holding the default dataset.
pub const DATASET_ENV_NAME: &str = "BIGQUERY_DATASET";

/// Environment variable holding the default table.
pub const TABLE_ENV_NAME: &str = "BIGQUERY_TABLE";

/// Project id variable set by the Google Cloud tooling, used when [`PROJECT_ID_ENV_NAME`] is unset.
pub const GOOGLE_CLOUD_PROJECT_ENV_NAME: &str = "GOOGLE_CLOUD_PROJECT";

/// Connection settings for a BigQuery connector.
///
/// Every field is optional. A missing project id is resolved from the service account key at
/// connect time, a missing credential falls back to application default credentials, and the
/// dataset and table only act as defaults for load destinations.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking the credentials into serialized forms.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConnectorConfig {
    /// Google Cloud project identifier.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Service account key JSON used to authenticate.
    #[serde(default)]
    pub credentials_info: Option<SecretString>,
    /// Default dataset for load destinations.
    #[serde(default)]
    pub dataset: Option<String>,
    /// Default table for load destinations.
    #[serde(default)]
    pub table: Option<String>,
}

impl ConnectorConfig {
    /// Creates an empty config; every value is resolved later or supplied per call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from the process environment.
    ///
    /// A `.env` file in the working directory, if present, is loaded first. Variables that are
    /// already set take precedence over the file.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            project_id: non_empty(PROJECT_ID_ENV_NAME)
                .or_else(|| non_empty(GOOGLE_CLOUD_PROJECT_ENV_NAME)),
            credentials_info: non_empty(CREDENTIALS_INFO_ENV_NAME).map(SecretString::new),
            dataset: non_empty(DATASET_ENV_NAME),
            table: non_empty(TABLE_ENV_NAME),
        }
    }

    /// Fills every unset field from `other`, keeping values already present.
    pub fn or(self, other: ConnectorConfig) -> Self {
        Self {
            project_id: self.project_id.or(other.project_id),
            credentials_info: self.credentials_info.or(other.credentials_info),
            dataset: self.dataset.or(other.dataset),
            table: self.table.or(other.table),
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_credentials_info(mut self, credentials_info: impl Into<String>) -> Self {
        self.credentials_info = Some(SecretString::new(credentials_info.into()));
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
}

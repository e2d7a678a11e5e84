//! Shared configuration types for BigQuery connectors.

mod connector;

pub use connector::{
    CREDENTIALS_INFO_ENV_NAME, ConnectorConfig, DATASET_ENV_NAME, GOOGLE_CLOUD_PROJECT_ENV_NAME,
    PROJECT_ID_ENV_NAME, TABLE_ENV_NAME,
};

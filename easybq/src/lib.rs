//! Convenience layer over BigQuery: connect, run queries into Arrow record batches and load
//! record batches into tables.
//!
//! [`BigQueryManager`] is the usual entry point. [`BigQueryConnector`] together with
//! [`FetchWorker`] and [`PushWorker`] gives finer control over the connection lifecycle.

pub mod bigquery;
pub mod clients;
pub mod connector;
pub mod error;
mod macros;
pub mod manager;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;

pub use config::shared::ConnectorConfig;
pub use connector::BigQueryConnector;
pub use error::{BqError, BqResult, ErrorKind};
pub use manager::{BigQueryManager, ManagerScope};
pub use types::{
    CreateDisposition, FetchOptions, FieldMode, FieldType, JobError, LoadJobConfig,
    MaterializeOptions, PushOptions, SchemaField, TableReference, WriteDisposition,
};
pub use workers::{FetchWorker, PushWorker};

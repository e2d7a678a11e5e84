//! Production client implementations for Google BigQuery.
//!
//! Queries, result paging, job polling and the range-based read path go through
//! `gcp_bigquery_client`. Load jobs are uploaded over the REST API. Both share one token source
//! built from the connector's credentials.

mod auth;
mod client;
mod encoding;
mod encryption;
mod factory;
mod model;
mod read;
mod rest;

pub use auth::{BIGQUERY_SCOPE, TokenSource};
pub use client::{BigQueryClient, BigQueryLoadJob, BigQueryQueryJob};
pub use encoding::arrow_schema;
pub use encryption::install_crypto_provider;
pub use factory::BigQueryClientFactory;
pub use model::{JobReference, TableFieldSchema, TableSchema};
pub use read::BigQueryReadClient;

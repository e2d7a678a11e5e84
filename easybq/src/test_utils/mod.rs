//! Test doubles and fixtures for exercising the connector, workers and manager without a
//! BigQuery project.
//!
//! [`mock::MockClientFactory`] plugs into [`crate::BigQueryConnector::with_factory`] and
//! records every call made through the clients it creates.

pub mod fixtures;
pub mod mock;

#![cfg(feature = "test-utils")]

mod common;
mod connector_test;
mod fetch_test;
mod manager_test;
mod push_test;

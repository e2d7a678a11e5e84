//! Workers that run queries and load jobs against an open [`crate::BigQueryConnector`].

mod fetch;
mod push;

pub use fetch::FetchWorker;
pub use push::PushWorker;

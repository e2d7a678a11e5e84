use std::time::Duration;

use easybq::test_utils::fixtures::{sample_batch, test_connector_config};
use easybq::test_utils::mock::MockClientFactory;
use easybq::{
    BigQueryConnector, ErrorKind, FetchOptions, FetchWorker, MaterializeOptions, bq_error,
};
use telemetry::init_test_tracing;

use crate::common::{capture_logs, open_connector};

#[tokio::test]
async fn worker_requires_an_open_connector() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());

    let err = FetchWorker::new(&connector).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionNotOpen);
    assert_eq!(err.description(), "Connector must be connected first.");
    assert_eq!(factory.remote_calls(), 0);
}

#[tokio::test]
async fn default_options_hand_the_read_client_to_materialization() {
    init_test_tracing();
    let factory = MockClientFactory::new().with_query_result(sample_batch());
    let connector = open_connector(&factory).await;
    let worker = FetchWorker::new(&connector).unwrap();

    worker
        .fetch("select * from d.t", FetchOptions::default())
        .await
        .unwrap();

    let materializations = factory.materializations();
    assert_eq!(materializations.len(), 1);
    assert_eq!(materializations[0].sql, "select * from d.t");
    assert!(materializations[0].read_client_passed);
}

#[tokio::test]
async fn disabling_the_read_client_never_passes_it() {
    init_test_tracing();
    let factory = MockClientFactory::new().with_query_result(sample_batch());
    let connector = open_connector(&factory).await;
    let worker = FetchWorker::new(&connector).unwrap();

    for _ in 0..3 {
        worker
            .fetch("select 1", FetchOptions::new().with_read_client(false))
            .await
            .unwrap();
    }

    let materializations = factory.materializations();
    assert_eq!(materializations.len(), 3);
    assert!(materializations.iter().all(|m| !m.read_client_passed));
}

#[tokio::test]
async fn materialize_options_are_forwarded_verbatim() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = open_connector(&factory).await;
    let worker = FetchWorker::new(&connector).unwrap();
    let materialize = MaterializeOptions {
        page_size: Some(500),
        max_rows: Some(1_000),
        timeout: Some(Duration::from_secs(30)),
        max_concurrency: Some(2),
    };

    worker
        .fetch(
            "select 1",
            FetchOptions::new().with_materialize(materialize.clone()),
        )
        .await
        .unwrap();

    assert_eq!(factory.materializations()[0].options, materialize);
}

#[tokio::test]
async fn fetch_returns_the_batch_unchanged_and_logs_the_row_count() {
    let factory = MockClientFactory::new().with_query_result(sample_batch());
    let connector = open_connector(&factory).await;
    let worker = FetchWorker::new(&connector).unwrap();
    let (logs, _guard) = capture_logs();

    let batch = worker
        .fetch("select id, name from d.t", FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(batch, sample_batch());
    assert_eq!(batch.num_rows(), 3);
    assert_eq!(batch.num_columns(), 2);
    let logs = logs.contents();
    assert!(logs.contains("executing query"), "logs: {logs}");
    assert!(logs.contains("query returned 3 rows"), "logs: {logs}");
}

#[tokio::test]
async fn fetch_after_close_reports_missing_client() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = open_connector(&factory).await;
    let worker = FetchWorker::new(&connector).unwrap();

    connector.close();
    let err = worker
        .fetch("select 1", FetchOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ClientUnavailable);
    assert_eq!(err.description(), "BigQuery client is not available.");
    assert!(factory.queries().is_empty());
}

#[tokio::test]
async fn query_failures_propagate_without_retry() {
    init_test_tracing();
    let factory = MockClientFactory::new().with_query_error(bq_error!(
        ErrorKind::QueryFailed,
        "BigQuery response error",
        "Syntax error: Unexpected end of script"
    ));
    let connector = open_connector(&factory).await;
    let worker = FetchWorker::new(&connector).unwrap();

    let err = worker
        .fetch("select", FetchOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryFailed);
    assert_eq!(factory.queries().len(), 1);
    assert!(factory.materializations().is_empty());
}

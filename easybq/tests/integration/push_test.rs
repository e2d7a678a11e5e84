use easybq::test_utils::fixtures::{sample_batch, test_connector_config};
use easybq::test_utils::mock::MockClientFactory;
use easybq::{
    BigQueryConnector, ConnectorConfig, CreateDisposition, ErrorKind, FieldMode, FieldType,
    JobError, PushOptions, PushWorker, SchemaField, TableReference, WriteDisposition,
};
use telemetry::init_test_tracing;

use crate::common::{capture_logs, open_connector};

#[tokio::test]
async fn worker_requires_an_open_connector() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());

    let err = PushWorker::new(&connector).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionNotOpen);
    assert_eq!(err.description(), "Connector must be connected first.");
    assert_eq!(factory.remote_calls(), 0);
}

#[tokio::test]
async fn destination_segments_fall_back_independently() {
    init_test_tracing();

    for mask in 0..8u8 {
        let factory = MockClientFactory::new();
        let connector = open_connector(&factory).await;
        let worker = PushWorker::new(&connector).unwrap();

        let mut options = PushOptions::new();
        let mut expected = TableReference::new("p", "d", "t");
        if mask & 1 != 0 {
            options = options.with_project_id("op");
            expected.project_id = "op".to_string();
        }
        if mask & 2 != 0 {
            options = options.with_dataset("od");
            expected.dataset_id = "od".to_string();
        }
        if mask & 4 != 0 {
            options = options.with_table("ot");
            expected.table_id = "ot".to_string();
        }

        worker.push(&sample_batch(), options).await.unwrap();

        assert_eq!(factory.loads()[0].destination, expected, "mask {mask:03b}");
    }
}

#[tokio::test]
async fn table_override_keeps_default_project_and_dataset() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = open_connector(&factory).await;
    let worker = PushWorker::new(&connector).unwrap();

    worker
        .push(&sample_batch(), PushOptions::new().with_table("override_t"))
        .await
        .unwrap();

    assert_eq!(factory.loads()[0].destination.to_string(), "p.d.override_t");
}

#[tokio::test]
async fn defaults_append_and_create_if_needed() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = open_connector(&factory).await;
    let worker = PushWorker::new(&connector).unwrap();

    worker
        .push(&sample_batch(), PushOptions::default())
        .await
        .unwrap();

    let load = &factory.loads()[0];
    assert_eq!(load.config.write_disposition, WriteDisposition::Append);
    assert_eq!(load.config.create_disposition, CreateDisposition::CreateIfNeeded);
    assert_eq!(load.row_count, 3);
}

#[tokio::test]
async fn missing_schema_enables_autodetect() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = open_connector(&factory).await;
    let worker = PushWorker::new(&connector).unwrap();

    worker
        .push(&sample_batch(), PushOptions::default())
        .await
        .unwrap();

    let config = &factory.loads()[0].config;
    assert!(config.autodetect);
    assert_eq!(config.schema, None);
}

#[tokio::test]
async fn explicit_schema_disables_autodetect() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = open_connector(&factory).await;
    let worker = PushWorker::new(&connector).unwrap();
    let schema = vec![
        SchemaField::new("id", FieldType::Integer).with_mode(FieldMode::Required),
        SchemaField::new("name", FieldType::String),
    ];

    worker
        .push(
            &sample_batch(),
            PushOptions::new()
                .with_schema(schema.clone())
                .with_write_disposition(WriteDisposition::Truncate),
        )
        .await
        .unwrap();

    let config = &factory.loads()[0].config;
    assert!(!config.autodetect);
    assert_eq!(config.schema.as_ref(), Some(&schema));
    assert_eq!(config.write_disposition, WriteDisposition::Truncate);
}

#[tokio::test]
async fn successful_load_waits_exactly_once() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = open_connector(&factory).await;
    let worker = PushWorker::new(&connector).unwrap();

    worker
        .push(&sample_batch(), PushOptions::default())
        .await
        .unwrap();

    assert_eq!(factory.wait_count(), 1);
}

#[tokio::test]
async fn success_log_reports_rows_loaded_by_the_job() {
    init_test_tracing();
    let factory = MockClientFactory::new().with_output_rows(Some(2));
    let connector = open_connector(&factory).await;
    let worker = PushWorker::new(&connector).unwrap();
    let (logs, _guard) = capture_logs();

    worker
        .push(&sample_batch(), PushOptions::default())
        .await
        .unwrap();

    let logs = logs.contents();
    assert!(logs.contains("loading 3 rows to p.d.t"), "logs: {logs}");
    assert!(logs.contains("successfully loaded 2 rows"), "logs: {logs}");
}

#[tokio::test]
async fn success_log_falls_back_to_input_rows() {
    init_test_tracing();
    let factory = MockClientFactory::new().with_output_rows(None);
    let connector = open_connector(&factory).await;
    let worker = PushWorker::new(&connector).unwrap();
    let (logs, _guard) = capture_logs();

    worker
        .push(&sample_batch(), PushOptions::default())
        .await
        .unwrap();

    let logs = logs.contents();
    assert!(logs.contains("successfully loaded 3 rows"), "logs: {logs}");
}

#[tokio::test]
async fn job_errors_fail_the_push_after_one_wait() {
    init_test_tracing();
    let job_errors = vec![JobError {
        reason: Some("invalid".to_string()),
        location: Some("row 2".to_string()),
        message: Some("Could not parse 'x' as INT64".to_string()),
    }];
    let factory = MockClientFactory::new().with_load_errors(job_errors.clone());
    let connector = open_connector(&factory).await;
    let worker = PushWorker::new(&connector).unwrap();

    let err = worker
        .push(&sample_batch(), PushOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadJobFailed);
    assert_eq!(err.description(), "BigQuery load job failed.");
    assert_eq!(err.job_errors(), job_errors.as_slice());
    assert_eq!(factory.wait_count(), 1);
}

#[tokio::test]
async fn push_after_close_reports_missing_client() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = open_connector(&factory).await;
    let worker = PushWorker::new(&connector).unwrap();

    connector.close();
    let err = worker
        .push(&sample_batch(), PushOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ClientUnavailable);
    assert_eq!(err.description(), "BigQuery client not initialized.");
    assert!(factory.loads().is_empty());
}

#[tokio::test]
async fn unresolvable_destination_fails_before_loading() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let config = ConnectorConfig::new().with_project_id("p");
    let connector = BigQueryConnector::with_factory(config, factory.clone());
    connector.connect().await.unwrap();
    let worker = PushWorker::new(&connector).unwrap();

    let err = worker
        .push(&sample_batch(), PushOptions::new().with_table("t"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert!(factory.loads().is_empty());
}

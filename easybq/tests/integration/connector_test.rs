use std::sync::Arc;

use easybq::clients::Credentials;
use easybq::test_utils::fixtures::{mock_service_account_key, test_connector_config};
use easybq::test_utils::mock::MockClientFactory;
use easybq::{BigQueryConnector, ConnectorConfig, ErrorKind, bq_error};
use telemetry::init_test_tracing;

fn assert_consistent(connector: &BigQueryConnector<MockClientFactory>) {
    assert_eq!(connector.has_client(), connector.has_read_client());
    assert_eq!(connector.is_open(), connector.has_client());
}

#[tokio::test]
async fn new_connector_is_closed_and_makes_no_remote_call() {
    init_test_tracing();
    let factory = MockClientFactory::new();

    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());

    assert!(!connector.is_open());
    assert!(!connector.has_client());
    assert!(!connector.has_read_client());
    assert_eq!(factory.remote_calls(), 0);
    assert_eq!(connector.project_id().as_deref(), Some("p"));
    assert_eq!(connector.dataset(), Some("d"));
    assert_eq!(connector.table(), Some("t"));
}

#[tokio::test]
async fn connect_opens_both_clients_and_close_releases_them() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());

    connector.connect().await.unwrap();

    assert!(connector.has_client());
    assert!(connector.has_read_client());
    assert_consistent(&connector);
    assert_eq!(factory.project_ids(), vec!["p".to_string()]);

    connector.close();

    assert!(!connector.has_client());
    assert!(!connector.has_read_client());
    assert_consistent(&connector);
    assert_eq!(factory.read_client_closes(), 1);
}

#[tokio::test]
async fn clients_are_taken_from_one_connection() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());

    assert!(connector.clients().is_none());

    connector.connect().await.unwrap();
    let (client, read_client) = connector.clients().unwrap();
    assert!(Arc::ptr_eq(&client, &connector.client().unwrap()));
    assert!(Arc::ptr_eq(&read_client, &connector.read_client().unwrap()));

    connector.connect().await.unwrap();
    let (new_client, new_read_client) = connector.clients().unwrap();
    assert!(!Arc::ptr_eq(&client, &new_client));
    assert!(!Arc::ptr_eq(&read_client, &new_read_client));

    connector.close();
    assert!(connector.clients().is_none());
}

#[tokio::test]
async fn close_is_idempotent() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());

    connector.close();
    connector.connect().await.unwrap();
    connector.close();
    connector.close();

    assert!(!connector.is_open());
    assert_eq!(factory.read_client_closes(), 1);
}

#[tokio::test]
async fn closed_connector_can_connect_again() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());

    connector.connect().await.unwrap();
    connector.close();
    connector.connect().await.unwrap();

    assert!(connector.is_open());
    assert_eq!(factory.clients_created(), 2);
    assert_eq!(factory.read_clients_created(), 2);
}

#[tokio::test]
async fn clones_share_the_connection() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory);
    let clone = connector.clone();

    connector.connect().await.unwrap();
    assert!(clone.is_open());

    clone.close();
    assert!(!connector.is_open());
}

#[tokio::test]
async fn credentials_info_is_parsed_into_a_service_account_key() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());

    connector.connect().await.unwrap();

    let credentials = factory.credentials();
    assert_eq!(credentials.len(), 2);
    assert!(
        credentials
            .iter()
            .all(|credentials| matches!(credentials, Credentials::ServiceAccount(_)))
    );
}

#[tokio::test]
async fn missing_credentials_info_uses_application_default_credentials() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let config = ConnectorConfig::new().with_project_id("p");
    let connector = BigQueryConnector::with_factory(config, factory.clone());

    connector.connect().await.unwrap();

    assert!(
        factory
            .credentials()
            .iter()
            .all(|credentials| matches!(credentials, Credentials::ApplicationDefault))
    );
}

#[tokio::test]
async fn project_id_is_taken_from_the_key_when_not_configured() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let config = ConnectorConfig::new().with_credentials_info(mock_service_account_key("key-p"));
    let connector = BigQueryConnector::with_factory(config, factory.clone());

    assert_eq!(connector.project_id(), None);

    connector.connect().await.unwrap();

    assert_eq!(connector.project_id().as_deref(), Some("key-p"));
    assert_eq!(factory.project_ids(), vec!["key-p".to_string()]);
}

#[tokio::test]
async fn missing_project_id_fails_before_any_remote_call() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let connector = BigQueryConnector::with_factory(ConnectorConfig::new(), factory.clone());

    let err = connector.connect().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert!(err.is_configuration_error());
    assert_eq!(factory.remote_calls(), 0);
    assert!(!connector.is_open());
}

#[tokio::test]
async fn malformed_credentials_fail_with_invalid_credentials() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let config = ConnectorConfig::new()
        .with_project_id("p")
        .with_credentials_info("{ definitely not a key");
    let connector = BigQueryConnector::with_factory(config, factory.clone());

    let err = connector.connect().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    assert_eq!(factory.remote_calls(), 0);
    assert!(!connector.is_open());
}

#[tokio::test]
async fn failed_read_client_leaves_the_connector_closed() {
    init_test_tracing();
    let factory = MockClientFactory::new().with_read_client_error(bq_error!(
        ErrorKind::AuthenticationError,
        "token refused"
    ));
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());

    let err = connector.connect().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthenticationError);
    assert_eq!(factory.clients_created(), 1);
    assert!(!connector.has_client());
    assert!(!connector.has_read_client());
}

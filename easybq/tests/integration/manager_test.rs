use std::panic::AssertUnwindSafe;

use easybq::test_utils::fixtures::{sample_batch, test_connector_config};
use easybq::test_utils::mock::MockClientFactory;
use easybq::{BigQueryManager, ErrorKind, FetchOptions, PushOptions, bq_error};
use futures::FutureExt;
use telemetry::init_test_tracing;

fn manager(factory: &MockClientFactory) -> BigQueryManager<MockClientFactory> {
    BigQueryManager::with_factory(test_connector_config(), factory.clone())
}

#[tokio::test]
async fn operations_outside_a_scope_are_rejected() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let manager = manager(&factory);

    let fetch_err = manager
        .fetch("select 1", FetchOptions::default())
        .await
        .unwrap_err();
    let push_err = manager
        .push(&sample_batch(), PushOptions::default())
        .await
        .unwrap_err();

    for err in [fetch_err, push_err] {
        assert_eq!(err.kind(), ErrorKind::ContextNotActive);
        assert_eq!(err.description(), "Manager context is not active.");
    }
    assert!(!manager.is_active());
    assert_eq!(factory.remote_calls(), 0);
}

#[tokio::test]
async fn scope_delegates_to_the_workers() {
    init_test_tracing();
    let factory = MockClientFactory::new().with_query_result(sample_batch());
    let mut manager = manager(&factory);

    let scope = manager.enter().await.unwrap();
    assert!(scope.is_active());
    assert!(scope.connector().is_open());

    let batch = scope
        .fetch("select * from d.t", FetchOptions::default())
        .await
        .unwrap();
    scope
        .push(&batch, PushOptions::new().with_table("copy"))
        .await
        .unwrap();

    assert_eq!(batch, sample_batch());
    assert_eq!(factory.queries(), vec!["select * from d.t".to_string()]);
    assert_eq!(factory.loads()[0].destination.to_string(), "p.d.copy");
    assert_eq!(factory.wait_count(), 1);
}

#[tokio::test]
async fn leaving_the_scope_closes_the_connection() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let mut manager = manager(&factory);

    {
        let scope = manager.enter().await.unwrap();
        assert!(scope.connector().has_client());
    }

    assert!(!manager.is_active());
    assert!(!manager.connector().is_open());
    assert_eq!(factory.read_client_closes(), 1);
    let err = manager
        .fetch("select 1", FetchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContextNotActive);
}

#[tokio::test]
async fn explicit_exit_closes_the_connection() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let mut manager = manager(&factory);

    let scope = manager.enter().await.unwrap();
    scope.exit();

    assert!(!manager.connector().is_open());
    let err = manager
        .push(&sample_batch(), PushOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContextNotActive);
}

#[tokio::test]
async fn errors_inside_the_scope_still_close_the_connection() {
    init_test_tracing();
    let factory = MockClientFactory::new().with_load_errors(vec![Default::default()]);
    let mut manager = manager(&factory);

    async fn run(manager: &mut BigQueryManager<MockClientFactory>) -> easybq::BqResult<()> {
        let scope = manager.enter().await?;
        scope.push(&sample_batch(), PushOptions::default()).await?;
        Ok(())
    }

    let err = run(&mut manager).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadJobFailed);
    assert!(!manager.connector().is_open());
    assert!(!manager.is_active());
}

#[tokio::test]
async fn panics_inside_the_scope_still_close_the_connection() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let mut manager = manager(&factory);

    let result = AssertUnwindSafe(async {
        let _scope = manager.enter().await.unwrap();
        panic!("caller code failed inside the scope");
    })
    .catch_unwind()
    .await;

    assert!(result.is_err());
    assert!(!manager.connector().is_open());
    assert_eq!(factory.read_client_closes(), 1);
}

#[tokio::test]
async fn failed_entry_closes_and_propagates() {
    init_test_tracing();
    let factory = MockClientFactory::new().with_read_client_error(bq_error!(
        ErrorKind::AuthenticationError,
        "token refused"
    ));
    let mut manager = manager(&factory);

    let err = manager.enter().await.map(|_| ()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthenticationError);
    assert!(!manager.is_active());
    assert!(!manager.connector().is_open());
}

#[tokio::test]
async fn manager_can_enter_again_after_exit() {
    init_test_tracing();
    let factory = MockClientFactory::new();
    let mut manager = manager(&factory);

    manager.enter().await.unwrap().exit();
    let scope = manager.enter().await.unwrap();

    assert!(scope.is_active());
    assert_eq!(factory.clients_created(), 2);
}

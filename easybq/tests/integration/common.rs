use std::io;
use std::sync::{Arc, Mutex};

use easybq::BigQueryConnector;
use easybq::test_utils::fixtures::test_connector_config;
use easybq::test_utils::mock::MockClientFactory;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory sink for formatted log records.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Routes this thread's log records into the returned buffer until the guard is dropped.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::INFO)
        .finish();

    let guard = tracing::subscriber::set_default(subscriber);

    (buffer, guard)
}

/// Opens a connector for project `p` with defaults `d` and `t`.
pub async fn open_connector(factory: &MockClientFactory) -> BigQueryConnector<MockClientFactory> {
    let connector = BigQueryConnector::with_factory(test_connector_config(), factory.clone());
    connector.connect().await.unwrap();

    connector
}

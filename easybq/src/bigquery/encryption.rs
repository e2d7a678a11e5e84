use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Installs the AWS LC provider as the process-wide rustls default, at most once.
///
/// A provider installed earlier by the application is left in place.
pub fn install_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

//! Shorthands for building and returning [`crate::error::BqError`] values.

/// Creates a [`crate::error::BqError`] from a kind, a static description and optional detail.
///
/// The detail may be anything implementing [`ToString`]; use `detail = ` to move an owned
/// [`String`] without copying it. A trailing `source: err` attaches the originating error.
#[macro_export]
macro_rules! bq_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::BqError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::BqError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::BqError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::BqError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::BqError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::BqError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Returns early with a [`crate::error::BqError`] built by [`bq_error!`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)+) => {
        return ::core::result::Result::Err($crate::bq_error!($($arg)+))
    };
}

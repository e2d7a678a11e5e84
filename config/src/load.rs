use std::{
    io,
    path::{Path, PathBuf},
};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use thiserror::Error;

use crate::shared::{ConnectorConfig, GOOGLE_CLOUD_PROJECT_ENV_NAME};

/// Directory containing configuration files relative to application root.
const CONFIGURATION_DIR: &str = "configuration";

/// Stem of the optional connector configuration file.
const CONFIG_FILE_STEM: &str = "bigquery";

/// Supported extensions for the connector configuration file.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "BIGQUERY";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading the connector configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// Failed to determine the current working directory.
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// The configuration file existed but could not be parsed.
    #[error("failed to load connector configuration from `{path}`: {source}")]
    ConfigurationFileLoad {
        path: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    /// The merged sources could not be built.
    #[error("failed to initialize configuration builder: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),

    /// The sources were merged but deserialization failed.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),
}

/// Loads the connector configuration from `configuration/bigquery.*` and the environment.
///
/// See [`load_connector_config_from`] for the layering rules.
pub fn load_connector_config() -> Result<ConnectorConfig, LoadConfigError> {
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;

    load_connector_config_from(&base_path.join(CONFIGURATION_DIR))
}

/// Loads the connector configuration from `directory` and the environment.
///
/// The file `bigquery.(yaml|yml|json)` in `directory` is optional. `BIGQUERY_`-prefixed
/// environment variables (`BIGQUERY_PROJECT_ID`, `BIGQUERY_CREDENTIALS_INFO`, ...) override it,
/// after a `.env` file has been loaded when present. A project id that is still missing is
/// taken from `GOOGLE_CLOUD_PROJECT`.
pub fn load_connector_config_from(directory: &Path) -> Result<ConnectorConfig, LoadConfigError> {
    let _ = dotenvy::dotenv();

    let mut builder = rust_cli_config::Config::builder();

    if let Some(file) = find_configuration_file(directory) {
        builder = builder.add_source(rust_cli_config::File::from(file.clone()));
        validate_configuration_source(&builder, &file)?;
    }

    let environment_source = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    let settings = builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    let mut config = settings
        .try_deserialize::<ConnectorConfig>()
        .map_err(LoadConfigError::Deserialization)?;

    if config.project_id.is_none() {
        config.project_id = std::env::var(GOOGLE_CLOUD_PROJECT_ENV_NAME)
            .ok()
            .filter(|value| !value.trim().is_empty());
    }

    Ok(config)
}

/// Finds the first connector configuration file with a supported extension.
fn find_configuration_file(directory: &Path) -> Option<PathBuf> {
    CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{CONFIG_FILE_STEM}.{extension}")))
        .find(|path| path.is_file())
}

fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            path: path.to_path_buf(),
            source,
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn loads_values_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bigquery.yaml"),
            "project_id: file-project\ndataset: file_dataset\ntable: file_table\ncredentials_info: '{\"type\": \"service_account\"}'\n",
        )
        .unwrap();

        let config = load_connector_config_from(dir.path()).unwrap();

        assert_eq!(config.project_id.as_deref(), Some("file-project"));
        assert_eq!(config.dataset.as_deref(), Some("file_dataset"));
        assert_eq!(config.table.as_deref(), Some("file_table"));
        assert_eq!(
            config.credentials_info.unwrap().expose_secret(),
            "{\"type\": \"service_account\"}"
        );
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(find_configuration_file(dir.path()).is_none());
        assert!(load_connector_config_from(dir.path()).is_ok());
    }

    #[test]
    fn prefers_yaml_over_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bigquery.json"), "{}").unwrap();
        std::fs::write(dir.path().join("bigquery.yaml"), "dataset: d\n").unwrap();

        let found = find_configuration_file(dir.path()).unwrap();

        assert!(found.ends_with("bigquery.yaml"));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bigquery.json"), "{ not json").unwrap();

        let err = load_connector_config_from(dir.path()).unwrap_err();

        assert!(matches!(err, LoadConfigError::ConfigurationFileLoad { .. }));
    }
}

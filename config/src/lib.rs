mod load;
pub mod shared;

pub use load::{LoadConfigError, load_connector_config, load_connector_config_from};

pub mod loader;
pub mod schema;

pub use loader::{ConfigError, get_config_path, load_config, merge_env_variables};
pub use schema::{Config, RetryConfig};

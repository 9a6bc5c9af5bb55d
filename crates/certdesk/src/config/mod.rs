pub mod loader;
pub mod schema;

pub use loader::{desk_api_key, load_config, load_config_from_str, validate_config, webhook_secret};
pub use schema::{
    Config, DeskConfig, ExtractorConfig, IntakeConfig, LogFormat, LoggingConfig, QueueConfig,
    StorageConfig,
};

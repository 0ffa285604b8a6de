// Infrastructure modules
pub mod config;
pub mod logging;

// Re-exports
pub use config::{BridgeConfig, DispatchConfig, LogFormatName, LoggingConfig, RegistryConfig};
pub use logging::{
    init_dev_logging, init_from_config, init_logging, init_prod_logging, LogConfig, LogFormat,
    LogOutput,
};

use shared::config::ConfigError;
use thiserror::Error;

/// Faults outside the simulation: startup, settings and transport.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid game configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to read settings file {path}: {source}")]
    SettingsIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file: {0}")]
    Settings(#[from] toml::de::Error),
}

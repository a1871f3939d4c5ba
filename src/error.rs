//! Error types for the engine platform.

/// Top-level error type for the platform.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Scheduler lifecycle errors.
///
/// Misuse (posting after shutdown, shutting down twice) is not an error; those
/// calls are no-ops. Only failures the host can actually react to live here.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Failed to spawn worker thread {name}: {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the platform.
pub type Result<T> = std::result::Result<T, Error>;

//! Configuration types.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Default name given to the background worker thread.
pub const DEFAULT_WORKER_NAME: &str = "engine-platform-worker";

/// What happens to background tasks still queued when the platform shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Drop queued tasks without running them.
    #[default]
    Discard,
    /// Keep the worker running until the queue is empty, then stop.
    Drain,
}

impl fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discard => "discard",
            Self::Drain => "drain",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ShutdownPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "drain" => Ok(Self::Drain),
            other => Err(ConfigError::InvalidValue {
                key: "shutdown_policy".to_string(),
                message: format!("expected 'discard' or 'drain', got '{other}'"),
            }),
        }
    }
}

/// Platform configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Name of the background worker thread (shows up in debuggers and panics).
    pub worker_name: String,
    /// Stack size for the worker thread. `None` uses the std default.
    pub worker_stack_size: Option<usize>,
    /// Fate of queued background tasks at shutdown.
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            worker_stack_size: None,
            shutdown_policy: ShutdownPolicy::Discard,
        }
    }
}

impl PlatformConfig {
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Reject values `std::thread::Builder` would panic on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_name.contains('\0') {
            return Err(ConfigError::InvalidValue {
                key: "worker_name".to_string(),
                message: "worker name must not contain NUL bytes".to_string(),
            });
        }
        Ok(())
    }

    /// Load configuration from `ENGINE_PLATFORM_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("ENGINE_PLATFORM_WORKER_NAME") {
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "ENGINE_PLATFORM_WORKER_NAME".to_string(),
                    message: "worker name must not be empty".to_string(),
                });
            }
            if name.contains('\0') {
                return Err(ConfigError::InvalidValue {
                    key: "ENGINE_PLATFORM_WORKER_NAME".to_string(),
                    message: "worker name must not contain NUL bytes".to_string(),
                });
            }
            config.worker_name = name.to_string();
        }

        if let Some(raw) = lookup("ENGINE_PLATFORM_STACK_SIZE") {
            let bytes: usize = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "ENGINE_PLATFORM_STACK_SIZE".to_string(),
                message: format!("{e}"),
            })?;
            if bytes == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "ENGINE_PLATFORM_STACK_SIZE".to_string(),
                    message: "stack size must be greater than zero".to_string(),
                });
            }
            config.worker_stack_size = Some(bytes);
        }

        if let Some(raw) = lookup("ENGINE_PLATFORM_SHUTDOWN_POLICY") {
            config.shutdown_policy =
                raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "ENGINE_PLATFORM_SHUTDOWN_POLICY".to_string(),
                    message: format!("expected 'discard' or 'drain', got '{}'", raw.trim()),
                })?;
        }

        Ok(config)
    }
}

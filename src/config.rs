//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default port for the HTTP API.
const DEFAULT_PORT: u16 = 8080;

/// Service configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Port the HTTP API binds to.
    pub port: u16,
    /// Training webhook settings.
    pub webhook: WebhookConfig,
}

/// Agent-training webhook settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint that receives the training payload.
    pub training_url: String,
    /// Optional bearer token sent with every request.
    pub token: Option<SecretString>,
    /// Transport timeout. `None` keeps the HTTP client's default behavior.
    pub timeout: Option<Duration>,
}

impl WebhookConfig {
    pub fn new(training_url: impl Into<String>) -> Self {
        Self {
            training_url: training_url.into(),
            token: None,
            timeout: None,
        }
    }
}

impl ServiceConfig {
    /// Build configuration from `RECEPTIONIST_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("RECEPTIONIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/receptionist.db"));

        let port = match lookup("RECEPTIONIST_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "RECEPTIONIST_PORT".into(),
                message: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let training_url = lookup("RECEPTIONIST_TRAINING_WEBHOOK_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("RECEPTIONIST_TRAINING_WEBHOOK_URL".into()))?;

        let token = lookup("RECEPTIONIST_WEBHOOK_TOKEN")
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let timeout = match lookup("RECEPTIONIST_WEBHOOK_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    key: "RECEPTIONIST_WEBHOOK_TIMEOUT_SECS".into(),
                    message: e.to_string(),
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            db_path,
            port,
            webhook: WebhookConfig {
                training_url,
                token,
                timeout,
            },
        })
    }
}

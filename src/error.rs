//! Error types for the receptionist setup service.

use crate::setup::ProvisioningStep;

/// Error raised by a single setup step.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Draft error: {0}")]
    Draft(#[from] DraftError),
}

impl Error {
    /// The wrapped error's own message, without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Database(e) => e.to_string(),
            Self::Webhook(e) => e.to_string(),
            Self::Draft(e) => e.to_string(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Agent-training webhook errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Training webhook request failed: {0}")]
    Request(String),

    #[error("Training webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Training webhook returned malformed body: {0}")]
    Malformed(String),

    #[error("Training webhook response has no agent id")]
    MissingAgentId,
}

/// Durable draft storage errors.
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("Draft storage failed: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Draft under key {key} could not be encoded: {reason}")]
    Encode { key: String, reason: String },
}

/// Errors that end a setup-completion run.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// No reconstructable draft carries a business name.
    #[error("Business information is missing. Please restart onboarding.")]
    MissingBusinessName,

    /// A setup run for this identity is already in flight.
    #[error("Setup is already running for {identity}")]
    AlreadyRunning { identity: String },

    /// A required step failed; `message` is the underlying error text, unmodified.
    #[error("{message}")]
    StepFailed {
        step: ProvisioningStep,
        message: String,
    },

    /// The identity has no complete account yet.
    #[error("No provisioned account for {identity}")]
    NotProvisioned { identity: String },

    /// The run's task panicked or was cancelled by the runtime.
    #[error("Setup was interrupted: {0}")]
    Interrupted(String),

    #[error("Draft could not be loaded: {0}")]
    Draft(#[from] DraftError),

    #[error("Account could not be read: {0}")]
    Database(#[from] DatabaseError),
}

impl SetupError {
    /// Whether the failure happened before any external side effect.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingBusinessName)
    }
}

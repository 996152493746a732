//! Error types for the lead responder.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("CRM error: {0}")]
    Crm(#[from] CrmError),

    #[error("Messenger error: {0}")]
    Messenger(#[from] MessengerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion channel errors (Telegram, mailbox).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Channel health check failed: {name}")]
    HealthCheckFailed { name: String },
}

/// CRM collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("CRM authentication failed with status {status}")]
    AuthFailed { status: u16 },

    #[error("CRM request failed: {0}")]
    RequestFailed(String),

    #[error("CRM returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid CRM response: {0}")]
    InvalidResponse(String),
}

/// Messaging gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("Messenger request failed: {0}")]
    RequestFailed(String),

    #[error("Messenger returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Message rejected by gateway: {0}")]
    Rejected(String),

    #[error("Phone number has no digits: {0:?}")]
    InvalidPhone(String),
}

/// Result type alias for the lead responder.
pub type Result<T> = std::result::Result<T, Error>;

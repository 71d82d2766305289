use thiserror::Error;

/// Top-level error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Error from the external messaging client.
    #[error("client error: {0}")]
    Client(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// On-disk persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Webhook delivery error.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// A reconnection sequence is already running.
    #[error("already reconnecting")]
    AlreadyReconnecting,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

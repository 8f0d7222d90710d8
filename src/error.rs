//! Error types for voxbridge.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxbridgeError {
    // Configuration errors
    #[error("Configuration file not found at {}", path.display())]
    ConfigFileNotFound { path: std::path::PathBuf },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Ingress errors
    #[error("Chunk rejected at ingress: {message}")]
    ChunkRejected { message: String },

    #[error("Audio decode failed: {message}")]
    AudioDecode { message: String },

    // Provider errors (single-shot path; the streaming path degrades to a
    // sentinel result instead of erroring)
    #[error("Provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    // Speaker identification errors
    #[error("Fingerprint extraction failed: {message}")]
    Fingerprint { message: String },

    // Connection lifecycle errors
    #[error("Unknown connection: {id}")]
    ConnectionNotFound { id: String },

    #[error("Connection already registered: {id}")]
    DuplicateConnection { id: String },

    // Transport to the remote recognition backend
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxbridgeError>;

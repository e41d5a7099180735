//! Error types for the generator's configuration boundary.
//!
//! Everything inside [`crate::generator::Generator::generate`] is infallible
//! by construction: every `create` routine that might exhaust a choice falls
//! back to a simpler node (see the crate-level docs). The only place this
//! crate can fail is loading a [`crate::policy::GenPolicy`] from a file.

use thiserror::Error;

/// Errors that can occur while loading or saving a [`crate::policy::GenPolicy`].
#[derive(Debug, Error)]
pub enum GenError {
    /// Failed to read the policy file from disk.
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the policy file as TOML.
    #[error("failed to parse policy as TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize the policy to TOML.
    #[error("failed to serialize policy to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Failed to parse the policy file as JSON.
    #[error("failed to parse policy as JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The requested policy file does not exist.
    #[error("policy file not found: {0}")]
    NotFound(String),
}

/// Result alias for configuration operations.
pub type GenResult<T> = Result<T, GenError>;

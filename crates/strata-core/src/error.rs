//! Error types for the Strata resolver

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrataError {
    /// No user identity was supplied to a gate.
    #[error("Unauthenticated: no user identity supplied")]
    Unauthenticated,

    /// A caller required organizational context that was missing or not a positive id.
    ///
    /// The resolver never raises this: an unusable id only skips its stage.
    #[error("Invalid context: {message}")]
    InvalidContext { message: String },

    /// The permission store could not answer a query.
    #[error("Store failure: {message}")]
    StoreFailure { message: String },

    #[error("Permission check cancelled")]
    Cancelled,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StrataError {
    pub fn invalid_context(message: impl Into<String>) -> Self {
        Self::InvalidContext {
            message: message.into(),
        }
    }

    pub fn store_failure(message: impl Into<String>) -> Self {
        Self::StoreFailure {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True when the error came from the data layer rather than from the caller.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;

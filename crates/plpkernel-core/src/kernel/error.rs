//! # Kernel Errors
//!
//! [`Error`] covers everything the registry can report: registration
//! conflicts, missing factory sources, construction failures, fatal service
//! errors and wrapped storage failures. Resolving an unknown service is not
//! an error; it yields `Ok(None)`.
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::storage::error::StorageSystemError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// A service with this name already exists; the existing one is kept.
    #[error("Service '{service}' is already registered")]
    AlreadyRegistered { service: String },

    /// No factory was provided under the referenced source id.
    #[error("No factory source '{source_id}' available for service '{service}'")]
    SourceNotFound { service: String, source_id: String },

    /// A factory is already provided under this source id; the existing one is kept.
    #[error("Factory source '{source_id}' is already provided")]
    SourceAlreadyProvided { source_id: String },

    #[error("Invalid service name '{0}': expected a lowercase slug (a-z, 0-9, '_' or '-')")]
    InvalidServiceName(String),

    /// The factory for a service failed while constructing it.
    #[error("Failed to construct service '{service}': {message}")]
    ServiceConstruction {
        service: String,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// A service was requested again while it was still being constructed.
    #[error("Circular resolution of service '{service}' ({chain})")]
    CircularResolution { service: String, chain: String },

    /// Raised by `report_error(.., fatal = true)` after the alert was logged.
    #[error("Fatal error in service '{service}' (code {code}): {message}")]
    FatalServiceError {
        service: String,
        code: i64,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl Error {
    /// Whether this error ends the current operation for good
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FatalServiceError { .. })
    }
}

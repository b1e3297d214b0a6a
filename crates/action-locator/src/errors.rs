//! Error types for locator system

use device_adapter::DeviceError;
use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// No candidate of the list matched within the allotted time
    #[error("target '{target}' not found")]
    NotFound { target: String },

    /// The session died while probing candidates
    #[error("session failed while resolving '{target}': {source}")]
    Session {
        target: String,
        #[source]
        source: DeviceError,
    },
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::NotFound { .. })
    }

    pub fn target(&self) -> &str {
        match self {
            LocatorError::NotFound { target } | LocatorError::Session { target, .. } => target,
        }
    }
}

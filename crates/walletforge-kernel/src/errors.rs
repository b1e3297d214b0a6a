use std::path::{Path, PathBuf};

use device_adapter::{DeviceError, ShellError};
use surface_perceiver::{PerceiverError, SurfaceState};
use thiserror::Error;

use crate::workflows::Step;

/// Failure of one unit of work.
#[derive(Debug, Error, Clone)]
pub enum UnitError {
    /// The automation session is gone; the run cannot continue.
    #[error("session error: {0}")]
    Session(DeviceError),

    #[error("step {step}: target '{target}' not found")]
    StepNotFound {
        step: Step,
        target: String,
        diagnostic: Option<PathBuf>,
    },

    #[error("interaction failed: {0}")]
    Interaction(String),

    #[error("manual intervention required: {reason}")]
    ManualInterventionRequired {
        reason: String,
        diagnostic: Option<PathBuf>,
    },

    #[error("step {step}: timed out waiting for {waiting_for}")]
    Timeout {
        step: Step,
        waiting_for: String,
        diagnostic: Option<PathBuf>,
    },

    #[error("step {step}: unexpected screen state '{state}'")]
    UnexpectedState {
        step: Step,
        state: SurfaceState,
        diagnostic: Option<PathBuf>,
    },

    #[error("incomplete result: {field} is empty")]
    IncompleteResult { field: &'static str },

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("{0}")]
    UnknownFailure(String),
}

impl UnitError {
    pub fn is_retryable(&self) -> bool {
        match self {
            UnitError::Session(_) | UnitError::ManualInterventionRequired { .. } => false,
            UnitError::Shell(err) => err.is_retryable(),
            _ => true,
        }
    }

    pub fn is_session_fatal(&self) -> bool {
        matches!(self, UnitError::Session(_))
    }

    pub fn diagnostic(&self) -> Option<&Path> {
        match self {
            UnitError::StepNotFound { diagnostic, .. }
            | UnitError::Timeout { diagnostic, .. }
            | UnitError::UnexpectedState { diagnostic, .. }
            | UnitError::ManualInterventionRequired { diagnostic, .. } => diagnostic.as_deref(),
            _ => None,
        }
    }

    /// Stable tag used in logs and the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitError::Session(_) => "session",
            UnitError::StepNotFound { .. } => "step_not_found",
            UnitError::Interaction(_) => "interaction",
            UnitError::ManualInterventionRequired { .. } => "manual_intervention_required",
            UnitError::Timeout { .. } => "timeout",
            UnitError::UnexpectedState { .. } => "unexpected_state",
            UnitError::IncompleteResult { .. } => "incomplete_result",
            UnitError::Shell(_) => "shell",
            UnitError::UnknownFailure(_) => "unknown",
        }
    }
}

impl From<DeviceError> for UnitError {
    fn from(err: DeviceError) -> Self {
        match err {
            err if err.is_session_fatal() => UnitError::Session(err),
            DeviceError::Interaction(msg) => UnitError::Interaction(msg),
            other => UnitError::UnknownFailure(other.to_string()),
        }
    }
}

impl From<PerceiverError> for UnitError {
    fn from(err: PerceiverError) -> Self {
        match err {
            PerceiverError::Device(err) => err.into(),
            PerceiverError::Locator(action_locator::LocatorError::Session { source, .. }) => {
                source.into()
            }
            PerceiverError::Locator(other) => UnitError::UnknownFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_map_onto_unit_taxonomy() {
        let err: UnitError = DeviceError::Session("gone".into()).into();
        assert!(err.is_session_fatal());
        assert!(!err.is_retryable());

        let err: UnitError = DeviceError::Interaction("stale".into()).into();
        assert!(matches!(err, UnitError::Interaction(_)));
        assert!(err.is_retryable());

        let err: UnitError = DeviceError::Protocol("500".into()).into();
        assert_eq!(err.kind(), "unknown");
    }

    #[test]
    fn manual_intervention_is_final() {
        let err = UnitError::ManualInterventionRequired {
            reason: "captcha".into(),
            diagnostic: Some(PathBuf::from("/tmp/diag/unit-7")),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.diagnostic(), Some(Path::new("/tmp/diag/unit-7")));
    }

    #[test]
    fn missing_shell_binary_is_not_retried() {
        let err: UnitError = ShellError::BinaryNotFound("adb".into()).into();
        assert!(!err.is_retryable());
        let err: UnitError = ShellError::CommandFailed {
            command: "adb shell".into(),
            reason: "offline".into(),
        }
        .into();
        assert!(err.is_retryable());
    }
}

//! Per-unit state machines and the helpers they share.

pub mod claim;
pub mod wallet_creation;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use action_flow::Pacing;
use action_locator::{LocatorError, LocatorList, Resolution, SelectorResolver};
use async_trait::async_trait;
use device_adapter::{DeviceSession, DeviceShell, Interaction, SurfaceId};
use serde::Serialize;
use surface_perceiver::StateClassifier;
use tracing::{debug, info, warn};
use walletforge_core_types::UnitId;
use walletforge_ledger::{UnitRecord, UnitStatus};

use crate::catalog::LocatorCatalog;
use crate::diagnostics::DiagnosticsCapture;
use crate::errors::UnitError;
use crate::settings::TimingSettings;

pub use claim::ClaimFlow;
pub use wallet_creation::WalletCreationFlow;

const PROMPT_TIMEOUT_CAP: Duration = Duration::from_secs(3);

/// Named position inside a unit workflow, used in logs, errors and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Start,
    PermissionHandling,
    PrimaryActionSubmitted,
    SecretEntry,
    SecretConfirmation,
    AwaitingCompletion,
    ReadResult,
    Authentication,
    OpenLink,
    AwaitSurface,
    Classify,
    PerformAction,
    Verify,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Start => "start",
            Step::PermissionHandling => "permission-handling",
            Step::PrimaryActionSubmitted => "primary-action-submitted",
            Step::SecretEntry => "secret-entry",
            Step::SecretConfirmation => "secret-confirmation",
            Step::AwaitingCompletion => "awaiting-completion",
            Step::ReadResult => "read-result",
            Step::Authentication => "authentication",
            Step::OpenLink => "open-link",
            Step::AwaitSurface => "await-surface",
            Step::Classify => "classify",
            Step::PerformAction => "perform-action",
            Step::Verify => "verify",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account fields a successful unit produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFields {
    pub name: String,
    pub address: String,
    pub secret_code: String,
}

impl UnitFields {
    /// Reject results with an empty required field.
    pub fn ensure_complete(self) -> Result<Self, UnitError> {
        for (field, value) in [
            ("name", &self.name),
            ("address", &self.address),
            ("secret_code", &self.secret_code),
        ] {
            if value.trim().is_empty() {
                return Err(UnitError::IncompleteResult { field });
            }
        }
        Ok(self)
    }
}

/// One unit as handed to a workflow.
#[derive(Debug, Clone)]
pub struct UnitJob {
    pub record: UnitRecord,
    /// Link assigned to this unit (claim only).
    pub link: Option<String>,
}

impl UnitJob {
    pub fn new(record: UnitRecord) -> Self {
        Self { record, link: None }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn id(&self) -> UnitId {
        self.record.id
    }
}

/// Final result of a unit, always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Success(UnitFields),
    Failed {
        reason: String,
        diagnostic: Option<PathBuf>,
    },
}

impl UnitOutcome {
    pub fn from_result(result: Result<UnitFields, UnitError>) -> Self {
        match result {
            Ok(fields) => UnitOutcome::Success(fields),
            Err(err) => UnitOutcome::Failed {
                reason: err.to_string(),
                diagnostic: err.diagnostic().map(|p| p.to_path_buf()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Success(_))
    }

    /// Text stored in the ledger `error` column.
    pub fn error_text(&self) -> Option<String> {
        match self {
            UnitOutcome::Success(_) => None,
            UnitOutcome::Failed {
                reason,
                diagnostic: Some(path),
            } => Some(format!("{reason} (diagnostics: {})", path.display())),
            UnitOutcome::Failed { reason, .. } => Some(reason.clone()),
        }
    }

    /// Fresh record for a newly created unit.
    pub fn into_record(self, id: UnitId) -> UnitRecord {
        let error = self.error_text();
        match self {
            UnitOutcome::Success(fields) => {
                UnitRecord::success(id, fields.name, fields.address, fields.secret_code)
            }
            UnitOutcome::Failed { .. } => UnitRecord::failed(id, error.unwrap_or_default()),
        }
    }

    /// `existing` with this outcome applied; account fields of a failed unit are kept.
    pub fn apply_to(self, existing: &UnitRecord) -> UnitRecord {
        let error = self.error_text();
        match self {
            UnitOutcome::Success(fields) => {
                UnitRecord::success(existing.id, fields.name, fields.address, fields.secret_code)
            }
            UnitOutcome::Failed { .. } => UnitRecord {
                status: UnitStatus::Failed,
                error,
                updated_at: Some(chrono::Utc::now()),
                ..existing.clone()
            },
        }
    }
}

/// Everything a workflow needs for one run. Borrowed from the orchestrator.
pub struct WorkflowContext<'a> {
    pub session: &'a DeviceSession,
    pub shell: &'a dyn DeviceShell,
    pub catalog: &'a LocatorCatalog,
    pub classifier: &'a StateClassifier,
    pub diagnostics: &'a DiagnosticsCapture,
    pub timing: &'a TimingSettings,
    pub pacing: Pacing,
}

impl<'a> WorkflowContext<'a> {
    pub fn resolver(&self) -> SelectorResolver<'a> {
        SelectorResolver::new(self.session).with_poll_interval(self.timing.poll_interval())
    }

    /// Wait used for prompts that may legitimately never appear.
    pub fn prompt_timeout(&self) -> Duration {
        self.timing.element_timeout().min(PROMPT_TIMEOUT_CAP)
    }

    pub fn enter(&self, unit: UnitId, step: Step) {
        info!(unit_id = %unit, step = %step, "Entering step");
    }

    pub async fn capture(&self, unit: UnitId, step: Step) -> Option<PathBuf> {
        self.diagnostics
            .capture_step(self.session, unit, step.as_str())
            .await
    }

    /// Resolve a target the step cannot do without. A miss captures
    /// diagnostics and becomes [`UnitError::StepNotFound`].
    pub async fn require(
        &self,
        unit: UnitId,
        step: Step,
        list: &LocatorList,
    ) -> Result<Resolution, UnitError> {
        match self.resolver().require(list, self.timing.element_timeout()).await {
            Ok(hit) => Ok(hit),
            Err(LocatorError::NotFound { target }) => {
                warn!(unit_id = %unit, step = %step, target = %target, "Required target not found");
                let diagnostic = self.capture(unit, step).await;
                Err(UnitError::StepNotFound {
                    step,
                    target,
                    diagnostic,
                })
            }
            Err(LocatorError::Session { source, .. }) => Err(source.into()),
        }
    }

    pub async fn optional(
        &self,
        list: &LocatorList,
        timeout: Duration,
    ) -> Result<Option<Resolution>, UnitError> {
        self.resolver()
            .find_one(list, timeout)
            .await
            .map_err(locator_to_unit)
    }

    pub async fn click(
        &self,
        unit: UnitId,
        step: Step,
        list: &LocatorList,
    ) -> Result<(), UnitError> {
        let hit = self.require(unit, step, list).await?;
        self.session.act(&hit.element, Interaction::Click).await?;
        debug!(unit_id = %unit, step = %step, target = list.target(), "Clicked");
        self.pacing.between_actions().await;
        Ok(())
    }

    /// Click `list` if it shows up within the prompt timeout.
    pub async fn click_if_present(
        &self,
        unit: UnitId,
        step: Step,
        list: &LocatorList,
    ) -> Result<bool, UnitError> {
        let Some(hit) = self.optional(list, self.prompt_timeout()).await? else {
            return Ok(false);
        };
        self.session.act(&hit.element, Interaction::Click).await?;
        debug!(unit_id = %unit, step = %step, target = list.target(), "Clicked optional target");
        self.pacing.between_actions().await;
        Ok(true)
    }

    pub async fn type_into(
        &self,
        unit: UnitId,
        step: Step,
        list: &LocatorList,
        text: &str,
    ) -> Result<(), UnitError> {
        let hit = self.require(unit, step, list).await?;
        self.session.act(&hit.element, Interaction::Clear).await?;
        self.session
            .act(&hit.element, Interaction::Type(text.to_string()))
            .await?;
        debug!(unit_id = %unit, step = %step, target = list.target(), "Typed");
        self.pacing.between_actions().await;
        Ok(())
    }

    /// Trimmed text of `list`, if it resolves within `timeout` and is non-empty.
    pub async fn read_text(
        &self,
        list: &LocatorList,
        timeout: Duration,
    ) -> Result<Option<String>, UnitError> {
        let Some(hit) = self.optional(list, timeout).await? else {
            return Ok(None);
        };
        let text = self.session.read_text(&hit.element).await?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    /// Click a target on an embedded surface, returning to native afterwards.
    pub async fn click_on_surface(
        &self,
        unit: UnitId,
        step: Step,
        surface: &SurfaceId,
        list: &LocatorList,
    ) -> Result<(), UnitError> {
        self.session.switch_surface(surface).await?;
        let found = self
            .resolver()
            .require(list, self.timing.element_timeout())
            .await;
        let clicked = match &found {
            Ok(hit) => self
                .session
                .act(&hit.element, Interaction::Click)
                .await
                .map_err(UnitError::from),
            Err(_) => Ok(()),
        };
        let restored = self.session.switch_to_native().await;
        match found {
            Ok(_) => {}
            Err(LocatorError::NotFound { target }) => {
                warn!(
                    unit_id = %unit,
                    step = %step,
                    target = %target,
                    %surface,
                    "Required target not found"
                );
                let diagnostic = self.capture(unit, step).await;
                return Err(UnitError::StepNotFound {
                    step,
                    target,
                    diagnostic,
                });
            }
            Err(LocatorError::Session { source, .. }) => return Err(source.into()),
        }
        clicked?;
        restored?;
        debug!(
            unit_id = %unit,
            step = %step,
            target = list.target(),
            %surface,
            "Clicked on embedded surface"
        );
        self.pacing.between_actions().await;
        Ok(())
    }

    /// Stop the app and start it again, optionally wiping its data first.
    pub async fn restart_app(&self, clear_data: bool) -> Result<(), UnitError> {
        let package = self.session.app().package.clone();
        if let Err(err) = self.shell.force_stop(&package) {
            warn!(error = %err, "force-stop failed, relying on session terminate");
        }
        if clear_data {
            if let Err(err) = self.shell.clear_app_data(&package) {
                warn!(error = %err, "pm clear failed, falling back to session clear");
                self.session.clear_app_data().await?;
            }
        }
        self.session.relaunch_app().await?;
        Ok(())
    }
}

fn locator_to_unit(err: LocatorError) -> UnitError {
    match err {
        LocatorError::Session { source, .. } => source.into(),
        LocatorError::NotFound { target } => {
            UnitError::UnknownFailure(format!("target '{target}' not found"))
        }
    }
}

/// One kind of unit of work.
#[async_trait]
pub trait UnitWorkflow: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drive the app through one unit. Never retries on its own.
    async fn run(&self, ctx: &WorkflowContext<'_>, job: &UnitJob) -> Result<UnitFields, UnitError>;

    /// Return the app to a clean starting point before a retry or the next unit.
    async fn recover(&self, ctx: &WorkflowContext<'_>) -> Result<(), UnitError>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn outcome_from_error_keeps_diagnostic_path() {
        let err = UnitError::StepNotFound {
            step: Step::SecretEntry,
            target: "passcode_input".into(),
            diagnostic: Some(PathBuf::from("/tmp/diag/unit-3")),
        };
        let outcome = UnitOutcome::from_result(Err(err));
        let record = outcome.clone().into_record(UnitId(3));
        assert_eq!(record.status, UnitStatus::Failed);
        let error = record.error.unwrap();
        assert!(error.contains("secret-entry"));
        assert!(error.contains("/tmp/diag/unit-3"));
        assert!(matches!(
            outcome,
            UnitOutcome::Failed { diagnostic: Some(ref p), .. }
                if p == Path::new("/tmp/diag/unit-3")
        ));
    }

    #[test]
    fn failed_outcome_keeps_account_fields() {
        let existing = UnitRecord::success(UnitId(2), "Wallet 2", "0xabc", "123456");
        let updated = UnitOutcome::Failed {
            reason: "claim not confirmed".into(),
            diagnostic: None,
        }
        .apply_to(&existing);
        assert_eq!(updated.status, UnitStatus::Failed);
        assert_eq!(updated.name, "Wallet 2");
        assert_eq!(updated.secret_code, "123456");
        assert!(updated.validate().is_ok());
    }

    #[test]
    fn empty_field_is_incomplete() {
        let fields = UnitFields {
            name: "Wallet 1".into(),
            address: " ".into(),
            secret_code: "123456".into(),
        };
        assert!(matches!(
            fields.ensure_complete(),
            Err(UnitError::IncompleteResult { field: "address" })
        ));
    }
}

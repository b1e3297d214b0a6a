//! Drives the outstanding units of one run through a single device session.

use std::fs;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use action_flow::{with_retry_if, Pacing, RetryPolicy};
use chrono::{DateTime, Utc};
use device_adapter::{DeviceError, DeviceSession, DeviceShell};
use futures::FutureExt;
use serde::Serialize;
use surface_perceiver::{HeuristicTextClassifier, StateClassifier};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use walletforge_core_types::{UnitId, UnitStatus};
use walletforge_ledger::{Ledger, LedgerError, LedgerSummary, UnitRecord};

use crate::accounts::{AccountGenerator, RandomAccountGenerator};
use crate::catalog::LocatorCatalog;
use crate::diagnostics::DiagnosticsCapture;
use crate::errors::UnitError;
use crate::settings::{LinkFallback, ModeKind, Settings, TimingSettings};
use crate::workflows::{
    ClaimFlow, UnitFields, UnitJob, UnitOutcome, UnitWorkflow, WalletCreationFlow, WorkflowContext,
};

pub const SUMMARY_FILE: &str = "run-summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Work towards `target_total` rows, appending each new unit.
    Create { target_total: u32 },
    /// Process pending rows (and failed ones when asked), updating in place.
    Claim { include_failed: bool },
}

impl RunMode {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.run.mode {
            ModeKind::Create => RunMode::Create {
                target_total: settings.run.target_total,
            },
            ModeKind::Claim => RunMode::Claim {
                include_failed: settings.claim.include_failed,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Create { .. } => "create",
            RunMode::Claim { .. } => "claim",
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to open automation session: {0}")]
    SessionOpen(#[source] DeviceError),

    #[error("session lost while processing unit {unit}: {source}")]
    SessionLost {
        unit: UnitId,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Interrupted,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: &'static str,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed: String,
    pub planned: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerSummary>,
}

impl RunSummary {
    fn start(mode: &RunMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode: mode.as_str(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            finished_at: None,
            elapsed: String::new(),
            planned: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            abort_reason: None,
            ledger: None,
        }
    }
}

/// Owns the run's session. Dropping it without [`SessionGuard::close`]
/// (the run future was cancelled) hands the close to the runtime.
struct SessionGuard(Arc<DeviceSession>);

impl SessionGuard {
    fn session(&self) -> &DeviceSession {
        &self.0
    }

    async fn close(self) {
        self.0.close().await;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.0.is_closed() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Run cancelled, closing session in the background");
                let session = self.0.clone();
                handle.spawn(async move { session.close().await });
            }
            Err(_) => warn!("Run cancelled outside a runtime, session left open"),
        }
    }
}

/// One planned unit; `skip` carries the reason when it will not be attempted.
#[derive(Debug, Clone)]
struct PlannedUnit {
    job: UnitJob,
    skip: Option<String>,
}

pub struct Orchestrator {
    ledger: Ledger,
    shell: Arc<dyn DeviceShell>,
    catalog: LocatorCatalog,
    classifier: StateClassifier,
    diagnostics: DiagnosticsCapture,
    timing: TimingSettings,
    retry: RetryPolicy,
    pacing: Pacing,
    accounts: Arc<dyn AccountGenerator>,
    mode: RunMode,
    relaunch_between_units: bool,
    link_fallback: LinkFallback,
    summary_path: PathBuf,
}

impl Orchestrator {
    pub fn new(
        settings: &Settings,
        mode: RunMode,
        ledger: Ledger,
        shell: Arc<dyn DeviceShell>,
        catalog: LocatorCatalog,
    ) -> Self {
        let classifier =
            StateClassifier::new(catalog.signals.clone(), HeuristicTextClassifier::default());
        Self {
            ledger,
            shell,
            catalog,
            classifier,
            diagnostics: DiagnosticsCapture::new(settings.diagnostics_dir()),
            timing: settings.timing.clone(),
            retry: settings.retry.policy(),
            pacing: settings.timing.pacing(),
            accounts: Arc::new(RandomAccountGenerator::default()),
            mode,
            relaunch_between_units: settings.run.relaunch_between_units,
            link_fallback: settings.claim.link_fallback,
            summary_path: settings.ledger.dir.join(SUMMARY_FILE),
        }
    }

    pub fn with_accounts(mut self, accounts: Arc<dyn AccountGenerator>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn summary_path(&self) -> &std::path::Path {
        &self.summary_path
    }

    /// Run until done or Ctrl-C.
    pub async fn run<F>(&self, open_session: F) -> Result<RunSummary, RunError>
    where
        F: Future<Output = Result<DeviceSession, DeviceError>>,
    {
        self.run_until(open_session, shutdown_signal()).await
    }

    /// Run until done or until `shutdown` resolves. The summary file is
    /// written on every path, including errors.
    #[instrument(skip_all, fields(mode = self.mode.as_str()))]
    pub async fn run_until<F, S>(
        &self,
        open_session: F,
        shutdown: S,
    ) -> Result<RunSummary, RunError>
    where
        F: Future<Output = Result<DeviceSession, DeviceError>>,
        S: Future<Output = ()>,
    {
        let clock = Instant::now();
        let mut summary = RunSummary::start(&self.mode);
        let result = self.execute(open_session, shutdown, &mut summary).await;

        if let Err(err) = &result {
            error!(error = %err, "Run aborted");
            summary.status = RunStatus::Aborted;
            summary.abort_reason = Some(err.to_string());
        }
        summary.finished_at = Some(Utc::now());
        summary.elapsed = humantime::format_duration(std::time::Duration::from_secs(
            clock.elapsed().as_secs(),
        ))
        .to_string();
        summary.ledger = match self.ledger.summary() {
            Ok(ledger) => Some(ledger),
            Err(err) => {
                warn!(error = %err, "Could not summarize ledger");
                None
            }
        };
        self.write_summary(&summary);
        info!(
            status = ?summary.status,
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed = %summary.elapsed,
            "Run finished"
        );
        result.map(|()| summary)
    }

    async fn execute<F, S>(
        &self,
        open_session: F,
        shutdown: S,
        summary: &mut RunSummary,
    ) -> Result<(), RunError>
    where
        F: Future<Output = Result<DeviceSession, DeviceError>>,
        S: Future<Output = ()>,
    {
        let plan = self.plan()?;
        summary.planned = plan.len();
        if plan.is_empty() {
            info!("Nothing outstanding");
            return Ok(());
        }

        let session = open_session.await.map_err(RunError::SessionOpen)?;
        let guard = SessionGuard(Arc::new(session));
        info!(units = plan.len(), "Session open, processing units");
        let outcome = AssertUnwindSafe(self.process(guard.session(), plan, shutdown, summary))
            .catch_unwind()
            .await;
        guard.close().await;
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                error!("Unit workflow panicked, session closed");
                panic::resume_unwind(payload)
            }
        }
    }

    fn plan(&self) -> Result<Vec<PlannedUnit>, LedgerError> {
        let records = self.ledger.load_all()?;
        match self.mode {
            RunMode::Create { target_total } => {
                let existing = records.len() as u32;
                let next_id = records.iter().map(|r| r.id.0).max().unwrap_or(0) + 1;
                let count = target_total.saturating_sub(existing);
                info!(existing, target_total, count, "Resuming create run");
                Ok((0..count)
                    .map(|i| PlannedUnit {
                        job: UnitJob::new(UnitRecord::pending(UnitId(next_id + i))),
                        skip: None,
                    })
                    .collect())
            }
            RunMode::Claim { include_failed } => {
                let links = self.ledger.load_links()?;
                let mut plan = Vec::new();
                for (position, record) in records.into_iter().enumerate() {
                    let outstanding = match record.status {
                        UnitStatus::Pending => true,
                        UnitStatus::Failed => include_failed,
                        _ => false,
                    };
                    if !outstanding {
                        continue;
                    }
                    if !record.has_account() {
                        let reason = "missing account name, address or secret code".to_string();
                        plan.push(PlannedUnit {
                            job: UnitJob::new(record),
                            skip: Some(reason),
                        });
                        continue;
                    }
                    let link = match links.get(position) {
                        Some(link) => Some(link.value.clone()),
                        None => match (self.link_fallback, links.first()) {
                            (LinkFallback::ReuseFirst, Some(first)) => {
                                warn!(
                                    unit_id = %record.id,
                                    position = position + 1,
                                    "No link for unit, reusing the first link"
                                );
                                Some(first.value.clone())
                            }
                            _ => None,
                        },
                    };
                    plan.push(match link {
                        Some(link) => PlannedUnit {
                            job: UnitJob::new(record).with_link(link),
                            skip: None,
                        },
                        None => PlannedUnit {
                            skip: Some(format!("no link for ledger position {}", position + 1)),
                            job: UnitJob::new(record),
                        },
                    });
                }
                info!(
                    outstanding = plan.len(),
                    links = links.len(),
                    include_failed,
                    "Resuming claim run"
                );
                Ok(plan)
            }
        }
    }

    async fn process<S>(
        &self,
        session: &DeviceSession,
        plan: Vec<PlannedUnit>,
        shutdown: S,
        summary: &mut RunSummary,
    ) -> Result<(), RunError>
    where
        S: Future<Output = ()>,
    {
        let ctx = WorkflowContext {
            session,
            shell: self.shell.as_ref(),
            catalog: &self.catalog,
            classifier: &self.classifier,
            diagnostics: &self.diagnostics,
            timing: &self.timing,
            pacing: self.pacing,
        };
        let workflow: Box<dyn UnitWorkflow> = match self.mode {
            RunMode::Create { .. } => Box::new(WalletCreationFlow::new(self.accounts.clone())),
            RunMode::Claim { .. } => Box::new(ClaimFlow::new()),
        };
        tokio::pin!(shutdown);

        let total = plan.len();
        let mut attempted = 0usize;
        for (index, unit) in plan.into_iter().enumerate() {
            let id = unit.job.id();
            if let Some(reason) = unit.skip {
                warn!(unit_id = %id, reason = %reason, "Skipping unit");
                self.ledger
                    .update_status(id, UnitStatus::Skipped, Some(reason))?;
                summary.skipped += 1;
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!(unit_id = %id, "Interrupted, unit left for the next run");
                    summary.status = RunStatus::Interrupted;
                    return Ok(());
                }
                result = self.run_unit(&ctx, workflow.as_ref(), &unit.job, attempted > 0) => result,
            };
            attempted += 1;

            if let Err(UnitError::Session(source)) = result {
                warn!(unit_id = %id, error = %source, "Session lost, unit left for the next run");
                return Err(RunError::SessionLost { unit: id, source });
            }
            let outcome = UnitOutcome::from_result(result);
            self.persist(&unit.job, outcome.clone())?;
            summary.processed += 1;
            match &outcome {
                UnitOutcome::Success(_) => summary.succeeded += 1,
                UnitOutcome::Failed { .. } => summary.failed += 1,
            }

            if index + 1 < total {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        warn!("Interrupted between units");
                        summary.status = RunStatus::Interrupted;
                        return Ok(());
                    }
                    _ = self.pacing.between_units() => {}
                }
            }
        }
        Ok(())
    }

    async fn run_unit(
        &self,
        ctx: &WorkflowContext<'_>,
        workflow: &dyn UnitWorkflow,
        job: &UnitJob,
        prepare: bool,
    ) -> Result<UnitFields, UnitError> {
        let unit = job.id();
        if prepare && self.relaunch_between_units {
            if let Err(err) = workflow.recover(ctx).await {
                if err.is_session_fatal() {
                    return Err(err);
                }
                warn!(unit_id = %unit, error = %err, "Preparing app for unit failed");
            }
        }

        with_retry_if(
            &self.retry,
            |err: &UnitError| err.is_retryable(),
            |attempt| {
                info!(unit_id = %unit, attempt, workflow = workflow.name(), "Running unit");
                workflow.run(ctx, job)
            },
            |attempt, err: &UnitError| {
                warn!(
                    unit_id = %unit,
                    attempt,
                    kind = err.kind(),
                    diagnostic = ?err.diagnostic(),
                    error = %err,
                    "Unit attempt failed, recovering"
                );
                let recovery = workflow.recover(ctx);
                async move {
                    if let Err(err) = recovery.await {
                        warn!(unit_id = %unit, error = %err, "Recovery failed");
                    }
                }
            },
        )
        .await
    }

    fn persist(&self, job: &UnitJob, outcome: UnitOutcome) -> Result<(), LedgerError> {
        let id = job.id();
        let record = match self.mode {
            RunMode::Create { .. } => {
                let record = outcome.into_record(id);
                self.ledger.append(&record)?;
                record
            }
            RunMode::Claim { .. } => {
                let record = outcome.apply_to(&job.record);
                self.ledger.update(&record)?;
                record
            }
        };
        info!(
            unit_id = %id,
            status = %record.status,
            error = record.error.as_deref().unwrap_or(""),
            "Unit recorded"
        );
        Ok(())
    }

    fn write_summary(&self, summary: &RunSummary) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.summary_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let body = serde_json::to_vec_pretty(summary).map_err(std::io::Error::other)?;
            fs::write(&self.summary_path, body)
        };
        if let Err(err) = write() {
            warn!(path = %self.summary_path.display(), error = %err, "Failed to write run summary");
        }
    }
}

/// Resolves on Ctrl-C; never resolves when the handler cannot be installed.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("Interrupt received");
}

//! Wallet creation and claim automation on top of a device session.
//!
//! [`Orchestrator`] reads the ledger, opens one session and drives every
//! outstanding unit through a [`UnitWorkflow`], persisting each outcome
//! before moving on.

pub mod accounts;
pub mod catalog;
pub mod diagnostics;
pub mod errors;
pub mod orchestrator;
pub mod settings;
pub mod workflows;

pub use accounts::{AccountGenerator, AccountSeed, FixedAccountGenerator, RandomAccountGenerator};
pub use catalog::{CatalogError, LocatorCatalog};
pub use diagnostics::{DiagnosticBundle, DiagnosticsCapture};
pub use errors::UnitError;
pub use orchestrator::{
    shutdown_signal, Orchestrator, RunError, RunMode, RunStatus, RunSummary, SUMMARY_FILE,
};
pub use settings::{LoadedSettings, ModeKind, Settings, SettingsError};
pub use workflows::{
    ClaimFlow, Step, UnitFields, UnitJob, UnitOutcome, UnitWorkflow, WalletCreationFlow,
    WorkflowContext,
};

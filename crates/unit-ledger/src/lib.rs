//! Resumable ledger of units of work.
//!
//! The ledger is the single source of truth for what remains to be done. Every
//! mutation is durable before the call returns, so a crash loses at most the
//! unit that was in flight.

pub mod errors;
pub mod ledger;
pub mod model;
pub mod store;

pub use errors::LedgerError;
pub use ledger::Ledger;
pub use model::{LedgerSummary, LinkRecord, UnitRecord};
pub use store::{CsvTableStore, Row, TableStore};
pub use walletforge_core_types::{UnitId, UnitStatus};

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use walletforge_core_types::UnitId;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unit {0} not found in ledger")]
    NotFound(UnitId),

    #[error("unit {0} already recorded")]
    Duplicate(UnitId),

    #[error("unit {id} violates record invariant: {reason}")]
    Invariant { id: UnitId, reason: String },

    #[error("table '{table}' row {row} is malformed: {reason}")]
    Corrupt {
        table: String,
        row: usize,
        reason: String,
    },

    #[error("i/o on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("csv on table '{table}': {source}")]
    Csv {
        table: String,
        #[source]
        source: csv::Error,
    },
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(table: &str, source: csv::Error) -> Self {
        LedgerError::Csv {
            table: table.to_string(),
            source,
        }
    }
}

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use walletforge_core_types::{UnitId, UnitStatus};

use crate::errors::LedgerError;
use crate::store::Row;

pub(crate) const UNIT_COLUMNS: [&str; 7] = [
    "id",
    "name",
    "address",
    "secret_code",
    "status",
    "error",
    "updated_at",
];

pub(crate) const LINK_COLUMNS: [&str; 2] = ["index", "value"];

pub const SECRET_CODE_LEN: usize = 6;

/// One row of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: UnitId,
    pub name: String,
    pub address: String,
    pub secret_code: String,
    pub status: UnitStatus,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UnitRecord {
    pub fn pending(id: UnitId) -> Self {
        Self {
            id,
            name: String::new(),
            address: String::new(),
            secret_code: String::new(),
            status: UnitStatus::Pending,
            error: None,
            updated_at: None,
        }
    }

    pub fn success(
        id: UnitId,
        name: impl Into<String>,
        address: impl Into<String>,
        secret_code: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            secret_code: secret_code.into(),
            status: UnitStatus::Success,
            error: None,
            updated_at: Some(Utc::now()),
        }
    }

    pub fn failed(id: UnitId, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            status: UnitStatus::Failed,
            updated_at: Some(Utc::now()),
            ..Self::pending(id)
        }
    }

    pub fn skipped(id: UnitId, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            status: UnitStatus::Skipped,
            updated_at: Some(Utc::now()),
            ..Self::pending(id)
        }
    }

    /// Whether the fields needed to act on an existing account are present.
    /// A claim can only end in success when all three are.
    pub fn has_account(&self) -> bool {
        !self.name.is_empty() && !self.address.is_empty() && !self.secret_code.is_empty()
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        let violation = |reason: &str| {
            Err(LedgerError::Invariant {
                id: self.id,
                reason: reason.to_string(),
            })
        };
        if self.id.0 == 0 {
            return violation("id must be positive");
        }
        if !self.secret_code.is_empty()
            && (self.secret_code.len() != SECRET_CODE_LEN
                || !self.secret_code.bytes().all(|b| b.is_ascii_digit()))
        {
            return violation("secret code must be exactly 6 digits");
        }
        match self.status {
            UnitStatus::Success
                if self.name.is_empty() || self.address.is_empty() || self.secret_code.is_empty() =>
            {
                violation("success requires name, address and secret code")
            }
            UnitStatus::Failed if self.error.as_deref().map_or(true, str::is_empty) => {
                violation("failed requires an error message")
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn to_row(&self) -> Row {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.address.clone(),
            self.secret_code.clone(),
            self.status.as_str().to_string(),
            self.error.clone().unwrap_or_default(),
            self.updated_at
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
        ]
    }

    pub(crate) fn from_row(table: &str, index: usize, row: &Row) -> Result<Self, LedgerError> {
        let corrupt = |reason: String| LedgerError::Corrupt {
            table: table.to_string(),
            row: index + 1,
            reason,
        };
        let field = |i: usize| row.get(i).map(|v| v.trim()).unwrap_or_default();

        let id = field(0)
            .parse::<u32>()
            .map_err(|err| corrupt(format!("bad id '{}': {err}", field(0))))?;
        let status = field(4)
            .parse::<UnitStatus>()
            .map_err(|err| corrupt(err.to_string()))?;
        let updated_at = match field(6) {
            "" => None,
            raw => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|err| corrupt(format!("bad timestamp '{raw}': {err}")))?
                    .with_timezone(&Utc),
            ),
        };
        Ok(Self {
            id: UnitId(id),
            name: field(1).to_string(),
            address: field(2).to_string(),
            secret_code: field(3).to_string(),
            status,
            error: Some(field(5).to_string()).filter(|e| !e.is_empty()),
            updated_at,
        })
    }
}

/// One input value consumed by the claim variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// 1-based position in the links table.
    pub index: usize,
    pub value: String,
}

impl LinkRecord {
    pub(crate) fn to_row(&self) -> Row {
        vec![self.index.to_string(), self.value.clone()]
    }
}

/// Counts by status plus the id the next appended unit will get.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub pending: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub next_id: u32,
    pub links: usize,
}

impl LedgerSummary {
    pub(crate) fn from_records(records: &[UnitRecord], links: usize) -> Self {
        let mut summary = Self {
            total: records.len(),
            links,
            next_id: records.iter().map(|r| r.id.0).max().unwrap_or(0) + 1,
            ..Default::default()
        };
        for record in records {
            match record.status {
                UnitStatus::Pending => summary.pending += 1,
                UnitStatus::Success => summary.success += 1,
                UnitStatus::Failed => summary.failed += 1,
                UnitStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn count(&self, status: UnitStatus) -> usize {
        match status {
            UnitStatus::Pending => self.pending,
            UnitStatus::Success => self.success,
            UnitStatus::Failed => self.failed,
            UnitStatus::Skipped => self.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_fields() {
        let mut record = UnitRecord::success(UnitId(1), "Wallet 1", "0xabc", "123456");
        assert!(record.validate().is_ok());
        record.address.clear();
        assert!(matches!(record.validate(), Err(LedgerError::Invariant { .. })));
    }

    #[test]
    fn account_needs_name_address_and_code() {
        let record = UnitRecord {
            name: "Wallet 5".into(),
            secret_code: "123456".into(),
            ..UnitRecord::pending(UnitId(5))
        };
        assert!(!record.has_account());
        let record = UnitRecord {
            address: "0x5".into(),
            ..record
        };
        assert!(record.has_account());
    }

    #[test]
    fn failed_requires_error() {
        let mut record = UnitRecord::failed(UnitId(2), "step create_wallet not found");
        assert!(record.validate().is_ok());
        record.error = Some(String::new());
        assert!(record.validate().is_err());
    }

    #[test]
    fn secret_code_format_is_enforced() {
        let record = UnitRecord::success(UnitId(3), "n", "a", "12a456");
        assert!(record.validate().is_err());
        let record = UnitRecord::success(UnitId(3), "n", "a", "012345");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn row_round_trip_keeps_leading_zeros_and_timestamp() {
        let record = UnitRecord::success(UnitId(4), "Wallet 4", "0xdef", "000123");
        let parsed = UnitRecord::from_row("units", 0, &record.to_row()).unwrap();
        assert_eq!(parsed.secret_code, "000123");
        assert_eq!(parsed.status, UnitStatus::Success);
        assert_eq!(
            parsed.updated_at.map(|t| t.timestamp()),
            record.updated_at.map(|t| t.timestamp())
        );
    }

    #[test]
    fn malformed_row_reports_position() {
        let row = vec!["x".to_string()];
        let err = UnitRecord::from_row("units", 4, &row).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { row: 5, .. }));
    }
}

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use tracing::{debug, info};
use walletforge_core_types::{UnitId, UnitStatus};

use crate::errors::LedgerError;
use crate::model::{LedgerSummary, LinkRecord, UnitRecord, LINK_COLUMNS, UNIT_COLUMNS};
use crate::store::{CsvTableStore, TableStore};

/// Unit and link tables over a [`TableStore`].
///
/// One writer at a time: every operation is a synchronous read-modify-write
/// that is durable before it returns.
pub struct Ledger {
    store: Box<dyn TableStore>,
    units_table: String,
    links_table: String,
}

impl Ledger {
    pub fn new(
        store: impl TableStore + 'static,
        units_table: impl Into<String>,
        links_table: impl Into<String>,
    ) -> Self {
        Self {
            store: Box::new(store),
            units_table: units_table.into(),
            links_table: links_table.into(),
        }
    }

    /// CSV-backed ledger in `dir`, created if missing.
    pub fn open_dir(
        dir: impl AsRef<Path>,
        units_table: &str,
        links_table: &str,
    ) -> Result<Self, LedgerError> {
        let store = CsvTableStore::open(dir.as_ref())?;
        Ok(Self::new(store, units_table, links_table))
    }

    pub fn units_table(&self) -> &str {
        &self.units_table
    }

    pub fn links_table(&self) -> &str {
        &self.links_table
    }

    pub fn load_all(&self) -> Result<Vec<UnitRecord>, LedgerError> {
        let rows = self.store.read_rows(&self.units_table)?;
        let mut seen = HashSet::with_capacity(rows.len());
        let mut records = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let record = UnitRecord::from_row(&self.units_table, index, row)?;
            if !seen.insert(record.id) {
                return Err(LedgerError::Corrupt {
                    table: self.units_table.clone(),
                    row: index + 1,
                    reason: format!("duplicate id {}", record.id),
                });
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Units still to process, in ledger order.
    pub fn outstanding(&self, include_failed: bool) -> Result<Vec<UnitRecord>, LedgerError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|record| match record.status {
                UnitStatus::Pending => true,
                UnitStatus::Failed => include_failed,
                _ => false,
            })
            .collect())
    }

    /// Add one record after the existing ones. Earlier rows are never rewritten.
    pub fn append(&self, record: &UnitRecord) -> Result<(), LedgerError> {
        record.validate()?;
        if self.load_all()?.iter().any(|existing| existing.id == record.id) {
            return Err(LedgerError::Duplicate(record.id));
        }
        self.store
            .append_row(&self.units_table, &UNIT_COLUMNS, &record.to_row())?;
        debug!(unit_id = %record.id, status = %record.status, "Unit appended");
        Ok(())
    }

    /// Set status and error of one existing unit, keeping its other fields.
    pub fn update_status(
        &self,
        id: UnitId,
        status: UnitStatus,
        error: Option<String>,
    ) -> Result<UnitRecord, LedgerError> {
        let mut records = self.load_all()?;
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(LedgerError::NotFound(id))?;
        record.status = status;
        record.error = error;
        record.updated_at = Some(Utc::now());
        record.validate()?;
        let updated = record.clone();
        self.write_units(&records)?;
        debug!(unit_id = %id, status = %status, "Unit status updated");
        Ok(updated)
    }

    /// Replace every field of one existing unit.
    pub fn update(&self, record: &UnitRecord) -> Result<(), LedgerError> {
        record.validate()?;
        let mut records = self.load_all()?;
        let slot = records
            .iter_mut()
            .find(|existing| existing.id == record.id)
            .ok_or(LedgerError::NotFound(record.id))?;
        *slot = record.clone();
        self.write_units(&records)?;
        debug!(unit_id = %record.id, status = %record.status, "Unit updated");
        Ok(())
    }

    /// Seed `count` pending units when the table is empty. Returns how many were created.
    pub fn initialize(&self, count: u32) -> Result<usize, LedgerError> {
        if !self.load_all()?.is_empty() {
            info!(table = %self.units_table, "Ledger already initialized");
            return Ok(0);
        }
        let records: Vec<UnitRecord> = (1..=count)
            .map(|i| UnitRecord::pending(UnitId(i)))
            .collect();
        self.write_units(&records)?;
        info!(table = %self.units_table, count, "Ledger initialized");
        Ok(records.len())
    }

    /// With `keep_rows`, every unit goes back to pending (account fields kept);
    /// otherwise the units table is removed.
    pub fn reset(&self, keep_rows: bool) -> Result<usize, LedgerError> {
        if !keep_rows {
            let removed = self.load_all().map(|r| r.len()).unwrap_or(0);
            self.store.clear(&self.units_table)?;
            info!(table = %self.units_table, removed, "Ledger cleared");
            return Ok(removed);
        }
        let mut records = self.load_all()?;
        for record in &mut records {
            record.status = UnitStatus::Pending;
            record.error = None;
            record.updated_at = None;
        }
        self.write_units(&records)?;
        info!(table = %self.units_table, count = records.len(), "Ledger reset to pending");
        Ok(records.len())
    }

    pub fn summary(&self) -> Result<LedgerSummary, LedgerError> {
        let records = self.load_all()?;
        let links = self.load_links()?.len();
        Ok(LedgerSummary::from_records(&records, links))
    }

    pub fn load_links(&self) -> Result<Vec<LinkRecord>, LedgerError> {
        let rows = self.store.read_rows(&self.links_table)?;
        let mut links = Vec::with_capacity(rows.len());
        for row in &rows {
            let value = match (row.len(), row.first(), row.get(1)) {
                // a single column is taken as the value itself
                (1, Some(value), _) => value.trim(),
                (_, _, Some(value)) => value.trim(),
                _ => "",
            };
            if value.is_empty() {
                continue;
            }
            links.push(LinkRecord {
                index: links.len() + 1,
                value: value.to_string(),
            });
        }
        Ok(links)
    }

    pub fn write_links(&self, values: &[String]) -> Result<Vec<LinkRecord>, LedgerError> {
        let links: Vec<LinkRecord> = values
            .iter()
            .filter(|v| !v.trim().is_empty())
            .enumerate()
            .map(|(i, value)| LinkRecord {
                index: i + 1,
                value: value.trim().to_string(),
            })
            .collect();
        let rows: Vec<_> = links.iter().map(LinkRecord::to_row).collect();
        self.store
            .write_rows(&self.links_table, &LINK_COLUMNS, &rows)?;
        Ok(links)
    }

    pub fn clear_links(&self) -> Result<(), LedgerError> {
        self.store.clear(&self.links_table)
    }

    fn write_units(&self, records: &[UnitRecord]) -> Result<(), LedgerError> {
        let rows: Vec<_> = records.iter().map(UnitRecord::to_row).collect();
        self.store
            .write_rows(&self.units_table, &UNIT_COLUMNS, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ledger(dir: &Path) -> Ledger {
        Ledger::open_dir(dir, "units", "links").unwrap()
    }

    #[test]
    fn append_preserves_earlier_rows() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        ledger
            .append(&UnitRecord::success(UnitId(1), "Wallet 1", "0x1", "111111"))
            .unwrap();
        ledger
            .append(&UnitRecord::failed(UnitId(2), "step not found"))
            .unwrap();

        let records = ledger.load_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Wallet 1");
        assert_eq!(records[1].error.as_deref(), Some("step not found"));
    }

    #[test]
    fn append_rejects_duplicates_and_invalid_records() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        ledger.append(&UnitRecord::pending(UnitId(1))).unwrap();
        assert!(matches!(
            ledger.append(&UnitRecord::pending(UnitId(1))),
            Err(LedgerError::Duplicate(UnitId(1)))
        ));
        let mut bad = UnitRecord::failed(UnitId(2), "x");
        bad.error = None;
        assert!(matches!(ledger.append(&bad), Err(LedgerError::Invariant { .. })));
        assert_eq!(ledger.load_all().unwrap().len(), 1);
    }

    #[test]
    fn update_status_of_unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        ledger.initialize(2).unwrap();
        let err = ledger
            .update_status(UnitId(9), UnitStatus::Failed, Some("x".into()))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(UnitId(9))));
    }

    #[test]
    fn update_status_touches_exactly_one_row() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        ledger.initialize(3).unwrap();
        ledger
            .update_status(UnitId(2), UnitStatus::Failed, Some("claim not confirmed".into()))
            .unwrap();
        let statuses: Vec<_> = ledger
            .load_all()
            .unwrap()
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![UnitStatus::Pending, UnitStatus::Failed, UnitStatus::Pending]
        );
    }

    #[test]
    fn success_without_account_fields_is_rejected() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        ledger.initialize(1).unwrap();
        let err = ledger
            .update_status(UnitId(1), UnitStatus::Success, None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Invariant { .. }));
        assert_eq!(ledger.load_all().unwrap()[0].status, UnitStatus::Pending);
    }

    #[test]
    fn restart_after_interruption_resumes_at_first_unpersisted_unit() {
        let dir = tempdir().unwrap();
        {
            let ledger = ledger(dir.path());
            ledger.initialize(3).unwrap();
            for id in [1, 2] {
                let record = UnitRecord::success(UnitId(id), format!("W{id}"), "0x", "123456");
                ledger.update(&record).unwrap();
            }
            // process dies here, before unit 3 is written
        }
        let reopened = ledger(dir.path());
        let outstanding: Vec<_> = reopened
            .outstanding(false)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(outstanding, vec![UnitId(3)]);
    }

    #[test]
    fn outstanding_can_include_failed() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        ledger.initialize(3).unwrap();
        ledger
            .update_status(UnitId(1), UnitStatus::Failed, Some("boom".into()))
            .unwrap();
        ledger
            .update_status(UnitId(2), UnitStatus::Skipped, Some("no link".into()))
            .unwrap();
        assert_eq!(ledger.outstanding(false).unwrap().len(), 1);
        assert_eq!(ledger.outstanding(true).unwrap().len(), 2);
    }

    #[test]
    fn reset_keep_rows_returns_everything_to_pending() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        ledger
            .append(&UnitRecord::success(UnitId(1), "W1", "0x1", "123456"))
            .unwrap();
        ledger.append(&UnitRecord::failed(UnitId(2), "x")).unwrap();

        assert_eq!(ledger.reset(true).unwrap(), 2);
        let records = ledger.load_all().unwrap();
        assert!(records.iter().all(|r| r.status == UnitStatus::Pending && r.error.is_none()));
        assert_eq!(records[0].secret_code, "123456");

        assert_eq!(ledger.reset(false).unwrap(), 2);
        assert!(ledger.load_all().unwrap().is_empty());
    }

    #[test]
    fn initialize_only_seeds_empty_tables() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        assert_eq!(ledger.initialize(3).unwrap(), 3);
        assert_eq!(ledger.initialize(5).unwrap(), 0);
        assert_eq!(ledger.summary().unwrap().pending, 3);
    }

    #[test]
    fn summary_counts_by_status() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        ledger
            .append(&UnitRecord::success(UnitId(1), "W1", "0x1", "123456"))
            .unwrap();
        ledger.append(&UnitRecord::failed(UnitId(2), "x")).unwrap();
        ledger.append(&UnitRecord::skipped(UnitId(3), "no link")).unwrap();
        ledger.write_links(&["https://a".into()]).unwrap();

        let summary = ledger.summary().unwrap();
        assert_eq!(
            (summary.total, summary.success, summary.failed, summary.skipped),
            (3, 1, 1, 1)
        );
        assert_eq!(summary.next_id, 4);
        assert_eq!(summary.links, 1);
    }

    #[test]
    fn links_survive_reopen_and_skip_blanks() {
        let dir = tempdir().unwrap();
        ledger(dir.path())
            .write_links(&["https://x/1".into(), "  ".into(), "https://x/2".into()])
            .unwrap();
        let links = ledger(dir.path()).load_links().unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].index, 2);
        assert_eq!(links[1].value, "https://x/2");
    }

    #[test]
    fn single_column_link_tables_are_accepted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("links.csv"), "link\nhttps://one\nhttps://two\n").unwrap();
        let links = ledger(dir.path()).load_links().unwrap();
        assert_eq!(
            links.iter().map(|l| l.value.as_str()).collect::<Vec<_>>(),
            vec!["https://one", "https://two"]
        );
    }
}

//! Persisted table capability

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::errors::LedgerError;

pub type Row = Vec<String>;

/// Whole-row granular table storage. Every write is durable when it returns.
pub trait TableStore: Send + Sync {
    /// Data rows in stored order, header excluded. A missing table is empty.
    fn read_rows(&self, table: &str) -> Result<Vec<Row>, LedgerError>;

    /// Atomically replace the whole table.
    fn write_rows(&self, table: &str, header: &[&str], rows: &[Row]) -> Result<(), LedgerError>;

    /// Add one row after the existing ones without rewriting them.
    fn append_row(&self, table: &str, header: &[&str], row: &Row) -> Result<(), LedgerError>;

    /// Remove the table entirely.
    fn clear(&self, table: &str) -> Result<(), LedgerError>;
}

/// One `<table>.csv` file per table inside a directory.
#[derive(Debug, Clone)]
pub struct CsvTableStore {
    dir: PathBuf,
}

impl CsvTableStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| LedgerError::io(&dir, err))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    /// Cut a trailing partial line left by an interrupted append.
    fn repair_torn_tail(&self, table: &str, file: &mut File) -> Result<(), LedgerError> {
        let path = self.table_path(table);
        let mut content = Vec::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut content))
            .map_err(|err| LedgerError::io(&path, err))?;
        if content.is_empty() || content.ends_with(b"\n") {
            return Ok(());
        }
        let keep = content
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        warn!(table, dropped = content.len() - keep, "Discarding torn trailing row");
        file.set_len(keep as u64)
            .and_then(|_| file.sync_all())
            .map_err(|err| LedgerError::io(&path, err))
    }
}

/// Content up to the last complete line.
fn complete_lines(content: &[u8]) -> &[u8] {
    if content.is_empty() || content.ends_with(b"\n") {
        return content;
    }
    match content.iter().rposition(|b| *b == b'\n') {
        Some(i) => &content[..=i],
        None => &[],
    }
}

impl TableStore for CsvTableStore {
    fn read_rows(&self, table: &str) -> Result<Vec<Row>, LedgerError> {
        let path = self.table_path(table);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(LedgerError::io(&path, err)),
        };
        let complete = complete_lines(&content);
        if complete.len() != content.len() {
            warn!(table, "Ignoring torn trailing row");
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(complete);
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| LedgerError::csv(table, err))?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    fn write_rows(&self, table: &str, header: &[&str], rows: &[Row]) -> Result<(), LedgerError> {
        let path = self.table_path(table);
        let tmp = NamedTempFile::new_in(&self.dir).map_err(|err| LedgerError::io(&self.dir, err))?;
        let mut writer = csv::Writer::from_writer(tmp);
        writer
            .write_record(header)
            .map_err(|err| LedgerError::csv(table, err))?;
        for row in rows {
            writer
                .write_record(row)
                .map_err(|err| LedgerError::csv(table, err))?;
        }
        let tmp = writer
            .into_inner()
            .map_err(|err| {
                LedgerError::io(&path, io::Error::new(err.error().kind(), err.error().to_string()))
            })?;
        tmp.as_file()
            .sync_all()
            .map_err(|err| LedgerError::io(tmp.path(), err))?;
        tmp.persist(&path)
            .map_err(|err| LedgerError::io(&path, err.error))?;
        sync_dir(&self.dir);
        debug!(table, rows = rows.len(), "Table rewritten");
        Ok(())
    }

    fn append_row(&self, table: &str, header: &[&str], row: &Row) -> Result<(), LedgerError> {
        let path = self.table_path(table);
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|err| LedgerError::io(&path, err))?;
        self.repair_torn_tail(table, &mut file)?;
        let is_empty = file
            .metadata()
            .map_err(|err| LedgerError::io(&path, err))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut file);
        if is_empty {
            writer
                .write_record(header)
                .map_err(|err| LedgerError::csv(table, err))?;
        }
        writer
            .write_record(row)
            .map_err(|err| LedgerError::csv(table, err))?;
        writer.flush().map_err(|err| LedgerError::io(&path, err))?;
        drop(writer);
        file.sync_all().map_err(|err| LedgerError::io(&path, err))?;
        debug!(table, "Row appended");
        Ok(())
    }

    fn clear(&self, table: &str) -> Result<(), LedgerError> {
        let path = self.table_path(table);
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_dir(&self.dir);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(LedgerError::io(&path, err)),
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(err) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %err, "Directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

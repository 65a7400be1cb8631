//! redb-based storage for print jobs and printer status
//!
//! The store is a write-through record of what the fleet already knows in
//! memory. Live health decisions never read from it.

use crate::types::{HealthState, PrintJob};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Print jobs table: key = job_id, value = JSON
const PRINT_JOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("print_jobs");

/// Index: (printer_id, job_id) -> ()
const PRINT_JOBS_BY_PRINTER_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("print_jobs_by_printer");

/// Printer status table: key = printer_id, value = JSON
const PRINTER_STATUS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("printer_status");

#[derive(Debug, Error)]
pub enum PrintStorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reported by stores backed by a remote service
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type PrintStorageResult<T> = Result<T, PrintStorageError>;

/// Persisted printer status row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterStatusRecord {
    pub printer_id: String,
    pub status: HealthState,
    /// Millisecond timestamp
    pub updated_at: i64,
    pub error: Option<String>,
}

/// Where printer health transitions are written
pub trait PrinterStatusStore: Send + Sync {
    fn save_status(&self, record: &PrinterStatusRecord) -> PrintStorageResult<()>;
}

/// Where print job records are written
pub trait PrintJobStore: Send + Sync {
    fn save_job(&self, job: &PrintJob) -> PrintStorageResult<()>;

    fn load_job(&self, id: &str) -> PrintStorageResult<Option<PrintJob>>;
}

/// Print job and printer status storage
#[derive(Clone)]
pub struct PrintStore {
    db: Arc<Database>,
}

impl PrintStore {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>) -> PrintStorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open in-memory database (tests, ephemeral runs)
    pub fn open_in_memory() -> PrintStorageResult<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> PrintStorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PRINT_JOBS_TABLE)?;
            let _ = write_txn.open_table(PRINT_JOBS_BY_PRINTER_TABLE)?;
            let _ = write_txn.open_table(PRINTER_STATUS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Print Jobs ==========

    /// Insert or overwrite a job record
    pub fn store_job(&self, job: &PrintJob) -> PrintStorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PRINT_JOBS_TABLE)?;
            let value = serde_json::to_vec(job)?;
            table.insert(job.id.as_str(), value.as_slice())?;

            let mut idx_table = txn.open_table(PRINT_JOBS_BY_PRINTER_TABLE)?;
            idx_table.insert((job.printer_id.as_str(), job.id.as_str()), ())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Get a job by ID
    pub fn get_job(&self, id: &str) -> PrintStorageResult<Option<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINT_JOBS_TABLE)?;

        match table.get(id)? {
            Some(guard) => {
                let job: PrintJob = serde_json::from_slice(guard.value())?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Get jobs sent to a printer, oldest first
    pub fn get_jobs_for_printer(&self, printer_id: &str) -> PrintStorageResult<Vec<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(PRINT_JOBS_BY_PRINTER_TABLE)?;
        let data_table = read_txn.open_table(PRINT_JOBS_TABLE)?;

        let mut jobs = Vec::new();
        let range_start: (&str, &str) = (printer_id, "");
        let range_end: (&str, &str) = (printer_id, "\u{ffff}");

        for result in idx_table.range(range_start..=range_end)? {
            let (key, _) = result?;
            let (_, job_id) = key.value();
            if let Some(guard) = data_table.get(job_id)? {
                let job: PrintJob = serde_json::from_slice(guard.value())?;
                jobs.push(job);
            }
        }

        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    /// Get all jobs, newest first (paginated)
    pub fn get_recent_jobs(&self, offset: usize, limit: usize) -> PrintStorageResult<Vec<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINT_JOBS_TABLE)?;

        let mut jobs: Vec<PrintJob> = Vec::new();
        for result in table.iter()? {
            let (_, guard) = result?;
            let job: PrintJob = serde_json::from_slice(guard.value())?;
            jobs.push(job);
        }

        jobs.sort_by_key(|j| std::cmp::Reverse(j.created_at));

        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    // ========== Printer Status ==========

    pub fn put_status(&self, record: &PrinterStatusRecord) -> PrintStorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PRINTER_STATUS_TABLE)?;
            let value = serde_json::to_vec(record)?;
            table.insert(record.printer_id.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_status(&self, printer_id: &str) -> PrintStorageResult<Option<PrinterStatusRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINTER_STATUS_TABLE)?;

        match table.get(printer_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    // ========== Cleanup ==========

    /// Remove terminal job records older than max_age_secs
    pub fn cleanup_old_jobs(&self, max_age_secs: i64) -> PrintStorageResult<usize> {
        let cutoff = chrono::Utc::now().timestamp_millis() - max_age_secs * 1000;

        let txn = self.db.begin_write()?;
        let mut deleted = 0;
        {
            let mut table = txn.open_table(PRINT_JOBS_TABLE)?;
            let mut idx_table = txn.open_table(PRINT_JOBS_BY_PRINTER_TABLE)?;

            let mut to_delete = Vec::new();
            for result in table.iter()? {
                let (key, guard) = result?;
                let job: PrintJob = serde_json::from_slice(guard.value())?;
                if job.is_terminal() && job.created_at < cutoff {
                    to_delete.push((key.value().to_string(), job.printer_id.clone()));
                }
            }

            for (id, printer_id) in &to_delete {
                table.remove(id.as_str())?;
                idx_table.remove((printer_id.as_str(), id.as_str()))?;
                deleted += 1;
            }
        }
        txn.commit()?;
        Ok(deleted)
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> PrintStorageResult<PrintStorageStats> {
        let read_txn = self.db.begin_read()?;
        let jobs_table = read_txn.open_table(PRINT_JOBS_TABLE)?;
        let status_table = read_txn.open_table(PRINTER_STATUS_TABLE)?;

        Ok(PrintStorageStats {
            job_count: jobs_table.len()?,
            printer_status_count: status_table.len()?,
        })
    }
}

impl PrinterStatusStore for PrintStore {
    fn save_status(&self, record: &PrinterStatusRecord) -> PrintStorageResult<()> {
        self.put_status(record)
    }
}

impl PrintJobStore for PrintStore {
    fn save_job(&self, job: &PrintJob) -> PrintStorageResult<()> {
        self.store_job(job)
    }

    fn load_job(&self, id: &str) -> PrintStorageResult<Option<PrintJob>> {
        self.get_job(id)
    }
}

#[derive(Debug, Clone)]
pub struct PrintStorageStats {
    pub job_count: u64,
    pub printer_status_count: u64,
}

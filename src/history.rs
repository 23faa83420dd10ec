use crate::errors::RunnerError;
use crate::run_log::RunRecord;
use log::info;
use rusqlite::{params, Connection};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub started_at: String,
    pub finished_at: String,
    pub log_path: String,
    pub exit_code: i32,
    pub exit_status: String,
    pub publish: String,
}

/// Ledger of finished runs, so a failed scrape can be told apart from a
/// clean scrape that produced no new data.
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self, RunnerError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, RunnerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, RunnerError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                log_path TEXT NOT NULL,
                exit_code INTEGER NOT NULL,
                exit_status TEXT NOT NULL,
                publish TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// `publish` is the publish outcome label, or `error` if publishing failed.
    pub fn record(&self, run: &RunRecord, publish: &str) -> Result<(), RunnerError> {
        self.conn.execute(
            "INSERT INTO runs (started_at, finished_at, log_path, exit_code, exit_status, publish)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.start_time().to_rfc3339(),
                run.end_time().to_rfc3339(),
                run.log_path().display().to_string(),
                run.exit_status().code(),
                run.exit_status().to_string(),
                publish,
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, RunnerError> {
        let mut stmt = self.conn.prepare(
            "SELECT started_at, finished_at, log_path, exit_code, exit_status, publish
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;
        let entry_iter = stmt.query_map([limit as i64], |row| {
            Ok(HistoryEntry {
                started_at: row.get(0)?,
                finished_at: row.get(1)?,
                log_path: row.get(2)?,
                exit_code: row.get(3)?,
                exit_status: row.get(4)?,
                publish: row.get(5)?,
            })
        })?;

        let mut entries = Vec::new();
        for entry in entry_iter {
            entries.push(entry?);
        }
        Ok(entries)
    }

    pub fn pretty_print(&self, limit: usize) -> Result<(), RunnerError> {
        let entries = self.recent(limit)?;
        if entries.is_empty() {
            info!("No runs recorded yet.");
            return Ok(());
        }
        for entry in entries {
            println!(
                "{}  status={:<24} publish={:<15} {}",
                entry.started_at, entry.exit_status, entry.publish, entry.log_path
            );
        }
        Ok(())
    }
}

use crate::core::db;
use crate::core::error::EffectsError;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// The DB Broker is the durability boundary for the world database.
/// Every document call goes through one serialized connection scope; every
/// write leaves one audit line behind.
pub struct DbBroker {
    db_path: PathBuf,
    audit_log_path: PathBuf,
    audit: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(store: &Store, audit: bool) -> Self {
        Self {
            db_path: store.db_path(),
            audit_log_path: store.root.join(schemas::BROKER_EVENTS_NAME),
            audit,
        }
    }

    /// Execute a closure with a serialized connection to the world DB.
    pub fn with_conn<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, EffectsError>
    where
        F: FnOnce(&Connection) -> Result<R, EffectsError>,
    {
        // Process-wide lock; SQLite WAL serializes across processes.
        static DB_LOCK: Mutex<()> = Mutex::new(());
        let _lock = DB_LOCK
            .lock()
            .map_err(|_| EffectsError::ValidationError("broker lock poisoned".to_string()))?;

        let conn = db::db_connect(&self.db_path.to_string_lossy())?;
        let result = f(&conn);

        if !is_read(op_name) {
            let status = if result.is_ok() { "success" } else { "error" };
            if let Err(err) = self.log_event(actor, op_name, status) {
                tracing::warn!(op = op_name, error = %err, "audit log write failed");
            }
        }

        result
    }

    /// Like [`DbBroker::with_conn`], but the closure runs inside one transaction:
    /// either every write lands or none does.
    pub fn with_tx<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, EffectsError>
    where
        F: FnOnce(&Connection) -> Result<R, EffectsError>,
    {
        self.with_conn(actor, op_name, |conn| {
            let tx = conn.unchecked_transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
    }

    fn log_event(&self, actor: &str, op: &str, status: &str) -> Result<(), EffectsError> {
        if !self.audit {
            return Ok(());
        }
        let db_id = self
            .db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            db_id,
            status: status.to_string(),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)
            .map_err(EffectsError::IoError)?;

        writeln!(f, "{}", serde_json::to_string(&ev)?).map_err(EffectsError::IoError)?;
        Ok(())
    }

    /// Read back the audit log, oldest first. A missing log reads as empty.
    pub fn read_events(&self) -> Result<Vec<BrokerEvent>, EffectsError> {
        if !self.audit_log_path.exists() {
            return Ok(Vec::new());
        }
        let f = std::fs::File::open(&self.audit_log_path).map_err(EffectsError::IoError)?;
        let mut out = Vec::new();
        for line in BufReader::new(f).lines() {
            let line = line.map_err(EffectsError::IoError)?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }
}

/// Lookups (`*.get`, `*.list`) change nothing and stay out of the audit log.
fn is_read(op: &str) -> bool {
    op.ends_with(".get") || op.ends_with(".list")
}

mod transfers;

use rusqlite::Connection;
use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

pub use transfers::TransferRecord;

use crate::{settings, AnonError, Result};

const DB_FILE_NAME: &str = "history.db";

/// 传输历史的 SQLite 存储。每次操作单独打开连接，不在调用之间持有句柄。
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        store.with_connection(|_| Ok(()))?;
        Ok(store)
    }

    /// 位于应用数据目录下的默认数据库。
    pub fn open_default() -> Result<Self> {
        Self::open(settings::data_dir()?.join(DB_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, record: &TransferRecord) -> Result<()> {
        self.with_connection(|conn| transfers::insert_transfer(conn, record))
    }

    /// 按时间倒序返回最多 `limit` 条记录。
    pub fn load(&self, limit: usize) -> Result<Vec<TransferRecord>> {
        self.with_connection(|conn| transfers::load_transfers(conn, limit))
    }

    pub fn clear(&self) -> Result<usize> {
        self.with_connection(transfers::clear_transfers)
    }

    fn with_connection<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = open_connection(&self.path)?;
        operation(&conn)
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| {
            AnonError::Storage(format!("failed to create database directory {dir:?}: {e}"))
        })?;
    }

    let conn = Connection::open(path)
        .map_err(|e| AnonError::Storage(format!("failed to open SQLite database: {e}")))?;
    apply_migrations(&conn)?;
    Ok(conn)
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(transfers::TRANSFER_TABLE_SCHEMA)
        .map_err(|e| AnonError::Storage(format!("failed to initialize database schema: {e}")))?;
    Ok(())
}

pub(crate) fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

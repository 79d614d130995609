use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::current_timestamp_millis;
use crate::{endpoint::Operation, AnonError, Result};

/// transfers 表：每次成功的上传/下载一行。
pub(crate) const TRANSFER_TABLE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transfers (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    identifier TEXT NOT NULL,
    file_name TEXT NOT NULL,
    local_path TEXT,
    size INTEGER,
    url TEXT,
    created_at_millis INTEGER NOT NULL
);";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub id: String,
    pub kind: Operation,
    pub identifier: String,
    pub file_name: String,
    pub local_path: Option<String>,
    pub size: Option<i64>,
    pub url: Option<String>,
    pub created_at_millis: i64,
}

impl TransferRecord {
    pub fn new(kind: Operation, identifier: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            identifier: identifier.into(),
            file_name: file_name.into(),
            local_path: None,
            size: None,
            url: None,
            created_at_millis: current_timestamp_millis(),
        }
    }
}

pub(crate) fn insert_transfer(conn: &Connection, record: &TransferRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO transfers (
            id,
            kind,
            identifier,
            file_name,
            local_path,
            size,
            url,
            created_at_millis
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            record.id,
            record.kind.as_str(),
            record.identifier,
            record.file_name,
            record.local_path,
            record.size,
            record.url,
            record.created_at_millis,
        ],
    )
    .map_err(|e| AnonError::Storage(format!("failed to insert transfer: {e}")))?;
    Ok(())
}

pub(crate) fn load_transfers(conn: &Connection, limit: usize) -> Result<Vec<TransferRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT
                id,
                kind,
                identifier,
                file_name,
                local_path,
                size,
                url,
                created_at_millis
            FROM transfers
            ORDER BY created_at_millis DESC
            LIMIT ?",
        )
        .map_err(|e| AnonError::Storage(format!("failed to prepare transfer query: {e}")))?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map(params![limit], map_transfer)
        .map_err(|e| AnonError::Storage(format!("failed to query transfers: {e}")))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| AnonError::Storage(format!("failed to parse transfer row: {e}")))?;
    Ok(rows)
}

pub(crate) fn clear_transfers(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM transfers", [])
        .map_err(|e| AnonError::Storage(format!("failed to clear transfer history: {e}")))
}

fn map_transfer(row: &Row) -> rusqlite::Result<TransferRecord> {
    let kind: String = row.get(1)?;
    Ok(TransferRecord {
        id: row.get(0)?,
        kind: parse_kind(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown transfer kind {kind:?}").into(),
            )
        })?,
        identifier: row.get(2)?,
        file_name: row.get(3)?,
        local_path: row.get(4)?,
        size: row.get(5)?,
        url: row.get(6)?,
        created_at_millis: row.get(7)?,
    })
}

fn parse_kind(raw: &str) -> Option<Operation> {
    match raw {
        "upload" => Some(Operation::Upload),
        "download" => Some(Operation::Download),
        "preview" => Some(Operation::Preview),
        _ => None,
    }
}

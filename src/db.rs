use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{HostCredential, LeaderboardEntry, NodeRecord, NodeUpsertPayload, RunSummary};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, String> {
        let conn = Connection::open(path)
            .map_err(|error| format!("Failed to open SQLite database: {error}"))?;
        let database = Self { conn };
        database.init_schema()?;
        Ok(database)
    }

    fn init_schema(&self) -> Result<(), String> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS proxmox_nodes (
                    id TEXT PRIMARY KEY,
                    host TEXT NOT NULL,
                    user TEXT NOT NULL,
                    password TEXT NOT NULL,
                    port INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS leaderboard (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    identity TEXT NOT NULL UNIQUE,
                    total_score INTEGER NOT NULL,
                    max_score INTEGER NOT NULL,
                    percentage REAL NOT NULL,
                    grade TEXT NOT NULL,
                    completed_at TEXT NOT NULL
                );
                "#,
            )
            .map_err(|error| format!("Failed to initialize schema: {error}"))
    }

    /// Registered hypervisor nodes in search order (oldest first).
    pub fn list_nodes(&self) -> Result<Vec<NodeRecord>, String> {
        let mut statement = self
            .conn
            .prepare(
                r#"
                SELECT id, host, user, password, port, created_at
                FROM proxmox_nodes
                ORDER BY created_at ASC, rowid ASC
                "#,
            )
            .map_err(|error| format!("Failed to prepare list_nodes query: {error}"))?;
        let mut rows = statement
            .query([])
            .map_err(|error| format!("Failed to query nodes: {error}"))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|error| format!("Failed to iterate nodes: {error}"))?
        {
            let parsed = Self::node_from_row(row)
                .map_err(|error| format!("Failed to parse node row: {error}"))?;
            nodes.push(parsed);
        }
        Ok(nodes)
    }

    pub fn node_credentials(&self) -> Result<Vec<HostCredential>, String> {
        Ok(self
            .list_nodes()?
            .iter()
            .map(NodeRecord::to_credential)
            .collect())
    }

    pub fn insert_node(
        &self,
        node_id: &str,
        payload: &NodeUpsertPayload,
        now: DateTime<Utc>,
    ) -> Result<NodeRecord, String> {
        self.conn
            .execute(
                r#"
                INSERT INTO proxmox_nodes (id, host, user, password, port, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    node_id,
                    payload.host.trim(),
                    payload.user.trim(),
                    payload.password,
                    i64::from(payload.port),
                    now.to_rfc3339(),
                ],
            )
            .map_err(|error| format!("Failed to insert node `{}`: {error}", payload.host))?;

        Ok(NodeRecord {
            id: node_id.to_string(),
            host: payload.host.trim().to_string(),
            user: payload.user.trim().to_string(),
            password: payload.password.clone(),
            port: payload.port,
            created_at: now,
        })
    }

    /// Returns false when no node had `node_id`.
    pub fn delete_node(&self, node_id: &str) -> Result<bool, String> {
        let removed = self
            .conn
            .execute("DELETE FROM proxmox_nodes WHERE id = ?1", params![node_id])
            .map_err(|error| format!("Failed to delete node `{node_id}`: {error}"))?;
        Ok(removed > 0)
    }

    /// Stores the first qualifying result per identity. Returns false when
    /// the identity already has an entry, which is left untouched.
    pub fn record_leaderboard_if_absent(
        &self,
        identity: &str,
        summary: &RunSummary,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, String> {
        let inserted = self
            .conn
            .execute(
                r#"
                INSERT OR IGNORE INTO leaderboard (identity, total_score, max_score, percentage, grade, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    identity.trim(),
                    i64::from(summary.total),
                    i64::from(summary.max),
                    summary.percentage,
                    summary.grade.as_str(),
                    completed_at.to_rfc3339(),
                ],
            )
            .map_err(|error| format!("Failed to record leaderboard entry for `{identity}`: {error}"))?;
        Ok(inserted > 0)
    }

    pub fn list_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, String> {
        let mut statement = self
            .conn
            .prepare(
                r#"
                SELECT identity, total_score, max_score, percentage, grade, completed_at
                FROM leaderboard
                ORDER BY completed_at ASC, id ASC
                "#,
            )
            .map_err(|error| format!("Failed to prepare leaderboard query: {error}"))?;
        let mut rows = statement
            .query([])
            .map_err(|error| format!("Failed to query leaderboard: {error}"))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|error| format!("Failed to iterate leaderboard: {error}"))?
        {
            let parsed = Self::entry_from_row(row, entries.len() + 1)
                .map_err(|error| format!("Failed to parse leaderboard row: {error}"))?;
            entries.push(parsed);
        }
        Ok(entries)
    }

    fn entry_from_row(row: &rusqlite::Row<'_>, rank: usize) -> Result<LeaderboardEntry, rusqlite::Error> {
        let completed_at: String = row.get(5)?;
        Ok(LeaderboardEntry {
            rank,
            identity: row.get(0)?,
            total_score: row.get(1)?,
            max_score: row.get(2)?,
            percentage: row.get(3)?,
            grade: row.get(4)?,
            completed_at: parse_rfc3339_to_utc(&completed_at).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error)),
                )
            })?,
        })
    }

    fn node_from_row(row: &rusqlite::Row<'_>) -> Result<NodeRecord, rusqlite::Error> {
        let created_at: String = row.get(5)?;
        Ok(NodeRecord {
            id: row.get(0)?,
            host: row.get(1)?,
            user: row.get(2)?,
            password: row.get(3)?,
            port: row.get::<_, i64>(4)? as u16,
            created_at: parse_rfc3339_to_utc(&created_at).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error)),
                )
            })?,
        })
    }
}

fn parse_rfc3339_to_utc(input: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(input)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| format!("Failed to parse timestamp `{input}`: {error}"))
}

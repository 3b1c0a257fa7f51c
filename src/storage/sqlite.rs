//! SQLite-backed memory store
//!
//! Single connection behind a mutex, WAL journal for local databases and a
//! DELETE journal for databases living in cloud-synced folders.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use super::migrations::run_migrations;
use super::MemoryStore;
use crate::error::{ChimeraError, Result};
use crate::types::{
    ConversationMemoryStats, MemoryId, MemoryPage, MemoryRecord, MemoryScope, Metadata,
    NewMemory, StorageMode, StoreConfig,
};

const SELECT_COLUMNS: &str =
    "SELECT id, text, tags, conversation_id, scope, metadata, created_at FROM memories";

/// Memory store wrapping a SQLite connection
pub struct SqliteStore {
    config: StoreConfig,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database with the given configuration
    pub fn open(config: StoreConfig) -> Result<Self> {
        let conn = Self::create_connection(&config)?;

        run_migrations(&conn)?;

        Ok(Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an ephemeral in-memory store (tests, benchmarks)
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::default())
    }

    fn create_connection(config: &StoreConfig) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(&config.db_path, flags)?
        };

        Self::configure_pragmas(&conn, config.storage_mode)?;

        Ok(conn)
    }

    fn configure_pragmas(conn: &Connection, mode: StorageMode) -> Result<()> {
        match mode {
            StorageMode::Local => {
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=30000;
                    PRAGMA temp_store=MEMORY;
                    "#,
                )?;
            }
            StorageMode::CloudSafe => {
                // Single-file mode for Dropbox/iCloud/OneDrive folders
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode=DELETE;
                    PRAGMA synchronous=FULL;
                    PRAGMA busy_timeout=30000;
                    PRAGMA temp_store=MEMORY;
                    "#,
                )?;
            }
        }
        Ok(())
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function with a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Get database path
    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.config.storage_mode
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed-width UTC so lexical order equals chronological order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn record_from_row(row: &Row) -> rusqlite::Result<MemoryRecord> {
    let tags_str: String = row.get("tags")?;
    let scope_str: String = row.get("scope")?;
    let metadata_str: String = row.get("metadata")?;
    let created_at_str: String = row.get("created_at")?;

    let tags: Vec<String> = serde_json::from_str(&tags_str).map_err(|e| conversion_error(2, e))?;
    let scope: MemoryScope = scope_str.parse().map_err(|e| conversion_error(4, e))?;
    let metadata: Metadata =
        serde_json::from_str(&metadata_str).map_err(|e| conversion_error(5, e))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| conversion_error(6, e))?
        .with_timezone(&Utc);

    Ok(MemoryRecord {
        id: row.get("id")?,
        text: row.get("text")?,
        tags,
        conversation_id: row.get("conversation_id")?,
        scope,
        metadata,
        created_at,
    })
}

fn query_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<MemoryRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let records = stmt
        .query_map(params, record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

impl MemoryStore for SqliteStore {
    fn list_all(&self) -> Result<Vec<MemoryRecord>> {
        self.with_connection(|conn| {
            query_records(
                conn,
                &format!("{} ORDER BY created_at DESC, id DESC", SELECT_COLUMNS),
                [],
            )
        })
    }

    fn list_by_conversation_or_global(&self, conversation_id: &str) -> Result<Vec<MemoryRecord>> {
        self.with_connection(|conn| {
            query_records(
                conn,
                &format!(
                    "{} WHERE conversation_id = ?1 OR scope = 'team-global'
                     ORDER BY created_at DESC, id DESC",
                    SELECT_COLUMNS
                ),
                params![conversation_id],
            )
        })
    }

    fn create(&self, input: NewMemory) -> Result<MemoryRecord> {
        let input = input.validate()?;
        // Stored at microsecond precision; hand back exactly what a re-read yields
        let created_at = input.created_at.unwrap_or_else(Utc::now).trunc_subsecs(6);
        let created_str = format_timestamp(&created_at);
        let now_str = format_timestamp(&Utc::now());
        let tags_json = serde_json::to_string(&input.tags)?;
        let metadata_json = serde_json::to_string(&input.metadata)?;

        self.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO memories (text, tags, conversation_id, scope, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    input.text,
                    tags_json,
                    input.conversation_id,
                    input.scope.as_str(),
                    metadata_json,
                    created_str,
                    now_str,
                ],
            )?;
            let id = conn.last_insert_rowid();

            Ok(MemoryRecord {
                id,
                text: input.text,
                tags: input.tags,
                conversation_id: input.conversation_id,
                scope: input.scope,
                metadata: input.metadata,
                created_at,
            })
        })
    }

    fn delete(&self, id: MemoryId) -> Result<()> {
        let deleted =
            self.with_connection(|conn| Ok(conn.execute("DELETE FROM memories WHERE id = ?1", [id])?))?;
        if deleted == 0 {
            return Err(ChimeraError::NotFound(id));
        }
        Ok(())
    }

    fn delete_by_conversation(&self, conversation_id: &str) -> Result<usize> {
        self.with_connection(|conn| {
            Ok(conn.execute(
                "DELETE FROM memories WHERE conversation_id = ?1",
                [conversation_id],
            )?)
        })
    }

    fn get(&self, id: MemoryId) -> Result<MemoryRecord> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                [id],
                record_from_row,
            )
            .optional()?
            .ok_or(ChimeraError::NotFound(id))
        })
    }

    fn count(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn list_by_conversation(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage> {
        self.with_connection(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?;
            let memories = query_records(
                conn,
                &format!(
                    "{} WHERE conversation_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2 OFFSET ?3",
                    SELECT_COLUMNS
                ),
                params![conversation_id, limit as i64, offset as i64],
            )?;

            Ok(MemoryPage {
                memories,
                total: total as usize,
                limit,
                offset,
            })
        })
    }

    fn conversation_stats(&self, conversation_id: &str) -> Result<ConversationMemoryStats> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT scope, COUNT(*) FROM memories WHERE conversation_id = ?1 GROUP BY scope",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stats = ConversationMemoryStats {
                conversation_id: conversation_id.to_string(),
                ..Default::default()
            };
            for (scope, count) in rows {
                let count = count as usize;
                match scope.as_str() {
                    "team-global" => stats.team_global += count,
                    _ => stats.conversation_scoped += count,
                }
                stats.total += count;
            }
            Ok(stats)
        })
    }
}

//! SQLite storage for source records and game snapshots.
//!
//! A snapshot is the full list of a player's games at one analysis depth,
//! keyed by `(player, analysis)` where `analysis` is `"none"` for parsed but
//! unannotated games or the think time, e.g. `"250ms"`. Snapshots saved from
//! an interrupted run are marked incomplete.

use crate::source::GameRecord;
use chess_core::AnnotatedGame;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Analysis key of parsed, unannotated snapshots.
pub const NO_ANALYSIS: &str = "none";

/// Errors that can occur when reading or writing storage.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode or decode stored data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Snapshot key for a think time; `None` means unannotated.
pub fn analysis_key(think_time: Option<Duration>) -> String {
    match think_time {
        Some(time) => format!("{}ms", time.as_millis()),
        None => NO_ANALYSIS.to_string(),
    }
}

/// Games stored under one key.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub games: Vec<AnnotatedGame>,
    pub complete: bool,
}

/// SQLite-backed storage.
///
/// # Example
///
/// ```ignore
/// let storage = Storage::open("data/review.db")?;
/// storage.save_games("alice", "none", &games, true)?;
/// let snapshot = storage.load_games("alice", "none")?;
/// ```
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Opens or creates a SQLite database at the given path.
    ///
    /// The schema is created on first open.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let storage = Self { conn };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS source_records (
                player TEXT NOT NULL,
                game_id TEXT NOT NULL,
                record TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (player, game_id)
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                player TEXT NOT NULL,
                analysis TEXT NOT NULL,
                position INTEGER NOT NULL,
                game_id TEXT NOT NULL,
                game TEXT NOT NULL,
                PRIMARY KEY (player, analysis, position)
            );

            CREATE TABLE IF NOT EXISTS snapshot_status (
                player TEXT NOT NULL,
                analysis TEXT NOT NULL,
                complete INTEGER NOT NULL,
                saved_at TEXT NOT NULL,
                PRIMARY KEY (player, analysis)
            );
            ",
        )?;
        Ok(())
    }

    /// Caches raw records for a player, replacing records with the same id.
    pub fn save_records(&self, player: &str, records: &[GameRecord]) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let fetched_at = Utc::now().to_rfc3339();
        for record in records {
            tx.execute(
                "INSERT OR REPLACE INTO source_records (player, game_id, record, fetched_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (player, &record.id, serde_json::to_string(record)?, &fetched_at),
            )?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Cached records for a player, in insertion order.
    pub fn load_records(&self, player: &str) -> Result<Vec<GameRecord>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM source_records WHERE player = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map([player], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    /// Replaces the snapshot stored under `(player, analysis)`.
    pub fn save_games(
        &self,
        player: &str,
        analysis: &str,
        games: &[AnnotatedGame],
        complete: bool,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM snapshots WHERE player = ?1 AND analysis = ?2",
            (player, analysis),
        )?;
        for (position, game) in games.iter().enumerate() {
            tx.execute(
                "INSERT INTO snapshots (player, analysis, position, game_id, game)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    player,
                    analysis,
                    position as i64,
                    game.id(),
                    serde_json::to_string(game)?,
                ),
            )?;
        }
        tx.execute(
            "INSERT INTO snapshot_status (player, analysis, complete, saved_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(player, analysis) DO UPDATE SET
                complete = ?3,
                saved_at = ?4",
            (player, analysis, complete, Utc::now().to_rfc3339()),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// The snapshot stored under `(player, analysis)`, if one was saved.
    pub fn load_games(&self, player: &str, analysis: &str) -> Result<Option<Snapshot>, StorageError> {
        let Some(complete) = self.snapshot_complete(player, analysis)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT game FROM snapshots WHERE player = ?1 AND analysis = ?2 ORDER BY position",
        )?;
        let rows = stmt.query_map((player, analysis), |row| row.get::<_, String>(0))?;

        let mut games = Vec::new();
        for row in rows {
            games.push(serde_json::from_str(&row?)?);
        }
        Ok(Some(Snapshot { games, complete }))
    }

    /// True if a complete snapshot exists under `(player, analysis)`.
    pub fn has_complete_snapshot(&self, player: &str, analysis: &str) -> Result<bool, StorageError> {
        Ok(self.snapshot_complete(player, analysis)?.unwrap_or(false))
    }

    fn snapshot_complete(&self, player: &str, analysis: &str) -> Result<Option<bool>, StorageError> {
        let complete = self
            .conn
            .query_row(
                "SELECT complete FROM snapshot_status WHERE player = ?1 AND analysis = ?2",
                (player, analysis),
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(complete)
    }
}

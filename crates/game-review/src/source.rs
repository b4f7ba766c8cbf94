//! Raw game records and where they come from.
//!
//! Records follow the lichess game export schema (one JSON object per game).

use chess_core::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Prefix of lichess game URLs.
pub const LICHESS_SITE: &str = "https://lichess.org/";

/// Errors that can occur while reading game records.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Failed to list source files: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// One side of a game record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSide {
    /// Absent for anonymous players and engines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_diff: Option<i32>,
    /// Present when the side was played by the built-in AI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_level: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    pub white: PlayerSide,
    pub black: PlayerSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clock {
    pub initial: u32,
    pub increment: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningInfo {
    pub eco: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ply: Option<u32>,
}

/// Server-side evaluation after one ply, White's point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mate: Option<i32>,
}

/// A game as exported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub id: String,
    #[serde(default)]
    pub rated: bool,
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perf: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(default)]
    pub players: Players,
    /// Space-separated SAN moves.
    #[serde(default)]
    pub moves: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_fen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<Clock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening: Option<OpeningInfo>,
    /// Entry `i` evaluates the position after ply `i + 1`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analysis: Vec<AnalysisEntry>,
}

fn default_variant() -> String {
    "standard".to_string()
}

impl GameRecord {
    pub fn side(&self, color: Color) -> &PlayerSide {
        match color {
            Color::White => &self.players.white,
            Color::Black => &self.players.black,
        }
    }

    /// User id of the side, if it was a registered player.
    pub fn player_id(&self, color: Color) -> Option<&str> {
        self.side(color).user.as_ref().map(|u| u.id.as_str())
    }

    /// True if `player` (id or display name) played this game.
    pub fn involves(&self, player: &str) -> bool {
        [Color::White, Color::Black].into_iter().any(|color| {
            self.side(color).user.as_ref().is_some_and(|u| {
                u.id.eq_ignore_ascii_case(player) || u.name.eq_ignore_ascii_case(player)
            })
        })
    }
}

/// Supplier of a player's game records.
pub trait GameSource {
    fn fetch(&mut self, player: &str) -> Result<Vec<GameRecord>, SourceError>;
}

/// Reads records from NDJSON export files matching a glob pattern.
///
/// Malformed lines are logged and skipped. A game id seen twice is kept once.
pub struct NdjsonSource {
    pattern: String,
}

impl NdjsonSource {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl GameSource for NdjsonSource {
    fn fetch(&mut self, player: &str) -> Result<Vec<GameRecord>, SourceError> {
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for entry in glob::glob(&self.pattern)? {
            let path = entry?;
            let content = std::fs::read_to_string(&path).map_err(|source| SourceError::Read {
                path: path.clone(),
                source,
            })?;

            for (index, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<GameRecord>(line) {
                    Ok(record) if !record.involves(player) => {}
                    Ok(record) => {
                        if seen.insert(record.id.clone()) {
                            records.push(record);
                        }
                    }
                    Err(e) => warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping malformed record"
                    ),
                }
            }
            debug!(path = %path.display(), total = records.len(), "Read source file");
        }

        Ok(records)
    }
}

/// Game id from a lichess URL; other strings pass through unchanged.
pub fn site_to_id(site: &str) -> &str {
    site.strip_prefix(LICHESS_SITE).unwrap_or(site)
}

pub fn id_to_site(id: &str) -> String {
    format!("{}{}", LICHESS_SITE, id)
}

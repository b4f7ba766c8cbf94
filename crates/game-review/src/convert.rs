//! Turns source records into annotated games.

use crate::filter::GameFilter;
use crate::source::{id_to_site, GameRecord};
use chess_core::{
    format_eval, AnnotatedGame, ClockSetting, Color, GameHeaders, MoveTree, NodeId, Opening,
    PlayedMove, Score,
};
use chrono::DateTime;
use shakmaty::{fen::Fen, san::San, CastlingMode, Chess, Position};
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

/// Errors that can occur while converting a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("Illegal or unreadable move '{san}' at ply {ply}")]
    IllegalMove { ply: usize, san: String },
    #[error("Invalid start position: {0}")]
    InvalidFen(String),
}

/// A converted game and, when the record carried server analysis, a copy of
/// it annotated with that analysis.
#[derive(Debug, Clone)]
pub struct ConvertedGame {
    pub game: AnnotatedGame,
    pub trace: Option<AnnotatedGame>,
}

/// Replays the record's SAN moves and builds the game.
pub fn convert_game(record: &GameRecord) -> Result<AnnotatedGame, ConvertError> {
    let (mut pos, mut tree) = match &record.initial_fen {
        Some(fen) => {
            let invalid = || ConvertError::InvalidFen(fen.clone());
            let parsed: Fen = fen.parse().map_err(|_| invalid())?;
            let pos: Chess = parsed
                .into_position(CastlingMode::Standard)
                .map_err(|_| invalid())?;
            let tree = MoveTree::from_fen(fen).map_err(|_| invalid())?;
            (pos, tree)
        }
        None => (Chess::default(), MoveTree::new()),
    };

    for (index, token) in record.moves.split_whitespace().enumerate() {
        let illegal = || ConvertError::IllegalMove {
            ply: index + 1,
            san: token.to_string(),
        };
        let san: San = token.parse().map_err(|_| illegal())?;
        let mv = san.to_move(&pos).map_err(|_| illegal())?;
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        tree.push_mainline(PlayedMove::new(uci).with_san(token));
        pos.play_unchecked(mv);
    }

    Ok(AnnotatedGame::new(headers(record), tree))
}

fn headers(record: &GameRecord) -> GameHeaders {
    let mut extra = BTreeMap::new();
    if let Some(total) = record.clock.and_then(|c| c.total_time) {
        extra.insert("ClockTotal".to_string(), total.to_string());
    }
    if let Some(fen) = &record.initial_fen {
        extra.insert("FEN".to_string(), fen.clone());
        extra.insert("SetUp".to_string(), "1".to_string());
    }

    GameHeaders {
        id: record.id.clone(),
        white: record.player_id(Color::White).map(str::to_string),
        black: record.player_id(Color::Black).map(str::to_string),
        white_rating: record.players.white.rating,
        black_rating: record.players.black.rating,
        rated: record.rated,
        variant: record.variant.clone(),
        result: result_tag(record).to_string(),
        status: record.status.clone(),
        speed: record.speed.clone(),
        perf: record.perf.clone(),
        date: record
            .created_at
            .and_then(DateTime::from_timestamp_millis)
            .map(|at| at.format("%Y.%m.%d").to_string()),
        site: Some(id_to_site(&record.id)),
        clock: record.clock.map(|c| ClockSetting {
            initial_secs: c.initial,
            increment_secs: c.increment,
        }),
        opening: record.opening.as_ref().map(|o| Opening {
            eco: o.eco.clone(),
            name: o.name.clone(),
        }),
        extra,
    }
}

fn result_tag(record: &GameRecord) -> &'static str {
    match (record.winner.as_deref(), record.status.as_deref()) {
        (Some("white"), _) => "1-0",
        (Some("black"), _) => "0-1",
        (None, Some("draw" | "stalemate" | "outoftime" | "timeout")) => "1/2-1/2",
        _ => "*",
    }
}

/// Copy of `game` whose comments carry the record's server analysis, or
/// `None` when the record has none.
pub fn external_trace(record: &GameRecord, game: &AnnotatedGame) -> Option<AnnotatedGame> {
    if record.analysis.is_empty() {
        return None;
    }
    let mut trace = game.clone();
    let tree = trace.tree_mut();
    let ids: Vec<NodeId> = tree.mainline().skip(1).collect();

    for (id, entry) in ids.into_iter().zip(&record.analysis) {
        if let Some(token) = Score::from_uci(entry.eval, entry.mate).and_then(format_eval) {
            tree.set_comment(id, token);
        }
    }
    Some(trace)
}

/// Filters and converts a batch of records. Rejected and unconvertible
/// records are logged and dropped.
pub fn convert_games(records: &[GameRecord], filter: &GameFilter) -> Vec<ConvertedGame> {
    let start = Instant::now();
    let mut converted = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        if let Some(reason) = filter.rejection(record) {
            info!(game = %record.id, %reason, "Skipping game");
        } else {
            match convert_game(record) {
                Ok(game) => {
                    let trace = external_trace(record, &game);
                    converted.push(ConvertedGame { game, trace });
                }
                Err(e) => error!(game = %record.id, error = %e, "Failed to convert game"),
            }
        }

        if i % 10 == 0 && i != 0 {
            let expected = start.elapsed().as_secs_f64() * records.len() as f64 / (i + 1) as f64;
            info!(
                done = i,
                total = records.len(),
                expected_minutes = expected / 60.0,
                "Converting games"
            );
        }
    }

    converted
}

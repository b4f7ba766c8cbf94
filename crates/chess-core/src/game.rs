//! A move tree together with its header metadata.

use crate::{Color, MoveTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Time control of a game, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSetting {
    pub initial_secs: u32,
    pub increment_secs: u32,
}

/// Opening classification supplied by the game source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    pub eco: String,
    pub name: String,
}

/// Header metadata of a game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameHeaders {
    /// Identifier shared with the game source.
    pub id: String,
    /// Player identity for White; `None` for anonymous players.
    pub white: Option<String>,
    pub black: Option<String>,
    pub white_rating: Option<u32>,
    pub black_rating: Option<u32>,
    pub rated: bool,
    pub variant: String,
    /// PGN result string: `1-0`, `0-1`, `1/2-1/2` or `*`.
    pub result: String,
    pub status: Option<String>,
    pub speed: Option<String>,
    pub perf: Option<String>,
    /// PGN date, `YYYY.MM.DD`.
    pub date: Option<String>,
    pub site: Option<String>,
    pub clock: Option<ClockSetting>,
    pub opening: Option<Opening>,
    /// Any further tags, kept sorted.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// A game ready for annotation and analysis.
///
/// Headers are fixed at construction; only the tree is mutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedGame {
    headers: GameHeaders,
    tree: MoveTree,
}

impl AnnotatedGame {
    pub fn new(headers: GameHeaders, tree: MoveTree) -> Self {
        Self { headers, tree }
    }

    pub fn headers(&self) -> &GameHeaders {
        &self.headers
    }

    pub fn id(&self) -> &str {
        &self.headers.id
    }

    pub fn tree(&self) -> &MoveTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut MoveTree {
        &mut self.tree
    }

    /// Identity of the player who had `color`.
    pub fn player(&self, color: Color) -> Option<&str> {
        match color {
            Color::White => self.headers.white.as_deref(),
            Color::Black => self.headers.black.as_deref(),
        }
    }

    /// Colour played by `player`, compared case-insensitively.
    pub fn color_of(&self, player: &str) -> Option<Color> {
        [Color::White, Color::Black]
            .into_iter()
            .find(|&color| {
                self.player(color)
                    .is_some_and(|name| name.eq_ignore_ascii_case(player))
            })
    }
}

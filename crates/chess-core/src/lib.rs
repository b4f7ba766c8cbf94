//! Core types for game review.
//!
//! This crate provides the data model shared by analysis and tooling:
//! - [`Color`] for the two sides
//! - [`Score`] for engine evaluations, with point-of-view conversion
//! - the `[%eval ...]` comment token codec
//! - [`MoveTree`], an arena of positions with variations
//! - [`AnnotatedGame`], a tree plus its headers

mod color;
pub mod eval_token;
mod game;
mod score;
mod tree;

pub use color::{Color, ParseColorError};
pub use eval_token::{format_eval, has_eval, parse_eval};
pub use game::{AnnotatedGame, ClockSetting, GameHeaders, Opening};
pub use score::{Score, ROUNDING_TOLERANCE_CP};
pub use tree::{BoardState, Mainline, MoveNode, MoveTree, NodeId, PlayedMove, TreeError};

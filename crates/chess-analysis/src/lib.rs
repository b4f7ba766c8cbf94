//! Engine annotation and blunder detection for annotated games.
//!
//! # Overview
//!
//! - [`AnalysisPort`] - Source of position evaluations
//! - [`AnalysisEngine`] - UCI engine process (e.g. Stockfish) behind the port
//! - [`annotate`] - Writes engine evaluations into a game's comments
//! - [`merge`] - Folds one tree's annotations into another tree of the same game
//! - [`first_bad_move`] and [`losses`] - Evaluation drops of one side
//!
//! # Example
//!
//! ```ignore
//! use chess_analysis::{annotate, first_bad_move, AnalysisEngine, AnnotateOptions, Band};
//!
//! let mut engine = AnalysisEngine::new("stockfish")?;
//! annotate(&mut game, &mut engine, &AnnotateOptions::default())?;
//! let verdict = first_bad_move(game.tree(), Color::White, Band::new(-50.0, 100.0));
//! ```

pub mod annotate;
pub mod blunder;
pub mod engine;
pub mod merge;

pub use annotate::{
    annotate, annotate_with_progress, AnnotateError, AnnotateOptions, AnnotationSummary,
    DEFAULT_THINK_TIME,
};
pub use blunder::{
    first_bad_move, first_bad_move_for, losses, losses_for, Band, BlunderError, FirstBadMove,
    Losses, MoveLoss,
};
pub use engine::{AnalysisEngine, AnalysisPort, EngineError};
pub use merge::merge;

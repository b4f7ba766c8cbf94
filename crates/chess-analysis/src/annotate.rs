//! Attaches engine evaluations to the main line of a game.

use crate::engine::{AnalysisPort, EngineError};
use chess_core::{AnnotatedGame, Score};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default think time per position.
pub const DEFAULT_THINK_TIME: Duration = Duration::from_millis(250);

/// Errors that stop an annotation run.
///
/// Every variant carries the ply of the node being processed; nodes before it
/// keep their new annotations, so a rerun without `force` resumes there.
#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Engine failed at ply {ply}: {source}")]
    Engine {
        ply: usize,
        #[source]
        source: EngineError,
    },
    #[error("Stored evaluation {stored} at ply {ply} disagrees with computed {computed}")]
    Inconsistent {
        ply: usize,
        stored: Score,
        computed: Score,
    },
    #[error("Engine returned no score at ply {ply}")]
    NoScore { ply: usize },
}

impl AnnotateError {
    pub fn ply(&self) -> usize {
        match self {
            AnnotateError::Engine { ply, .. }
            | AnnotateError::Inconsistent { ply, .. }
            | AnnotateError::NoScore { ply } => *ply,
        }
    }
}

/// Settings for one annotation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotateOptions {
    /// Time budget handed to the engine per position.
    pub think_time: Duration,
    /// Re-evaluate nodes that already carry an evaluation.
    pub force: bool,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            think_time: DEFAULT_THINK_TIME,
            force: false,
        }
    }
}

/// Counts from one annotation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    /// Non-terminal main-line nodes walked.
    pub visited: usize,
    /// Nodes sent to the engine.
    pub evaluated: usize,
    /// Nodes left alone because they were already annotated.
    pub skipped: usize,
}

/// Annotates every non-terminal main-line node of `game`.
pub fn annotate<P>(
    game: &mut AnnotatedGame,
    engine: &mut P,
    options: &AnnotateOptions,
) -> Result<AnnotationSummary, AnnotateError>
where
    P: AnalysisPort + ?Sized,
{
    annotate_with_progress(game, engine, options, |_| {})
}

/// Like [`annotate`], calling `on_node` with the running count of visited
/// nodes after each node.
pub fn annotate_with_progress<P, F>(
    game: &mut AnnotatedGame,
    engine: &mut P,
    options: &AnnotateOptions,
    mut on_node: F,
) -> Result<AnnotationSummary, AnnotateError>
where
    P: AnalysisPort + ?Sized,
    F: FnMut(usize),
{
    let game_id = game.id().to_string();
    let tree = game.tree_mut();
    let mut summary = AnnotationSummary::default();
    let mut engine_started = false;

    let mut cursor = Some(tree.root());
    while let Some(id) = cursor {
        if tree.is_terminal(id) {
            break;
        }
        let ply = tree.node(id).ply();
        let stored = tree.node(id).evaluation();

        if stored.is_some() && !options.force {
            summary.skipped += 1;
        } else {
            if !engine_started {
                engine
                    .new_game()
                    .map_err(|source| AnnotateError::Engine { ply, source })?;
                engine_started = true;
            }

            let board = tree.board(id);
            let computed = engine
                .evaluate(&board, options.think_time)
                .map_err(|source| AnnotateError::Engine { ply, source })?;
            if !computed.is_known() {
                return Err(AnnotateError::NoScore { ply });
            }
            if let Some(stored) = stored {
                if !stored.agrees_with(&computed) {
                    return Err(AnnotateError::Inconsistent {
                        ply,
                        stored,
                        computed,
                    });
                }
            }

            tree.append_evaluation(id, computed);
            summary.evaluated += 1;
            debug!(game = %game_id, ply, score = %computed, "Annotated position");
        }

        summary.visited += 1;
        on_node(summary.visited);
        cursor = tree.main_continuation(id);
    }

    Ok(summary)
}

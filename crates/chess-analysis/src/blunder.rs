//! Blunder detection along the main line of an annotated game.
//!
//! Both analyses walk the main line from the root, starting from a neutral
//! `Centipawn(0)` baseline. Opponent moves only refresh the baseline; each move
//! of the tracked side is scored against the baseline left by the opponent's
//! previous move. A missing evaluation on any visited node halts the walk.

use chess_core::{AnnotatedGame, Color, MoveTree, NodeId, Score};
use thiserror::Error;

/// Errors from the player-keyed helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlunderError {
    #[error("Player {player} did not play game {game}")]
    PlayerNotInGame { player: String, game: String },
}

/// Neutral evaluation band, in centipawns from the tracked side's view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub min_acceptable: f64,
    pub max_acceptable: f64,
}

impl Band {
    pub fn new(min_acceptable: f64, max_acceptable: f64) -> Self {
        Self {
            min_acceptable,
            max_acceptable,
        }
    }
}

impl Default for Band {
    fn default() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }
}

/// Outcome of [`first_bad_move`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FirstBadMove {
    /// The tracked side's move at `ply` qualified; `loss` may be infinite.
    Found { ply: usize, loss: f64 },
    /// The main line ended at `final_ply` without a qualifying move.
    NotFound { final_ply: usize },
    /// No evaluation was recorded at `ply`.
    InsufficientData { ply: usize },
}

impl FirstBadMove {
    pub fn ply(&self) -> usize {
        match *self {
            FirstBadMove::Found { ply, .. }
            | FirstBadMove::NotFound { final_ply: ply }
            | FirstBadMove::InsufficientData { ply } => ply,
        }
    }

    /// Loss at the reported ply: `0.0` when nothing was found, absent when
    /// data ran out.
    pub fn loss(&self) -> Option<f64> {
        match *self {
            FirstBadMove::Found { loss, .. } => Some(loss),
            FirstBadMove::NotFound { .. } => Some(0.0),
            FirstBadMove::InsufficientData { .. } => None,
        }
    }
}

/// Evaluation lost by one move of the tracked side. Negative values are gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveLoss {
    pub ply: usize,
    pub loss: f64,
}

enum Step {
    Tracked { ply: usize, before: Score, after: Score },
    Missing { ply: usize },
}

#[derive(Clone)]
struct Walk<'a> {
    tree: &'a MoveTree,
    tracked: Color,
    cursor: NodeId,
    baseline: Score,
    finished: bool,
}

impl<'a> Walk<'a> {
    fn new(tree: &'a MoveTree, tracked: Color) -> Self {
        Self {
            tree,
            tracked,
            cursor: tree.root(),
            baseline: Score::Centipawn(0),
            finished: false,
        }
    }

    fn ply(&self) -> usize {
        self.tree.node(self.cursor).ply()
    }
}

impl Iterator for Walk<'_> {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        while !self.finished {
            let Some(next) = self.tree.main_continuation(self.cursor) else {
                self.finished = true;
                break;
            };
            self.cursor = next;
            let node = self.tree.node(next);
            let ply = node.ply();

            let Some(evaluation) = node.evaluation().filter(Score::is_known) else {
                self.finished = true;
                return Some(Step::Missing { ply });
            };
            let score = evaluation.pov(Color::White, self.tracked);

            if self.tree.mover(ply) != self.tracked {
                self.baseline = score;
                continue;
            }
            return Some(Step::Tracked {
                ply,
                before: self.baseline,
                after: score,
            });
        }
        None
    }
}

/// Finds the first move of `tracked` that either threw away an advantage
/// (from above `max_acceptable` into the band) or landed at or below
/// `min_acceptable`. Missing or walking into a forced mate always qualifies.
pub fn first_bad_move(tree: &MoveTree, tracked: Color, band: Band) -> FirstBadMove {
    let mut walk = Walk::new(tree, tracked);

    for step in walk.by_ref() {
        let (ply, before, after) = match step {
            Step::Missing { ply } => return FirstBadMove::InsufficientData { ply },
            Step::Tracked { ply, before, after } => (ply, before, after),
        };
        if before.is_mate() && after.is_mate() {
            continue;
        }
        let loss = before.difference(after).unwrap_or(0.0);
        if loss == f64::INFINITY {
            return FirstBadMove::Found { ply, loss };
        }

        let (Some(now), Some(was)) = (after.value(), before.value()) else {
            continue;
        };
        if band.min_acceptable < now && now < band.max_acceptable {
            if was > band.max_acceptable {
                return FirstBadMove::Found { ply, loss };
            }
        } else if now <= band.min_acceptable {
            return FirstBadMove::Found { ply, loss };
        }
    }

    FirstBadMove::NotFound {
        final_ply: walk.ply(),
    }
}

/// Loss of every move of `tracked` along the main line.
pub fn losses(tree: &MoveTree, tracked: Color) -> Losses<'_> {
    Losses {
        walk: Walk::new(tree, tracked),
        halted_at: None,
    }
}

/// Lazy sequence returned by [`losses`]. Call [`losses`] again to restart.
#[derive(Clone)]
pub struct Losses<'a> {
    walk: Walk<'a>,
    halted_at: Option<usize>,
}

impl Losses<'_> {
    /// Ply whose missing evaluation ended the sequence, once reached.
    pub fn insufficient_data(&self) -> Option<usize> {
        self.halted_at
    }
}

impl Iterator for Losses<'_> {
    type Item = MoveLoss;

    fn next(&mut self) -> Option<MoveLoss> {
        match self.walk.next()? {
            Step::Tracked { ply, before, after } => Some(MoveLoss {
                ply,
                loss: before.difference(after).unwrap_or(0.0),
            }),
            Step::Missing { ply } => {
                self.halted_at = Some(ply);
                None
            }
        }
    }
}

fn tracked_color(game: &AnnotatedGame, player: &str) -> Result<Color, BlunderError> {
    game.color_of(player)
        .ok_or_else(|| BlunderError::PlayerNotInGame {
            player: player.to_string(),
            game: game.id().to_string(),
        })
}

/// [`first_bad_move`] for the colour `player` had in `game`.
pub fn first_bad_move_for(
    game: &AnnotatedGame,
    player: &str,
    band: Band,
) -> Result<FirstBadMove, BlunderError> {
    let color = tracked_color(game, player)?;
    Ok(first_bad_move(game.tree(), color, band))
}

/// [`losses`] for the colour `player` had in `game`.
pub fn losses_for<'a>(game: &'a AnnotatedGame, player: &str) -> Result<Losses<'a>, BlunderError> {
    let color = tracked_color(game, player)?;
    Ok(losses(game.tree(), color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::{GameHeaders, PlayedMove};

    const MOVES: [&str; 8] = [
        "e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6", "b5a4", "g8f6",
    ];

    /// Main line whose node at ply i+1 carries `evals[i]` (White POV).
    fn tree(evals: &[Option<Score>]) -> MoveTree {
        let mut tree = MoveTree::new();
        for (uci, eval) in MOVES.iter().zip(evals) {
            let id = tree.push_mainline(PlayedMove::new(*uci));
            if let Some(score) = eval {
                tree.append_evaluation(id, *score);
            }
        }
        tree
    }

    fn cp(values: &[i32]) -> Vec<Option<Score>> {
        values.iter().map(|&v| Some(Score::Centipawn(v))).collect()
    }

    #[test]
    fn lost_advantage_into_band() {
        let tree = tree(&cp(&[120, 130, -10]));
        let result = first_bad_move(&tree, Color::White, Band::new(-50.0, 100.0));
        assert_eq!(result, FirstBadMove::Found { ply: 3, loss: 140.0 });
        assert_eq!(result.loss(), Some(140.0));
    }

    #[test]
    fn band_entry_without_prior_advantage_is_fine() {
        let tree = tree(&cp(&[20, 30, -10, 0]));
        let result = first_bad_move(&tree, Color::White, Band::new(-50.0, 100.0));
        assert_eq!(result, FirstBadMove::NotFound { final_ply: 4 });
        assert_eq!(result.loss(), Some(0.0));
    }

    #[test]
    fn at_or_below_min_is_bad() {
        let tree = tree(&cp(&[20, 30, -50]));
        let result = first_bad_move(&tree, Color::White, Band::new(-50.0, 100.0));
        assert_eq!(result, FirstBadMove::Found { ply: 3, loss: 80.0 });
    }

    #[test]
    fn black_is_judged_on_even_plies() {
        // White POV: Black's move at ply 2 leaves +200, i.e. -200 for Black.
        let tree = tree(&cp(&[10, 200, 180, 190]));
        let result = first_bad_move(&tree, Color::Black, Band::new(-100.0, 100.0));
        assert_eq!(result, FirstBadMove::Found { ply: 2, loss: 190.0 });
    }

    #[test]
    fn missing_evaluation_is_insufficient_data() {
        let mut evals = cp(&[10, 20]);
        evals.push(None);
        evals.push(Some(Score::Centipawn(0)));
        let tree = tree(&evals);

        let result = first_bad_move(&tree, Color::White, Band::default());
        assert_eq!(result, FirstBadMove::InsufficientData { ply: 3 });
        assert_eq!(result.loss(), None);
        assert_eq!(result.ply(), 3);
    }

    #[test]
    fn missing_opponent_evaluation_is_insufficient_data() {
        let tree = tree(&[Some(Score::Centipawn(10)), None, Some(Score::Centipawn(0))]);
        let result = first_bad_move(&tree, Color::White, Band::default());
        assert_eq!(result, FirstBadMove::InsufficientData { ply: 2 });

        let tree = self::tree(&[None, Some(Score::Centipawn(10))]);
        let result = first_bad_move(&tree, Color::Black, Band::default());
        assert_eq!(result, FirstBadMove::InsufficientData { ply: 1 });
    }

    #[test]
    fn missed_mate_is_unbounded() {
        let tree = tree(&[
            Some(Score::Centipawn(30)),
            Some(Score::mate_in(2)),
            Some(Score::Centipawn(400)),
        ]);
        let result = first_bad_move(&tree, Color::White, Band::default());
        assert_eq!(
            result,
            FirstBadMove::Found {
                ply: 3,
                loss: f64::INFINITY
            }
        );
    }

    #[test]
    fn walking_into_mate_is_unbounded() {
        let tree = tree(&[
            Some(Score::Centipawn(-900)),
            Some(Score::Centipawn(-950)),
            Some(Score::mated_in(3)),
        ]);
        let result = first_bad_move(&tree, Color::White, Band::default());
        assert_eq!(
            result,
            FirstBadMove::Found {
                ply: 3,
                loss: f64::INFINITY
            }
        );
    }

    #[test]
    fn mate_to_mate_carries_no_signal() {
        let tree = tree(&[
            Some(Score::mate_in(4)),
            Some(Score::mate_in(3)),
            Some(Score::mate_in(3)),
            Some(Score::mate_in(2)),
        ]);
        let result = first_bad_move(&tree, Color::White, Band::new(-50.0, 50.0));
        assert_eq!(result, FirstBadMove::NotFound { final_ply: 4 });

        let all: Vec<MoveLoss> = losses(&tree, Color::White).collect();
        assert_eq!(all[1], MoveLoss { ply: 3, loss: 0.0 });
    }

    #[test]
    fn loss_sequence_alternates_with_opponent() {
        let tree = tree(&cp(&[50, 40, -300]));
        let all: Vec<MoveLoss> = losses(&tree, Color::White).collect();
        assert_eq!(
            all,
            vec![
                MoveLoss { ply: 1, loss: -50.0 },
                MoveLoss { ply: 3, loss: 340.0 },
            ]
        );
    }

    #[test]
    fn loss_sequence_for_black() {
        let tree = tree(&cp(&[30, 20, 60, -40]));
        let all: Vec<MoveLoss> = losses(&tree, Color::Black).collect();
        assert_eq!(
            all,
            vec![
                MoveLoss { ply: 2, loss: -10.0 },
                MoveLoss { ply: 4, loss: -100.0 },
            ]
        );
    }

    #[test]
    fn loss_sequence_halts_on_missing_data() {
        let mut evals = cp(&[50, 40]);
        evals.push(None);
        let tree = tree(&evals);

        let mut seq = losses(&tree, Color::White);
        assert_eq!(seq.next(), Some(MoveLoss { ply: 1, loss: -50.0 }));
        assert_eq!(seq.insufficient_data(), None);
        assert_eq!(seq.next(), None);
        assert_eq!(seq.insufficient_data(), Some(3));
        assert_eq!(seq.next(), None);
    }

    #[test]
    fn loss_sequence_restarts() {
        let tree = tree(&cp(&[50, 40, -300]));
        let first: Vec<MoveLoss> = losses(&tree, Color::White).collect();
        let second: Vec<MoveLoss> = losses(&tree, Color::White).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn player_helpers_resolve_color() {
        let headers = GameHeaders {
            id: "g1".to_string(),
            white: Some("alice".to_string()),
            black: Some("bob".to_string()),
            ..GameHeaders::default()
        };
        let game = AnnotatedGame::new(headers, tree(&cp(&[50, 40, -300])));

        let all: Vec<MoveLoss> = losses_for(&game, "bob").unwrap().collect();
        assert_eq!(all, vec![MoveLoss { ply: 2, loss: -10.0 }]);
        assert!(matches!(
            first_bad_move_for(&game, "alice", Band::new(-100.0, 100.0)),
            Ok(FirstBadMove::Found { ply: 3, .. })
        ));
        assert_eq!(
            first_bad_move_for(&game, "carol", Band::default()),
            Err(BlunderError::PlayerNotInGame {
                player: "carol".to_string(),
                game: "g1".to_string(),
            })
        );
    }
}

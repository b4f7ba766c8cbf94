//! Per-game blunder reports and their aggregate.

use chess_analysis::{first_bad_move, losses, Band, BlunderError, FirstBadMove};
use chess_core::{AnnotatedGame, Color};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::warn;

/// An evaluation drop. Drops caused by a forced mate appearing or vanishing
/// have no finite size and serialize as `{"unbounded": true, "positive": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Loss {
    Finite(f64),
    Unbounded { unbounded: bool, positive: bool },
}

impl From<f64> for Loss {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Loss::Finite(value)
        } else {
            Loss::Unbounded {
                unbounded: true,
                positive: value > 0.0,
            }
        }
    }
}

impl Loss {
    pub fn finite(&self) -> Option<f64> {
        match self {
            Loss::Finite(value) => Some(*value),
            Loss::Unbounded { .. } => None,
        }
    }

    /// True for an unbounded loss (not gain).
    pub fn is_unbounded_loss(&self) -> bool {
        matches!(self, Loss::Unbounded { positive: true, .. })
    }
}

/// Serializable form of [`FirstBadMove`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verdict {
    Found { ply: usize, loss: Loss },
    NotFound { final_ply: usize },
    InsufficientData { ply: usize },
}

impl From<FirstBadMove> for Verdict {
    fn from(result: FirstBadMove) -> Self {
        match result {
            FirstBadMove::Found { ply, loss } => Verdict::Found {
                ply,
                loss: loss.into(),
            },
            FirstBadMove::NotFound { final_ply } => Verdict::NotFound { final_ply },
            FirstBadMove::InsufficientData { ply } => Verdict::InsufficientData { ply },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlyLoss {
    pub ply: usize,
    pub loss: Loss,
}

/// Blunder review of one game from one player's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameReport {
    pub game_id: String,
    pub player: String,
    pub color: Color,
    pub first_bad_move: Verdict,
    pub losses: Vec<PlyLoss>,
    /// Ply whose missing evaluation cut the loss sequence short.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<usize>,
}

impl GameReport {
    pub fn build(game: &AnnotatedGame, player: &str, band: Band) -> Result<Self, BlunderError> {
        let color = game
            .color_of(player)
            .ok_or_else(|| BlunderError::PlayerNotInGame {
                player: player.to_string(),
                game: game.id().to_string(),
            })?;

        let mut sequence = losses(game.tree(), color);
        let per_move = sequence
            .by_ref()
            .map(|m| PlyLoss {
                ply: m.ply,
                loss: m.loss.into(),
            })
            .collect();

        Ok(Self {
            game_id: game.id().to_string(),
            player: player.to_string(),
            color,
            first_bad_move: first_bad_move(game.tree(), color, band).into(),
            losses: per_move,
            halted_at: sequence.insufficient_data(),
        })
    }
}

/// Aggregate over a set of [`GameReport`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub games: usize,
    pub with_bad_move: usize,
    pub insufficient_data: usize,
    pub mean_first_bad_ply: Option<f64>,
    pub mean_loss: Option<f64>,
    pub unbounded_losses: usize,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

impl ReportSummary {
    pub fn from_reports(reports: &[GameReport]) -> Self {
        let all_losses = || reports.iter().flat_map(|r| r.losses.iter().map(|l| l.loss));
        let bad_plies = reports.iter().filter_map(|r| match r.first_bad_move {
            Verdict::Found { ply, .. } => Some(ply as f64),
            _ => None,
        });

        Self {
            games: reports.len(),
            with_bad_move: reports
                .iter()
                .filter(|r| matches!(r.first_bad_move, Verdict::Found { .. }))
                .count(),
            insufficient_data: reports
                .iter()
                .filter(|r| matches!(r.first_bad_move, Verdict::InsufficientData { .. }))
                .count(),
            mean_first_bad_ply: mean(bad_plies),
            mean_loss: mean(all_losses().filter_map(|l| l.finite())),
            unbounded_losses: all_losses().filter(Loss::is_unbounded_loss).count(),
        }
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Games:              {}", self.games)?;
        writeln!(f, "With a bad move:    {}", self.with_bad_move)?;
        writeln!(f, "Insufficient data:  {}", self.insufficient_data)?;
        match self.mean_first_bad_ply {
            Some(ply) => writeln!(f, "Mean first bad ply: {:.1}", ply)?,
            None => writeln!(f, "Mean first bad ply: -")?,
        }
        match self.mean_loss {
            Some(loss) => writeln!(f, "Mean loss (cp):     {:.1}", loss)?,
            None => writeln!(f, "Mean loss (cp):     -")?,
        }
        write!(f, "Unbounded losses:   {}", self.unbounded_losses)
    }
}

/// Full review of a player's games.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub games: Vec<GameReport>,
}

impl Report {
    /// Reviews every game `player` took part in; other games are skipped.
    pub fn build(games: &[AnnotatedGame], player: &str, band: Band) -> Self {
        let games: Vec<GameReport> = games
            .iter()
            .filter_map(|game| match GameReport::build(game, player, band) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "Skipping game");
                    None
                }
            })
            .collect();

        Self {
            summary: ReportSummary::from_reports(&games),
            games,
        }
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()
    }
}

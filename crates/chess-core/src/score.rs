//! Position scores and the point-of-view (POV) model.
//!
//! A [`Score`] is always relative to some side. The side is not stored in the
//! score itself: callers track it and convert with [`Score::pov`]. Move trees
//! store every score from White's point of view, the same convention PGN
//! `%eval` annotations use.

use crate::Color;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Largest centipawn discrepancy still treated as a rounding artifact when a
/// fresh evaluation is compared with a stored one.
pub const ROUNDING_TOLERANCE_CP: i64 = 1;

/// Evaluation of a position from one side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Score {
    /// Centipawn evaluation (positive = the POV side is better).
    ///
    /// Always within `-i32::MAX..=i32::MAX`, so negation is exact.
    Centipawn(#[serde(deserialize_with = "symmetric_centipawns")] i32),
    /// Forced mate in `moves` moves. `giving` is true when the POV side
    /// delivers the mate and false when it receives it.
    MateIn { moves: u32, giving: bool },
    /// Evaluation not computed yet.
    Unknown,
}

impl Score {
    /// Centipawn score with `i32::MIN` clamped to `-i32::MAX`.
    pub const fn centipawns_clamped(cp: i32) -> Self {
        if cp == i32::MIN {
            Score::Centipawn(-i32::MAX)
        } else {
            Score::Centipawn(cp)
        }
    }

    /// The POV side mates in `moves`.
    pub const fn mate_in(moves: u32) -> Self {
        Score::MateIn {
            moves,
            giving: true,
        }
    }

    /// The POV side gets mated in `moves`.
    pub const fn mated_in(moves: u32) -> Self {
        Score::MateIn {
            moves,
            giving: false,
        }
    }

    /// Builds a score from the raw `cp`/`mate` pair used by UCI info lines
    /// and by external evaluation traces.
    ///
    /// The score is relative to whichever side the source reports from (the
    /// side to move for UCI, White for lichess traces). A mate value takes
    /// precedence over a centipawn value; `mate 0` means the POV side is
    /// already mated. Returns `None` when neither value is present.
    pub fn from_uci(cp: Option<i32>, mate: Option<i32>) -> Option<Self> {
        match (mate, cp) {
            (Some(m), _) if m > 0 => Some(Score::mate_in(m.unsigned_abs())),
            (Some(m), _) => Some(Score::mated_in(m.unsigned_abs())),
            (None, Some(cp)) => Some(Score::centipawns_clamped(cp)),
            (None, None) => None,
        }
    }

    /// Returns the same evaluation seen from the other side.
    pub fn flip(self) -> Self {
        match self {
            Score::Centipawn(cp) => Score::Centipawn(cp.saturating_neg()),
            Score::MateIn { moves, giving } => Score::MateIn {
                moves,
                giving: !giving,
            },
            Score::Unknown => Score::Unknown,
        }
    }

    /// Converts a score stated from `from`'s point of view to `to`'s.
    pub fn pov(self, from: Color, to: Color) -> Self {
        if from == to {
            self
        } else {
            self.flip()
        }
    }

    pub fn is_mate(&self) -> bool {
        matches!(self, Score::MateIn { .. })
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Score::Unknown)
    }

    /// Centipawn value, if this is a centipawn score.
    pub fn centipawns(&self) -> Option<i32> {
        match self {
            Score::Centipawn(cp) => Some(*cp),
            _ => None,
        }
    }

    /// Projects the score onto the real line for threshold comparisons.
    ///
    /// Delivered mates map to `+inf`, received mates to `-inf`.
    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Centipawn(cp) => Some(f64::from(*cp)),
            Score::MateIn { giving: true, .. } => Some(f64::INFINITY),
            Score::MateIn { giving: false, .. } => Some(f64::NEG_INFINITY),
            Score::Unknown => None,
        }
    }

    /// Evaluation loss from `self` (before a move) to `after`, both from the
    /// mover's point of view.
    ///
    /// - centipawn to centipawn: the plain delta `self - after`
    /// - mate to mate: `0.0`, the game was already decided
    /// - mate to centipawn: `+inf`, a forced mate slipped away
    /// - centipawn to received mate: `+inf`, the mover walked into a mate
    /// - centipawn to delivered mate: `-inf`, an unbounded gain
    ///
    /// Returns `None` if either score is [`Score::Unknown`].
    pub fn difference(self, after: Score) -> Option<f64> {
        match (self, after) {
            (Score::Unknown, _) | (_, Score::Unknown) => None,
            (Score::Centipawn(before), Score::Centipawn(after)) => {
                Some(f64::from(before) - f64::from(after))
            }
            (Score::MateIn { .. }, Score::MateIn { .. }) => Some(0.0),
            (Score::MateIn { .. }, Score::Centipawn(_)) => Some(f64::INFINITY),
            (Score::Centipawn(_), Score::MateIn { giving: false, .. }) => Some(f64::INFINITY),
            (Score::Centipawn(_), Score::MateIn { giving: true, .. }) => {
                Some(f64::NEG_INFINITY)
            }
        }
    }

    /// Returns true if two scores are equal or differ only by the one
    /// centipawn a decimal round trip can introduce.
    pub fn agrees_with(&self, other: &Score) -> bool {
        match (self, other) {
            (Score::Centipawn(a), Score::Centipawn(b)) => {
                (i64::from(*a) - i64::from(*b)).abs() <= ROUNDING_TOLERANCE_CP
            }
            _ => self == other,
        }
    }

    /// Sort key implementing the strength order: delivered mates (sooner is
    /// stronger), then centipawns, then received mates (later is better).
    fn rank(&self) -> Option<(u8, i64)> {
        match self {
            Score::MateIn {
                moves,
                giving: false,
            } => Some((0, i64::from(*moves))),
            Score::Centipawn(cp) => Some((1, i64::from(*cp))),
            Score::MateIn {
                moves,
                giving: true,
            } => Some((2, -i64::from(*moves))),
            Score::Unknown => None,
        }
    }
}

fn symmetric_centipawns<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let cp = i32::deserialize(deserializer)?;
    if cp == i32::MIN {
        return Err(serde::de::Error::custom("centipawn value out of range"));
    }
    Ok(cp)
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            (None, None) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Centipawn(cp) => {
                let sign = match cp.cmp(&0) {
                    Ordering::Greater => "+",
                    Ordering::Less => "-",
                    Ordering::Equal => "",
                };
                let abs = cp.unsigned_abs();
                write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
            }
            Score::MateIn {
                moves: 0,
                giving: true,
            } => write!(f, "#+0"),
            Score::MateIn {
                moves,
                giving: true,
            } => write!(f, "#{}", moves),
            Score::MateIn {
                moves,
                giving: false,
            } => write!(f, "#-{}", moves),
            Score::Unknown => write!(f, "?"),
        }
    }
}

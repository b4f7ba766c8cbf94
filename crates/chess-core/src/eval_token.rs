//! The `[%eval ...]` token embedded in move comments.
//!
//! The token is both the human-readable record of an evaluation and the
//! machine-readable form persisted alongside the game, in the dialect lichess
//! and PGN tools use: `[%eval 0.17]`, `[%eval -1.5,23]`, `[%eval #-3]`.

use crate::Score;
use regex::Regex;
use std::sync::LazyLock;

static EVAL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[%eval\s+(?:#([+-]?)(\d+)|([+-]?(?:\d+(?:\.\d*)?|\.\d+)))(?:,\d+)?\s*\]")
        .expect("eval token pattern is valid")
});

/// Formats the canonical token for a score, e.g. `[%eval +0.41]`.
///
/// Returns `None` for [`Score::Unknown`], which has no token form.
pub fn format_eval(score: Score) -> Option<String> {
    score
        .is_known()
        .then(|| format!("[%eval {}]", score))
}

/// Parses the first evaluation token found in a comment.
///
/// Pawn values are rounded to the nearest centipawn. A mate token without a
/// sign is a delivered mate, except `#0` which (like `#-0`) means the side
/// whose view the token states is already mated.
pub fn parse_eval(comment: &str) -> Option<Score> {
    let caps = EVAL_TOKEN.captures(comment)?;

    if let Some(moves) = caps.get(2) {
        let moves: u32 = moves.as_str().parse().ok()?;
        let giving = match caps.get(1).map(|m| m.as_str()) {
            Some("-") => false,
            Some("+") => true,
            _ => moves != 0,
        };
        return Some(Score::MateIn { moves, giving });
    }

    let pawns: f64 = caps.get(3)?.as_str().parse().ok()?;
    let cp = (pawns * 100.0).round();
    if cp.abs() > f64::from(i32::MAX) {
        return None;
    }
    Some(Score::Centipawn(cp as i32))
}

/// Returns true if the comment carries an evaluation token.
pub fn has_eval(comment: &str) -> bool {
    EVAL_TOKEN.is_match(comment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_canonical_tokens() {
        assert_eq!(
            format_eval(Score::Centipawn(41)).as_deref(),
            Some("[%eval +0.41]")
        );
        assert_eq!(
            format_eval(Score::Centipawn(-250)).as_deref(),
            Some("[%eval -2.50]")
        );
        assert_eq!(
            format_eval(Score::mated_in(2)).as_deref(),
            Some("[%eval #-2]")
        );
        assert_eq!(format_eval(Score::Unknown), None);
    }

    #[test]
    fn parses_lichess_dialect() {
        assert_eq!(parse_eval("[%eval 0.17]"), Some(Score::Centipawn(17)));
        assert_eq!(parse_eval("[%eval -1.5]"), Some(Score::Centipawn(-150)));
        assert_eq!(parse_eval("[%eval 2]"), Some(Score::Centipawn(200)));
        assert_eq!(parse_eval("[%eval 0.17,23]"), Some(Score::Centipawn(17)));
        assert_eq!(parse_eval("[%eval #3]"), Some(Score::mate_in(3)));
        assert_eq!(parse_eval("[%eval #-3]"), Some(Score::mated_in(3)));
        assert_eq!(parse_eval("[%eval #+0]"), Some(Score::mate_in(0)));
        assert_eq!(parse_eval("[%eval #-0]"), Some(Score::mated_in(0)));
        assert_eq!(parse_eval("[%eval #0]"), Some(Score::mated_in(0)));
    }

    #[test]
    fn rounds_to_nearest_centipawn() {
        assert_eq!(parse_eval("[%eval 0.289]"), Some(Score::Centipawn(29)));
        assert_eq!(parse_eval("[%eval -0.005]"), Some(Score::Centipawn(-1)));
    }

    #[test]
    fn finds_token_inside_free_text() {
        let comment = "Sharp line. [%eval +0.41] [%clk 0:02:59]";
        assert_eq!(parse_eval(comment), Some(Score::Centipawn(41)));
        assert!(has_eval(comment));
    }

    #[test]
    fn first_token_wins() {
        let comment = "[%eval -0.30] [%eval +0.41]";
        assert_eq!(parse_eval(comment), Some(Score::Centipawn(-30)));
    }

    #[test]
    fn ignores_comments_without_token() {
        assert_eq!(parse_eval("evaluation looks fine"), None);
        assert_eq!(parse_eval("[%clk 0:01:00]"), None);
        assert!(!has_eval(""));
    }

    #[test]
    fn canonical_tokens_parse_back() {
        for score in [
            Score::Centipawn(0),
            Score::Centipawn(7),
            Score::Centipawn(-1234),
            Score::mate_in(1),
            Score::mate_in(0),
            Score::mated_in(5),
        ] {
            let token = format_eval(score).unwrap();
            assert_eq!(parse_eval(&token), Some(score), "token {}", token);
        }
    }
}

//! Integration tests for chess-analysis crate.
//!
//! Most tests drive a scripted analysis port. The Stockfish tests require
//! Stockfish in PATH.
//! Run them with: `cargo test -p chess-analysis --test integration -- --ignored`

use chess_analysis::{
    annotate, first_bad_move, losses, merge, AnalysisEngine, AnalysisPort, AnnotateOptions, Band,
    EngineError, FirstBadMove, MoveLoss,
};
use chess_core::{AnnotatedGame, BoardState, Color, GameHeaders, MoveTree, PlayedMove, Score};
use std::time::Duration;

/// Replies with a fixed White-POV score per ply and records every request.
struct ScriptedPort {
    scores: Vec<Score>,
    requested: Vec<usize>,
    fail_at: Option<usize>,
}

impl ScriptedPort {
    fn new(scores: &[i32]) -> Self {
        Self {
            scores: scores.iter().map(|&cp| Score::Centipawn(cp)).collect(),
            requested: Vec::new(),
            fail_at: None,
        }
    }
}

impl AnalysisPort for ScriptedPort {
    fn evaluate(&mut self, board: &BoardState, _: Duration) -> Result<Score, EngineError> {
        let ply = board.ply();
        self.requested.push(ply);
        if self.fail_at == Some(ply) {
            return Err(EngineError::Timeout(Duration::from_millis(1)));
        }
        self.scores
            .get(ply)
            .copied()
            .ok_or_else(|| EngineError::InvalidResponse(format!("no score for ply {ply}")))
    }
}

fn italian() -> AnnotatedGame {
    let mut tree = MoveTree::new();
    for (uci, san) in [
        ("e2e4", "e4"),
        ("e7e5", "e5"),
        ("g1f3", "Nf3"),
        ("b8c6", "Nc6"),
        ("f1c4", "Bc4"),
        ("f8c5", "Bc5"),
    ] {
        tree.push_mainline(PlayedMove::new(uci).with_san(san));
    }
    let headers = GameHeaders {
        id: "italian1".to_string(),
        white: Some("alice".to_string()),
        black: Some("bob".to_string()),
        rated: true,
        variant: "standard".to_string(),
        result: "*".to_string(),
        ..GameHeaders::default()
    };
    AnnotatedGame::new(headers, tree)
}

fn comments(game: &AnnotatedGame) -> Vec<String> {
    let tree = game.tree();
    tree.mainline()
        .map(|id| tree.node(id).comment().to_string())
        .collect()
}

#[test]
fn annotating_twice_makes_no_new_calls() {
    let mut game = italian();
    let mut port = ScriptedPort::new(&[20, 30, 25, 30, 20, 25]);
    annotate(&mut game, &mut port, &AnnotateOptions::default()).unwrap();
    let first_pass = comments(&game);
    assert_eq!(port.requested, vec![0, 1, 2, 3, 4, 5]);

    let mut again = ScriptedPort::new(&[]);
    let summary = annotate(&mut game, &mut again, &AnnotateOptions::default()).unwrap();

    assert!(again.requested.is_empty());
    assert_eq!(summary.skipped, 6);
    assert_eq!(comments(&game), first_pass);
}

#[test]
fn interrupted_run_resumes_after_last_annotated_ply() {
    let mut game = italian();
    let mut port = ScriptedPort::new(&[20, 30, 25, 30, 20, 25]);
    port.fail_at = Some(3);

    let err = annotate(&mut game, &mut port, &AnnotateOptions::default()).unwrap_err();
    assert_eq!(err.ply(), 3);

    let mut resumed = ScriptedPort::new(&[20, 30, 25, 30, 20, 25]);
    annotate(&mut game, &mut resumed, &AnnotateOptions::default()).unwrap();

    assert_eq!(resumed.requested, vec![3, 4, 5]);
    assert!(comments(&game)[..6].iter().all(|c| c.starts_with("[%eval ")));
}

#[test]
fn external_trace_merged_first_saves_engine_calls() {
    let mut game = italian();
    let mut external = italian();
    for (ply, token) in [(1, "[%eval 0.28]"), (2, "[%eval 0.22]")] {
        let id = external.tree().node_at_ply(ply).unwrap();
        external.tree_mut().set_comment(id, token);
    }

    assert_eq!(merge(&mut game, &external), 6);
    let mut port = ScriptedPort::new(&[20, 30, 25, 30, 20, 25]);
    annotate(&mut game, &mut port, &AnnotateOptions::default()).unwrap();

    assert_eq!(port.requested, vec![0, 3, 4, 5]);
    assert_eq!(comments(&game)[1], "[%eval 0.28]");
}

#[test]
fn merge_keeps_both_comments_in_order() {
    let mut local = italian();
    let mut port = ScriptedPort::new(&[20, 30, 25, 30, 20, 25]);
    annotate(&mut local, &mut port, &AnnotateOptions::default()).unwrap();

    let mut external = italian();
    let id = external.tree().node_at_ply(2).unwrap();
    external.tree_mut().set_comment(id, "Inaccuracy. [%eval 0.40]");

    merge(&mut local, &external);

    let merged = comments(&local);
    assert_eq!(merged[2], "Inaccuracy. [%eval 0.40] [%eval +0.25]");
}

#[test]
fn first_bad_move_after_annotation() {
    let mut game = italian();
    // ply 0 is the start position; the walk reads plies 1..=6.
    let mut port = ScriptedPort::new(&[0, 120, 130, -10, 0, 0]);
    annotate(&mut game, &mut port, &AnnotateOptions::default()).unwrap();

    let result = first_bad_move(game.tree(), Color::White, Band::new(-50.0, 100.0));
    assert_eq!(result, FirstBadMove::Found { ply: 3, loss: 140.0 });
}

#[test]
fn unannotated_final_position_limits_analysis() {
    let mut game = italian();
    let mut port = ScriptedPort::new(&[0, 50, 40, -300, -280, -290]);
    annotate(&mut game, &mut port, &AnnotateOptions::default()).unwrap();

    let mut seq = losses(game.tree(), Color::White);
    let collected: Vec<MoveLoss> = seq.by_ref().collect();
    assert_eq!(
        collected,
        vec![
            MoveLoss { ply: 1, loss: -50.0 },
            MoveLoss { ply: 3, loss: 340.0 },
            MoveLoss { ply: 5, loss: 10.0 },
        ]
    );
    assert_eq!(seq.insufficient_data(), Some(6));
    assert_eq!(
        first_bad_move(game.tree(), Color::Black, Band::new(-1000.0, 1000.0)),
        FirstBadMove::InsufficientData { ply: 6 }
    );
}

/// Check if Stockfish is available in PATH.
fn stockfish_available() -> bool {
    std::process::Command::new("stockfish")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}

#[test]
#[ignore = "requires Stockfish"]
fn test_stockfish_annotates_scholars_mate() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    let mut engine = AnalysisEngine::new("stockfish").expect("Failed to create AnalysisEngine");
    assert!(engine.name().to_lowercase().contains("stockfish"));

    // 1.e4 e5 2.Qh5 Nc6 3.Bc4 Nf6?? 4.Qxf7#
    let mut tree = MoveTree::new();
    for uci in ["e2e4", "e7e5", "d1h5", "b8c6", "f1c4", "g8f6", "h5f7"] {
        tree.push_mainline(PlayedMove::new(uci));
    }
    let mut game = AnnotatedGame::new(GameHeaders::default(), tree);
    let options = AnnotateOptions {
        think_time: Duration::from_millis(100),
        force: false,
    };
    let summary = annotate(&mut game, &mut engine, &options).expect("annotation failed");
    assert_eq!(summary.evaluated, 7);

    // After 3...Nf6 White mates in one.
    let tree = game.tree();
    let after_nf6 = tree.node_at_ply(6).unwrap();
    assert_eq!(tree.node(after_nf6).evaluation(), Some(Score::mate_in(1)));

    let result = first_bad_move(tree, Color::Black, Band::new(-300.0, 300.0));
    assert!(matches!(
        result,
        FirstBadMove::Found { ply: 6, loss } if loss.is_infinite()
    ));
}

//! PGN (Portable Game Notation) export of annotated games.
//!
//! Comments are written as `{ ... }` blocks after their move, so engine
//! evaluations stay readable by other tools as `[%eval ...]` tokens. Side
//! variations are written in parentheses after the main-line move they replace.

use chess_core::{AnnotatedGame, Color, MoveTree, NodeId};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const LINE_WIDTH: usize = 80;

/// Writes all games to one PGN file, separated by blank lines.
pub fn write_pgn<P: AsRef<Path>>(path: P, games: &[AnnotatedGame]) -> std::io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    for (i, game) in games.iter().enumerate() {
        if i > 0 {
            writeln!(file)?;
        }
        write_game(&mut file, game)?;
    }
    file.flush()
}

/// Writes one game: tag pairs, blank line, movetext.
pub fn write_game<W: Write>(out: &mut W, game: &AnnotatedGame) -> std::io::Result<()> {
    for (name, value) in tags(game) {
        writeln!(out, "[{} \"{}\"]", name, escape(&value))?;
    }
    writeln!(out)?;

    let mut tokens = Vec::new();
    let tree = game.tree();
    let root_comment = tree.node(tree.root()).comment();
    if !root_comment.is_empty() {
        tokens.push(comment_block(root_comment));
    }
    write_line(tree, tree.root(), &mut tokens, true);
    tokens.push(result(game).to_string());

    let mut line = String::new();
    for token in tokens {
        if !line.is_empty() && line.len() + 1 + token.len() > LINE_WIDTH {
            writeln!(out, "{}", line)?;
            line.clear();
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&token);
    }
    writeln!(out, "{}", line)
}

fn result(game: &AnnotatedGame) -> &str {
    match game.headers().result.as_str() {
        "" => "*",
        result => result,
    }
}

fn tags(game: &AnnotatedGame) -> Vec<(String, String)> {
    let headers = game.headers();
    let or_unknown = |value: Option<&str>| value.unwrap_or("?").to_string();

    let event = match (&headers.perf, headers.rated) {
        (Some(perf), true) => format!("Rated {} game", perf),
        (Some(perf), false) => format!("Casual {} game", perf),
        (None, _) => "?".to_string(),
    };
    let mut tags = vec![
        ("Event".to_string(), event),
        ("Site".to_string(), or_unknown(headers.site.as_deref())),
        ("Date".to_string(), or_unknown(headers.date.as_deref())),
        ("White".to_string(), or_unknown(game.player(Color::White))),
        ("Black".to_string(), or_unknown(game.player(Color::Black))),
        ("Result".to_string(), result(game).to_string()),
    ];

    let mut optional = |name: &str, value: Option<String>| {
        if let Some(value) = value {
            tags.push((name.to_string(), value));
        }
    };
    optional("WhiteElo", headers.white_rating.map(|r| r.to_string()));
    optional("BlackElo", headers.black_rating.map(|r| r.to_string()));
    optional(
        "TimeControl",
        headers
            .clock
            .map(|c| format!("{}+{}", c.initial_secs, c.increment_secs)),
    );
    optional("ECO", headers.opening.as_ref().map(|o| o.eco.clone()));
    optional("Opening", headers.opening.as_ref().map(|o| o.name.clone()));
    optional("Termination", headers.status.clone());
    if !headers.variant.is_empty() && headers.variant != "standard" {
        optional("Variant", Some(headers.variant.clone()));
    }

    tags.extend(headers.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    tags
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// `{ comment }` with every `}` in the text replaced by `)`.
fn comment_block(comment: &str) -> String {
    format!("{{ {} }}", comment.replace('}', ")"))
}

/// Full-move number of the start position, from the FEN if there is one.
fn first_move_number(tree: &MoveTree) -> usize {
    tree.start_fen()
        .and_then(|fen| fen.split_whitespace().nth(5))
        .and_then(|n| n.parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(1)
}

fn push_move(tree: &MoveTree, id: NodeId, tokens: &mut Vec<String>, force_number: bool) {
    let node = tree.node(id);
    let Some(played) = node.played_move() else {
        return;
    };
    let offset = node.ply() - 1 + usize::from(tree.start_side() == Color::Black);
    let number = first_move_number(tree) + offset / 2;

    if offset % 2 == 0 {
        tokens.push(format!("{}.", number));
    } else if force_number {
        tokens.push(format!("{}...", number));
    }
    tokens.push(played.notation().to_string());
    if !node.comment().is_empty() {
        tokens.push(comment_block(node.comment()));
    }
}

fn write_line(tree: &MoveTree, from: NodeId, tokens: &mut Vec<String>, mut force_number: bool) {
    let mut node = from;
    while let Some(main) = tree.main_continuation(node) {
        push_move(tree, main, tokens, force_number);
        force_number = !tree.node(main).comment().is_empty();

        for &side in tree.variations(node).iter().skip(1) {
            tokens.push("(".to_string());
            push_move(tree, side, tokens, true);
            write_line(tree, side, tokens, !tree.node(side).comment().is_empty());
            tokens.push(")".to_string());
            force_number = true;
        }
        node = main;
    }
}

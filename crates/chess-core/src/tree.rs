//! Arena-backed move tree.
//!
//! Nodes live in a flat vector and refer to each other by [`NodeId`]. Node 0 is
//! the root (the start position, ply 0). A node's first child is its main
//! continuation; every child, the first included, is one of its variations.

use crate::eval_token::{format_eval, parse_eval};
use crate::{Color, Score};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while building a tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),
}

/// Index of a node inside its [`MoveTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node of every tree.
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The move that produced a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    /// Long algebraic (UCI) form, e.g. `e2e4`, `e7e8q`.
    pub uci: String,
    /// Standard algebraic form when the source supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub san: Option<String>,
}

impl PlayedMove {
    pub fn new(uci: impl Into<String>) -> Self {
        Self {
            uci: uci.into(),
            san: None,
        }
    }

    pub fn with_san(mut self, san: impl Into<String>) -> Self {
        self.san = Some(san.into());
        self
    }

    /// SAN when known, UCI otherwise.
    pub fn notation(&self) -> &str {
        self.san.as_deref().unwrap_or(&self.uci)
    }
}

/// One position in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveNode {
    ply: usize,
    played: Option<PlayedMove>,
    comment: String,
    evaluation: Option<Score>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl MoveNode {
    fn root() -> Self {
        Self {
            ply: 0,
            played: None,
            comment: String::new(),
            evaluation: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn ply(&self) -> usize {
        self.ply
    }

    /// The move leading here; `None` only for the root.
    pub fn played_move(&self) -> Option<&PlayedMove> {
        self.played.as_ref()
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Evaluation recorded for this position, White's point of view.
    pub fn evaluation(&self) -> Option<Score> {
        self.evaluation
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Position reached at a node: the start position plus the moves played.
///
/// Move legality is not re-checked here; the state is handed as-is to an
/// analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoardState {
    start_fen: Option<String>,
    moves: Vec<String>,
    side_to_move: Color,
}

impl BoardState {
    /// `None` means the standard starting position.
    pub fn start_fen(&self) -> Option<&str> {
        self.start_fen.as_deref()
    }

    /// UCI moves from the start position, in order.
    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn ply(&self) -> usize {
        self.moves.len()
    }
}

/// A game as an ordered tree of positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveTree {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_fen: Option<String>,
    start_side: Color,
    nodes: Vec<MoveNode>,
}

impl Default for MoveTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveTree {
    /// Tree rooted at the standard starting position.
    pub fn new() -> Self {
        Self {
            start_fen: None,
            start_side: Color::White,
            nodes: vec![MoveNode::root()],
        }
    }

    /// Tree rooted at an arbitrary position.
    ///
    /// Only the side-to-move field of the FEN is interpreted.
    pub fn from_fen(fen: &str) -> Result<Self, TreeError> {
        let start_side = match fen.split_whitespace().nth(1) {
            Some("w") => Color::White,
            Some("b") => Color::Black,
            _ => return Err(TreeError::InvalidFen(fen.to_string())),
        };
        Ok(Self {
            start_fen: Some(fen.trim().to_string()),
            start_side,
            nodes: vec![MoveNode::root()],
        })
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Returns the node for an id issued by this tree.
    ///
    /// # Panics
    /// Panics if `id` was issued by a different tree.
    pub fn node(&self, id: NodeId) -> &MoveNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&MoveNode> {
        self.nodes.get(id.0)
    }

    /// Number of nodes, variations included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn start_fen(&self) -> Option<&str> {
        self.start_fen.as_deref()
    }

    /// Side to move in the start position.
    pub fn start_side(&self) -> Color {
        self.start_side
    }

    /// Colour whose move produced the node at `ply`.
    pub fn mover(&self, ply: usize) -> Color {
        Color::mover_of_ply(self.start_side, ply)
    }

    /// Adds a continuation after `parent`. The first child added becomes the
    /// main continuation, later ones are side variations.
    pub fn add_variation(&mut self, parent: NodeId, mv: PlayedMove) -> NodeId {
        let id = NodeId(self.nodes.len());
        let ply = self.nodes[parent.0].ply + 1;
        self.nodes.push(MoveNode {
            ply,
            played: Some(mv),
            comment: String::new(),
            evaluation: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Extends the main line by one move.
    pub fn push_mainline(&mut self, mv: PlayedMove) -> NodeId {
        let end = self.mainline_end();
        self.add_variation(end, mv)
    }

    pub fn main_continuation(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].children.first().copied()
    }

    pub fn variations(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn is_terminal(&self, id: NodeId) -> bool {
        self.nodes[id.0].children.is_empty()
    }

    /// Main line from the root, the root included.
    pub fn mainline(&self) -> Mainline<'_> {
        Mainline {
            tree: self,
            next: Some(NodeId::ROOT),
        }
    }

    /// Last node of the main line.
    pub fn mainline_end(&self) -> NodeId {
        self.mainline().last().unwrap_or(NodeId::ROOT)
    }

    /// Number of plies on the main line.
    pub fn mainline_len(&self) -> usize {
        self.node(self.mainline_end()).ply
    }

    /// Main-line node reached after `ply` half-moves.
    pub fn node_at_ply(&self, ply: usize) -> Option<NodeId> {
        self.mainline().nth(ply)
    }

    /// Reconstructs the position at a node.
    pub fn board(&self, id: NodeId) -> BoardState {
        let mut moves = Vec::with_capacity(self.nodes[id.0].ply);
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.0];
            if let Some(mv) = &node.played {
                moves.push(mv.uci.clone());
            }
            cursor = node.parent;
        }
        moves.reverse();

        let side_to_move = if moves.len() % 2 == 0 {
            self.start_side
        } else {
            self.start_side.opposite()
        };
        BoardState {
            start_fen: self.start_fen.clone(),
            moves,
            side_to_move,
        }
    }

    /// Replaces a comment. The stored evaluation is re-derived from the first
    /// evaluation token in the new text.
    pub fn set_comment(&mut self, id: NodeId, comment: impl Into<String>) {
        let node = &mut self.nodes[id.0];
        node.comment = comment.into();
        node.evaluation = parse_eval(&node.comment);
    }

    /// Appends the canonical token for `score` to a node's comment, keeping
    /// any text already there. A node without a stored evaluation adopts
    /// `score`; an existing one is left as is.
    ///
    /// Returns false (and changes nothing) for [`Score::Unknown`].
    pub fn append_evaluation(&mut self, id: NodeId, score: Score) -> bool {
        let Some(token) = format_eval(score) else {
            return false;
        };
        let node = &mut self.nodes[id.0];
        if !node.comment.is_empty() {
            node.comment.push(' ');
        }
        node.comment.push_str(&token);
        node.evaluation.get_or_insert(score);
        true
    }

    /// Puts `text` in front of a node's comment, separated by one space when
    /// both are non-empty. A token inside `text` takes precedence over the
    /// node's stored evaluation.
    pub fn prepend_comment(&mut self, id: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        let node = &mut self.nodes[id.0];
        node.comment = if node.comment.is_empty() {
            text.to_string()
        } else {
            format!("{} {}", text, node.comment)
        };
        if let Some(score) = parse_eval(text) {
            node.evaluation = Some(score);
        }
    }
}

/// Iterator over the main line of a [`MoveTree`].
pub struct Mainline<'a> {
    tree: &'a MoveTree,
    next: Option<NodeId>,
}

impl Iterator for Mainline<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.main_continuation(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scholars_mate() -> MoveTree {
        let mut tree = MoveTree::new();
        for (uci, san) in [
            ("e2e4", "e4"),
            ("e7e5", "e5"),
            ("d1h5", "Qh5"),
            ("b8c6", "Nc6"),
            ("f1c4", "Bc4"),
            ("g8f6", "Nf6"),
            ("h5f7", "Qxf7#"),
        ] {
            tree.push_mainline(PlayedMove::new(uci).with_san(san));
        }
        tree
    }

    #[test]
    fn new_tree_has_only_root() {
        let tree = MoveTree::new();
        assert!(tree.is_empty());
        assert!(tree.is_terminal(tree.root()));
        assert_eq!(tree.mainline_len(), 0);
        assert_eq!(tree.node(tree.root()).ply(), 0);
        assert!(tree.node(tree.root()).played_move().is_none());
    }

    #[test]
    fn mainline_follows_first_children() {
        let tree = scholars_mate();
        let plies: Vec<usize> = tree.mainline().map(|id| tree.node(id).ply()).collect();
        assert_eq!(plies, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(tree.mainline_len(), 7);
        assert!(tree.is_terminal(tree.mainline_end()));
    }

    #[test]
    fn variations_do_not_change_mainline() {
        let mut tree = scholars_mate();
        let after_e4 = tree.node_at_ply(1).unwrap();
        let main_reply = tree.main_continuation(after_e4).unwrap();
        let sicilian = tree.add_variation(after_e4, PlayedMove::new("c7c5").with_san("c5"));

        assert_eq!(tree.main_continuation(after_e4), Some(main_reply));
        assert_eq!(tree.variations(after_e4), &[main_reply, sicilian]);
        assert_eq!(tree.node(sicilian).ply(), 2);
        assert_eq!(tree.mainline_len(), 7);
        assert_eq!(tree.len(), 9);
    }

    #[test]
    fn node_at_ply_past_end_is_none() {
        let tree = scholars_mate();
        assert_eq!(tree.node_at_ply(0), Some(tree.root()));
        assert!(tree.node_at_ply(8).is_none());
    }

    #[test]
    fn board_collects_move_path() {
        let tree = scholars_mate();
        let board = tree.board(tree.node_at_ply(3).unwrap());
        assert_eq!(board.moves(), &["e2e4", "e7e5", "d1h5"]);
        assert_eq!(board.side_to_move(), Color::Black);
        assert_eq!(board.start_fen(), None);
        assert_eq!(board.ply(), 3);

        let root = tree.board(tree.root());
        assert!(root.moves().is_empty());
        assert_eq!(root.side_to_move(), Color::White);
    }

    #[test]
    fn fen_start_with_black_to_move() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 b - - 0 1";
        let mut tree = MoveTree::from_fen(fen).unwrap();
        tree.push_mainline(PlayedMove::new("e8d7"));
        tree.push_mainline(PlayedMove::new("e2e4"));

        assert_eq!(tree.start_side(), Color::Black);
        assert_eq!(tree.mover(1), Color::Black);
        assert_eq!(tree.mover(2), Color::White);
        let board = tree.board(tree.mainline_end());
        assert_eq!(board.start_fen(), Some(fen));
        assert_eq!(board.side_to_move(), Color::Black);
    }

    #[test]
    fn fen_without_side_is_rejected() {
        assert!(matches!(
            MoveTree::from_fen("8/8/8/8"),
            Err(TreeError::InvalidFen(_))
        ));
    }

    #[test]
    fn set_comment_derives_evaluation() {
        let mut tree = scholars_mate();
        let id = tree.node_at_ply(1).unwrap();
        tree.set_comment(id, "Best by test [%eval 0.25]");
        assert_eq!(tree.node(id).evaluation(), Some(Score::Centipawn(25)));

        tree.set_comment(id, "no token");
        assert_eq!(tree.node(id).evaluation(), None);
    }

    #[test]
    fn append_evaluation_keeps_text() {
        let mut tree = scholars_mate();
        let bare = tree.node_at_ply(1).unwrap();
        assert!(tree.append_evaluation(bare, Score::Centipawn(41)));
        assert_eq!(tree.node(bare).comment(), "[%eval +0.41]");
        assert_eq!(tree.node(bare).evaluation(), Some(Score::Centipawn(41)));

        let commented = tree.node_at_ply(2).unwrap();
        tree.set_comment(commented, "Solid");
        tree.append_evaluation(commented, Score::mated_in(3));
        assert_eq!(tree.node(commented).comment(), "Solid [%eval #-3]");
    }

    #[test]
    fn append_evaluation_keeps_stored_score() {
        let mut tree = scholars_mate();
        let id = tree.node_at_ply(1).unwrap();
        tree.set_comment(id, "[%eval 0.30]");
        tree.append_evaluation(id, Score::Centipawn(31));
        assert_eq!(tree.node(id).comment(), "[%eval 0.30] [%eval +0.31]");
        assert_eq!(tree.node(id).evaluation(), Some(Score::Centipawn(30)));
    }

    #[test]
    fn unknown_score_is_not_appended() {
        let mut tree = scholars_mate();
        let id = tree.node_at_ply(1).unwrap();
        assert!(!tree.append_evaluation(id, Score::Unknown));
        assert_eq!(tree.node(id).comment(), "");
        assert_eq!(tree.node(id).evaluation(), None);
    }

    #[test]
    fn prepend_comment_puts_text_first() {
        let mut tree = scholars_mate();
        let id = tree.node_at_ply(2).unwrap();
        tree.append_evaluation(id, Score::Centipawn(20));
        tree.prepend_comment(id, "[%eval 0.18]");
        assert_eq!(tree.node(id).comment(), "[%eval 0.18] [%eval +0.20]");
        assert_eq!(tree.node(id).evaluation(), Some(Score::Centipawn(18)));

        let empty = tree.node_at_ply(3).unwrap();
        tree.prepend_comment(empty, "external");
        assert_eq!(tree.node(empty).comment(), "external");
        tree.prepend_comment(empty, "");
        assert_eq!(tree.node(empty).comment(), "external");
    }

    #[test]
    fn serde_preserves_structure() {
        let mut tree = scholars_mate();
        let id = tree.node_at_ply(5).unwrap();
        tree.append_evaluation(id, Score::mate_in(1));
        tree.add_variation(tree.node_at_ply(4).unwrap(), PlayedMove::new("d7d6"));

        let json = serde_json::to_string(&tree).unwrap();
        let back: MoveTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }
}

//! Combines the annotations of two trees of the same game.

use chess_core::AnnotatedGame;
use tracing::debug;

/// Walks both main lines in lock-step and prepends each `secondary` comment
/// to the matching `primary` comment. The root is not merged.
///
/// Both trees must record the same game; moves are not compared. Merging
/// stops at the end of the shorter main line. Returns the number of node
/// pairs merged.
pub fn merge(primary: &mut AnnotatedGame, secondary: &AnnotatedGame) -> usize {
    let source = secondary.tree();
    let pairs: Vec<_> = primary
        .tree()
        .mainline()
        .zip(source.mainline())
        .skip(1)
        .collect();

    let target = primary.tree_mut();
    for &(into, from) in &pairs {
        target.prepend_comment(into, source.node(from).comment());
    }

    debug!(
        game = %primary.id(),
        merged = pairs.len(),
        "Merged annotations"
    );
    pairs.len()
}

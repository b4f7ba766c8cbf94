//! Predicates that keep unsuitable games out of review.

use crate::config::FilterConfig;
use crate::source::GameRecord;
use std::fmt;

/// Why a record was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    AgainstAi,
    Anonymous,
    Variant(String),
    Unrated,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::AgainstAi => write!(f, "played against the AI"),
            Rejection::Anonymous => write!(f, "anonymous player"),
            Rejection::Variant(variant) => write!(f, "variant {} not accepted", variant),
            Rejection::Unrated => write!(f, "unrated"),
        }
    }
}

/// Record filter built from [`FilterConfig`].
#[derive(Debug, Clone, Default)]
pub struct GameFilter {
    config: FilterConfig,
}

impl GameFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// First reason to reject `record`, if any.
    pub fn rejection(&self, record: &GameRecord) -> Option<Rejection> {
        let sides = [&record.players.white, &record.players.black];

        if self.config.skip_ai && sides.iter().any(|side| side.ai_level.is_some()) {
            return Some(Rejection::AgainstAi);
        }
        if self.config.skip_anonymous && sides.iter().any(|side| side.user.is_none()) {
            return Some(Rejection::Anonymous);
        }
        if !self.config.variants.iter().any(|v| v == &record.variant) {
            return Some(Rejection::Variant(record.variant.clone()));
        }
        if self.config.rated_only && !record.rated {
            return Some(Rejection::Unrated);
        }
        None
    }

    pub fn accepts(&self, record: &GameRecord) -> bool {
        self.rejection(record).is_none()
    }
}

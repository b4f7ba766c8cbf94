//! Game Review - blunder review of a player's games.
//!
//! Reads a player's exported games, annotates every position with engine
//! evaluations and reports where the player's moves lost ground.
//!
//! # Modules
//!
//! - [`source`] - Game records and the NDJSON export reader
//! - [`filter`] - Rated/anonymous/variant/AI predicates
//! - [`convert`] - Records to annotated games, server analysis as a trace
//! - [`storage`] - SQLite storage for records and game snapshots
//! - [`pipeline`] - Ingest and resumable batch annotation
//! - [`report`] - Per-game and aggregate blunder reports
//! - [`pgn`] - PGN export with evaluation comments
//! - [`config`] - TOML configuration

pub mod config;
pub mod convert;
pub mod filter;
pub mod pgn;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod storage;

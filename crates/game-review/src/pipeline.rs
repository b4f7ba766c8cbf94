//! Batch stages: ingest, annotate, resume.

use crate::config::EngineConfig;
use crate::convert::{convert_games, ConvertedGame};
use crate::filter::GameFilter;
use crate::source::{GameSource, SourceError};
use crate::storage::{analysis_key, Storage, StorageError, NO_ANALYSIS};
use chess_analysis::{
    annotate, merge, AnalysisEngine, AnalysisPort, AnnotateError, AnnotateOptions,
    AnnotationSummary, EngineError,
};
use chess_core::AnnotatedGame;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that stop a pipeline stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Failed to start engine: {0}")]
    Engine(#[from] EngineError),
    #[error("Annotation of game {game} failed: {source}")]
    Annotate {
        game: String,
        #[source]
        source: AnnotateError,
    },
    #[error("No {analysis} snapshot for {player}")]
    MissingSnapshot { player: String, analysis: String },
}

/// Totals over an annotation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub games: usize,
    pub evaluated: usize,
    pub skipped: usize,
}

/// Fetches (or reuses cached) records, converts them, folds each record's
/// server analysis into its game and stores the parsed snapshot.
pub fn ingest<S>(
    storage: &Storage,
    source: &mut S,
    player: &str,
    filter: &GameFilter,
    refresh: bool,
) -> Result<Vec<AnnotatedGame>, PipelineError>
where
    S: GameSource + ?Sized,
{
    let mut records = storage.load_records(player)?;
    if refresh || records.is_empty() {
        let fetched = source.fetch(player)?;
        info!(player, fetched = fetched.len(), "Fetched game records");
        storage.save_records(player, &fetched)?;
        records = storage.load_records(player)?;
    } else {
        info!(player, cached = records.len(), "Using cached game records");
    }

    let games: Vec<AnnotatedGame> = convert_games(&records, filter)
        .into_iter()
        .map(|ConvertedGame { mut game, trace }| {
            if let Some(trace) = trace {
                merge(&mut game, &trace);
            }
            game
        })
        .collect();

    storage.save_games(player, NO_ANALYSIS, &games, true)?;
    info!(player, games = games.len(), "Saved parsed games");
    Ok(games)
}

/// Starts the configured engine and applies its UCI options.
pub fn start_engine(config: &EngineConfig) -> Result<AnalysisEngine, EngineError> {
    let mut engine = AnalysisEngine::with_grace(&config.path, config.grace())?;
    for (name, value) in &config.options {
        engine.set_option(name, value)?;
    }
    info!(engine = engine.name(), path = %config.path, "Engine started");
    Ok(engine)
}

struct Progress {
    total: usize,
    done: AtomicUsize,
    evaluated: AtomicUsize,
    skipped: AtomicUsize,
    start: Instant,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            evaluated: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            start: Instant::now(),
        }
    }

    fn game_done(&self, summary: AnnotationSummary) {
        self.evaluated.fetch_add(summary.evaluated, Ordering::Relaxed);
        self.skipped.fetch_add(summary.skipped, Ordering::Relaxed);
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;

        if done % 10 == 0 || done == self.total {
            let elapsed = self.start.elapsed().as_secs_f64();
            let per_game = elapsed / done as f64;
            let eta = Duration::from_secs_f64(per_game * (self.total - done) as f64);
            info!(
                done,
                total = self.total,
                games_per_minute = if elapsed > 0.0 { done as f64 * 60.0 / elapsed } else { 0.0 },
                eta_secs = eta.as_secs(),
                "Annotating games"
            );
        }
    }

    fn summary(&self) -> BatchSummary {
        BatchSummary {
            games: self.done.load(Ordering::Relaxed),
            evaluated: self.evaluated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Annotates every game, in place.
///
/// With more than one worker, each worker thread owns its own engine from
/// `factory` and pulls games from a shared queue, so no engine ever has two
/// requests in flight. On failure the remaining workers stop after their
/// current game; games already processed keep their annotations.
pub fn annotate_games<P, F>(
    games: &mut [AnnotatedGame],
    factory: F,
    options: &AnnotateOptions,
    workers: usize,
) -> Result<BatchSummary, PipelineError>
where
    P: AnalysisPort,
    F: Fn() -> Result<P, EngineError> + Sync,
{
    let progress = Progress::new(games.len());
    let workers = workers.clamp(1, games.len().max(1));

    if workers == 1 {
        let mut engine = factory()?;
        for game in games.iter_mut() {
            let summary = annotate(game, &mut engine, options).map_err(|source| {
                PipelineError::Annotate {
                    game: game.id().to_string(),
                    source,
                }
            })?;
            progress.game_done(summary);
        }
        return Ok(progress.summary());
    }

    let queue = Mutex::new(games.iter_mut());
    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<PipelineError>> = Mutex::new(None);
    let record_error = |e: PipelineError| {
        failed.store(true, Ordering::Relaxed);
        if let Ok(mut slot) = first_error.lock() {
            slot.get_or_insert(e);
        }
    };

    std::thread::scope(|scope| {
        for worker in 0..workers {
            let (queue, failed, progress, factory, record_error) =
                (&queue, &failed, &progress, &factory, &record_error);
            scope.spawn(move || {
                let mut engine = match factory() {
                    Ok(engine) => engine,
                    Err(e) => {
                        error!(worker, error = %e, "Failed to start engine");
                        record_error(e.into());
                        return;
                    }
                };
                while !failed.load(Ordering::Relaxed) {
                    let next = queue.lock().ok().and_then(|mut games| games.next());
                    let Some(game) = next else { break };
                    match annotate(game, &mut engine, options) {
                        Ok(summary) => progress.game_done(summary),
                        Err(source) => {
                            error!(worker, game = %game.id(), error = %source, "Annotation failed");
                            record_error(PipelineError::Annotate {
                                game: game.id().to_string(),
                                source,
                            });
                        }
                    }
                }
            });
        }
    });

    match first_error.into_inner().ok().flatten() {
        Some(e) => Err(e),
        None => Ok(progress.summary()),
    }
}

/// Returns the annotated snapshot for `options.think_time`, annotating the
/// parsed games first if no complete snapshot exists.
///
/// Games from an incomplete snapshot replace their parsed counterparts, so
/// annotation resumes where the interrupted run stopped. With `force`, the
/// parsed games are re-annotated from scratch. A failed run is saved as an
/// incomplete snapshot before the error is returned.
pub fn load_or_annotate<P, F>(
    storage: &Storage,
    player: &str,
    options: &AnnotateOptions,
    factory: F,
    workers: usize,
) -> Result<Vec<AnnotatedGame>, PipelineError>
where
    P: AnalysisPort,
    F: Fn() -> Result<P, EngineError> + Sync,
{
    let key = analysis_key(Some(options.think_time));
    let previous = match storage.load_games(player, &key)? {
        _ if options.force => None,
        Some(snapshot) if snapshot.complete => {
            info!(player, analysis = %key, games = snapshot.games.len(), "Using cached analysis");
            return Ok(snapshot.games);
        }
        partial => partial,
    };

    let mut games = load_snapshot(storage, player, None)?;
    if let Some(snapshot) = previous {
        info!(player, analysis = %key, "Resuming interrupted analysis");
        let mut partial: HashMap<String, AnnotatedGame> = snapshot
            .games
            .into_iter()
            .map(|game| (game.id().to_string(), game))
            .collect();
        for game in &mut games {
            if let Some(annotated) = partial.remove(game.id()) {
                *game = annotated;
            }
        }
    }

    match annotate_games(&mut games, factory, options, workers) {
        Ok(summary) => {
            info!(
                player,
                games = summary.games,
                evaluated = summary.evaluated,
                skipped = summary.skipped,
                "Annotation finished"
            );
            storage.save_games(player, &key, &games, true)?;
            Ok(games)
        }
        Err(e) => {
            if let Err(save_error) = storage.save_games(player, &key, &games, false) {
                error!(player, error = %save_error, "Failed to save partial analysis");
            }
            Err(e)
        }
    }
}

/// Reads a stored snapshot; `None` selects the parsed games.
pub fn load_snapshot(
    storage: &Storage,
    player: &str,
    think_time: Option<Duration>,
) -> Result<Vec<AnnotatedGame>, PipelineError> {
    let key = analysis_key(think_time);
    let snapshot = storage
        .load_games(player, &key)?
        .ok_or_else(|| PipelineError::MissingSnapshot {
            player: player.to_string(),
            analysis: key.clone(),
        })?;
    if !snapshot.complete {
        warn!(player, analysis = %key, "Snapshot is incomplete");
    }
    Ok(snapshot.games)
}

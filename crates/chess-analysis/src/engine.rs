//! Analysis port and the UCI engine process behind it.

use chess_core::{BoardState, Color, Score};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Maximum number of lines to read before giving up on a UCI response.
pub const MAX_UCI_LINES: usize = 1000;

/// Deadline for handshakes (`uciok`, `readyok`).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time granted on top of the think time before a search counts as hung.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Deadline for the `bestmove` that ends a search cut short with `stop`.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that can occur when working with chess engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Failed to spawn the engine process.
    #[error("Failed to spawn engine: {0}")]
    SpawnError(#[from] std::io::Error),
    /// Engine executable was not found at the specified path.
    #[error("Engine not found at path: {0}")]
    NotFound(String),
    /// Engine failed to initialize properly (UCI handshake failed).
    #[error("Engine initialization failed")]
    InitFailed,
    /// Engine returned an invalid or unexpected response.
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
    /// No answer within the deadline.
    #[error("Engine did not answer within {0:?}")]
    Timeout(Duration),
    /// The engine process closed its pipes.
    #[error("Engine closed unexpectedly")]
    Closed,
}

/// Source of position evaluations.
///
/// Methods take `&mut self`, so one instance never has more than one request
/// in flight.
pub trait AnalysisPort {
    /// Evaluates a position within `think_time`, from White's point of view.
    fn evaluate(&mut self, board: &BoardState, think_time: Duration) -> Result<Score, EngineError>;

    /// Resets per-game state before positions of a new game arrive.
    fn new_game(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

impl<P: AnalysisPort + ?Sized> AnalysisPort for Box<P> {
    fn evaluate(&mut self, board: &BoardState, think_time: Duration) -> Result<Score, EngineError> {
        (**self).evaluate(board, think_time)
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        (**self).new_game()
    }
}

/// Wrapper for UCI-compatible analysis engines like Stockfish.
///
/// A background thread forwards the engine's stdout line by line, so every
/// read can be bounded by a deadline.
pub struct AnalysisEngine {
    process: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    name: String,
    grace: Duration,
    /// Set once the engine's output can no longer be matched to a request.
    desynced: bool,
}

impl AnalysisEngine {
    /// Spawns the engine and performs the UCI handshake.
    ///
    /// # Errors
    ///
    /// - `EngineError::NotFound` if the executable does not exist
    /// - `EngineError::SpawnError` if the process fails to start
    /// - `EngineError::InitFailed` or `EngineError::Timeout` if the handshake fails
    pub fn new(engine_path: &str) -> Result<Self, EngineError> {
        Self::with_grace(engine_path, DEFAULT_GRACE)
    }

    /// Like [`AnalysisEngine::new`] with a custom search grace period.
    pub fn with_grace(engine_path: &str, grace: Duration) -> Result<Self, EngineError> {
        let mut process = Command::new(engine_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EngineError::NotFound(engine_path.to_string()),
                _ => EngineError::SpawnError(e),
            })?;

        let stdin = process.stdin.take().ok_or(EngineError::InitFailed)?;
        let stdout = process.stdout.take().ok_or(EngineError::InitFailed)?;

        let (tx, lines) = mpsc::channel();
        thread::Builder::new()
            .name("uci-reader".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line.trim().to_string()).is_err() {
                        break;
                    }
                }
            })?;

        let mut engine = Self {
            process,
            stdin,
            lines,
            name: String::new(),
            grace,
            desynced: false,
        };
        engine.init_uci()?;
        debug!(engine = %engine.name, path = engine_path, "Engine ready");
        Ok(engine)
    }

    fn init_uci(&mut self) -> Result<(), EngineError> {
        self.send_command("uci")?;

        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        let mut name = String::new();
        let mut lines_read = 0;
        loop {
            if lines_read > MAX_UCI_LINES {
                return Err(EngineError::InitFailed);
            }
            lines_read += 1;
            let line = self.read_line(deadline)?;
            if let Some(id) = line.strip_prefix("id name ") {
                name = id.to_string();
            } else if line == "uciok" {
                break;
            }
        }

        self.name = if name.is_empty() {
            "Unknown Engine".to_string()
        } else {
            name
        };

        self.wait_ready()
    }

    /// Returns the engine's name as reported via UCI protocol.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends `setoption name <name> value <value>` and waits until the engine is ready.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        if self.desynced {
            return Err(EngineError::Closed);
        }
        self.send_command(&format!("setoption name {} value {}", name, value))?;
        self.wait_ready()
    }

    fn wait_ready(&mut self) -> Result<(), EngineError> {
        self.send_command("isready")?;
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        let mut lines_read = 0;
        loop {
            if lines_read > MAX_UCI_LINES {
                return Err(EngineError::InitFailed);
            }
            lines_read += 1;
            if self.read_line(deadline)? == "readyok" {
                return Ok(());
            }
        }
    }

    /// Searches the position for `think_time` and returns the last reported
    /// exact score, relative to the side to move.
    ///
    /// Bounded by the deadline only, never by a line count.
    fn search(&mut self, board: &BoardState, think_time: Duration) -> Result<Score, EngineError> {
        if self.desynced {
            return Err(EngineError::Closed);
        }
        self.drain_pending();
        self.send_command(&position_command(board))?;
        self.send_command(&format!("go movetime {}", think_time.as_millis().max(1)))?;

        let deadline = Instant::now() + think_time + self.grace;
        let mut score = Score::Unknown;
        loop {
            let line = match self.read_line(deadline) {
                Ok(line) => line,
                Err(EngineError::Timeout(waited)) => {
                    warn!(engine = %self.name, "Search timed out, sending stop");
                    self.abort_search();
                    return Err(EngineError::Timeout(waited));
                }
                Err(e) => return Err(e),
            };

            if line.starts_with("info ") {
                if let Some(parsed) = Self::parse_info_score(&line) {
                    score = parsed;
                }
            } else if line.starts_with("bestmove") {
                return Ok(score);
            }
        }
    }

    /// Stops a running search and consumes its output up to `bestmove`.
    ///
    /// If the `bestmove` never arrives, later output cannot be told apart from
    /// the next search's, and the engine refuses further requests.
    fn abort_search(&mut self) {
        if self.send_command("stop").is_err() {
            self.desynced = true;
            return;
        }
        let deadline = Instant::now() + STOP_TIMEOUT;
        loop {
            match self.read_line(deadline) {
                Ok(line) if line.starts_with("bestmove") => return,
                Ok(line) => trace!(engine = %self.name, line = %line, "discarding aborted search output"),
                Err(_) => {
                    warn!(engine = %self.name, "No bestmove after stop, engine unusable");
                    self.desynced = true;
                    return;
                }
            }
        }
    }

    /// Extracts the exact score of a UCI info line.
    ///
    /// Format: "info depth X ... score cp Y ..." or "info depth X ... score mate Y ...".
    /// Lines without a depth, and lines whose score is only a bound, yield `None`.
    fn parse_info_score(line: &str) -> Option<Score> {
        let mut parts = line.split_whitespace();

        let mut depth: Option<u32> = None;
        let mut cp: Option<i32> = None;
        let mut mate: Option<i32> = None;

        while let Some(token) = parts.next() {
            match token {
                "depth" => depth = parts.next().and_then(|d| d.parse().ok()),
                "score" => match parts.next() {
                    Some("cp") => cp = parts.next().and_then(|v| v.parse().ok()),
                    Some("mate") => mate = parts.next().and_then(|v| v.parse().ok()),
                    _ => {}
                },
                "lowerbound" | "upperbound" => return None,
                "pv" => break,
                _ => {}
            }
        }

        depth?;
        Score::from_uci(cp, mate)
    }

    /// Discards output left over from an earlier, abandoned search.
    fn drain_pending(&mut self) {
        while let Ok(line) = self.lines.try_recv() {
            trace!(engine = %self.name, line = %line, "discarding stale output");
        }
    }

    fn send_command(&mut self, command: &str) -> Result<(), EngineError> {
        trace!(command, "uci >");
        writeln!(self.stdin, "{}", command)
            .and_then(|()| self.stdin.flush())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::BrokenPipe => EngineError::Closed,
                _ => EngineError::SpawnError(e),
            })
    }

    fn read_line(&mut self, deadline: Instant) -> Result<String, EngineError> {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.lines.recv_timeout(wait) {
            Ok(line) => {
                trace!(line = %line, "uci <");
                Ok(line)
            }
            Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout(wait)),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::Closed),
        }
    }
}

impl AnalysisPort for AnalysisEngine {
    fn evaluate(&mut self, board: &BoardState, think_time: Duration) -> Result<Score, EngineError> {
        let score = self.search(board, think_time)?;
        Ok(score.pov(board.side_to_move(), Color::White))
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        if self.desynced {
            return Err(EngineError::Closed);
        }
        self.send_command("ucinewgame")?;
        self.wait_ready()
    }
}

impl Drop for AnalysisEngine {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "quit").and_then(|()| self.stdin.flush());
        for _ in 0..50 {
            if let Ok(Some(_)) = self.process.try_wait() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Builds the UCI `position` command for a board.
pub fn position_command(board: &BoardState) -> String {
    let mut command = match board.start_fen() {
        Some(fen) => format!("position fen {}", fen),
        None => "position startpos".to_string(),
    };
    if !board.moves().is_empty() {
        command.push_str(" moves ");
        command.push_str(&board.moves().join(" "));
    }
    command
}

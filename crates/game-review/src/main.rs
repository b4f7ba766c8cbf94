use anyhow::{bail, Context};
use chess_analysis::AnnotateOptions;
use clap::{Parser, Subcommand};
use game_review::config::ReviewConfig;
use game_review::filter::GameFilter;
use game_review::pgn::write_pgn;
use game_review::pipeline::{ingest, load_or_annotate, load_snapshot, start_engine};
use game_review::report::Report;
use game_review::source::NdjsonSource;
use game_review::storage::Storage;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "game-review")]
#[command(about = "Annotate a player's games with engine evaluations and find the blunders")]
struct Cli {
    /// Configuration file (defaults to review.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read exported games and store them as parsed games
    Ingest {
        /// Player id
        #[arg(short, long)]
        player: String,
        /// Glob of NDJSON export files (defaults to <data_dir>/games/*.ndjson)
        #[arg(short, long)]
        input: Option<String>,
        /// Read the input again even if records are cached
        #[arg(long)]
        refresh: bool,
    },
    /// Attach engine evaluations to every stored game
    Annotate {
        #[arg(short, long)]
        player: String,
        /// Engine think time per position
        #[arg(long)]
        think_time_ms: Option<u64>,
        /// Engine instances run in parallel
        #[arg(short, long)]
        workers: Option<usize>,
        /// Re-evaluate positions that already carry an evaluation
        #[arg(long)]
        force: bool,
    },
    /// Report the first bad move and per-move losses of each game
    Report {
        #[arg(short, long)]
        player: String,
        #[arg(long)]
        think_time_ms: Option<u64>,
        /// Lower edge of the neutral band, in centipawns
        #[arg(long, allow_hyphen_values = true)]
        min: Option<f64>,
        /// Upper edge of the neutral band, in centipawns
        #[arg(long, allow_hyphen_values = true)]
        max: Option<f64>,
        /// Also write the full report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Write annotated games as PGN
    Export {
        #[arg(short, long)]
        player: String,
        #[arg(long)]
        think_time_ms: Option<u64>,
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn open_storage(config: &ReviewConfig) -> anyhow::Result<Storage> {
    let path = config.database_path();
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    Storage::open(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn think_time(config: &ReviewConfig, override_ms: Option<u64>) -> Duration {
    override_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.engine.think_time())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ReviewConfig::load_from(path),
        None => ReviewConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_logging(config.log_file.as_deref())?;
    run(cli.command, &config)
}

fn run(command: Commands, config: &ReviewConfig) -> anyhow::Result<()> {
    let storage = open_storage(config)?;

    match command {
        Commands::Ingest {
            player,
            input,
            refresh,
        } => {
            let pattern = input.unwrap_or_else(|| {
                config
                    .data_dir
                    .join("games")
                    .join("*.ndjson")
                    .to_string_lossy()
                    .into_owned()
            });
            let mut source = NdjsonSource::new(pattern);
            let filter = GameFilter::new(config.filter.clone());
            let games = ingest(&storage, &mut source, &player, &filter, refresh)
                .with_context(|| format!("Failed to ingest games of {}", player))?;
            println!("Stored {} games for {}", games.len(), player);
        }
        Commands::Annotate {
            player,
            think_time_ms,
            workers,
            force,
        } => {
            let options = AnnotateOptions {
                think_time: think_time(config, think_time_ms),
                force,
            };
            let workers = workers.unwrap_or(config.engine.workers);
            if workers == 0 {
                bail!("--workers must be at least 1");
            }
            info!(%player, workers, think_time_ms = options.think_time.as_millis() as u64, "Annotating");

            let games = load_or_annotate(
                &storage,
                &player,
                &options,
                || start_engine(&config.engine),
                workers,
            )
            .with_context(|| format!("Failed to annotate games of {}", player))?;
            println!("Annotated {} games for {}", games.len(), player);
        }
        Commands::Report {
            player,
            think_time_ms,
            min,
            max,
            json,
        } => {
            let mut band = config.blunder.band();
            band.min_acceptable = min.unwrap_or(band.min_acceptable);
            band.max_acceptable = max.unwrap_or(band.max_acceptable);
            if band.min_acceptable.is_nan()
                || band.max_acceptable.is_nan()
                || band.min_acceptable >= band.max_acceptable
            {
                bail!("--min must be below --max");
            }

            let games = load_snapshot(&storage, &player, Some(think_time(config, think_time_ms)))
                .context("No annotated games; run annotate first")?;
            let report = Report::build(&games, &player, band);
            println!("{}", report.summary);

            if let Some(path) = json {
                report
                    .write_json(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Report written to {}", path.display());
            }
        }
        Commands::Export {
            player,
            think_time_ms,
            out,
        } => {
            let games = load_snapshot(&storage, &player, Some(think_time(config, think_time_ms)))
                .context("No annotated games; run annotate first")?;
            write_pgn(&out, &games).with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Exported {} games to {}", games.len(), out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_ingest() {
        let cli = Cli::try_parse_from([
            "game-review",
            "ingest",
            "--player",
            "alice",
            "--input",
            "exports/*.ndjson",
        ])
        .unwrap();

        assert!(cli.config.is_none());
        match cli.command {
            Commands::Ingest {
                player,
                input,
                refresh,
            } => {
                assert_eq!(player, "alice");
                assert_eq!(input.as_deref(), Some("exports/*.ndjson"));
                assert!(!refresh);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_cli_parses_annotate_with_global_config() {
        let cli = Cli::try_parse_from([
            "game-review",
            "annotate",
            "-p",
            "alice",
            "--think-time-ms",
            "100",
            "-w",
            "4",
            "--force",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Annotate {
                think_time_ms,
                workers,
                force,
                ..
            } => {
                assert_eq!(think_time_ms, Some(100));
                assert_eq!(workers, Some(4));
                assert!(force);
            }
            _ => panic!("expected annotate"),
        }
    }

    #[test]
    fn test_cli_report_accepts_negative_band() {
        let cli = Cli::try_parse_from([
            "game-review", "report", "-p", "bob", "--min", "-150", "--max", "200",
        ])
        .unwrap();

        match cli.command {
            Commands::Report { min, max, json, .. } => {
                assert_eq!(min, Some(-150.0));
                assert_eq!(max, Some(200.0));
                assert!(json.is_none());
            }
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn test_cli_requires_player_and_out() {
        assert!(Cli::try_parse_from(["game-review", "report"]).is_err());
        assert!(Cli::try_parse_from(["game-review", "export", "-p", "alice"]).is_err());
        assert!(Cli::try_parse_from(["game-review"]).is_err());
    }

    #[test]
    fn test_think_time_falls_back_to_config() {
        let config = ReviewConfig::default();
        assert_eq!(think_time(&config, None), Duration::from_millis(250));
        assert_eq!(think_time(&config, Some(40)), Duration::from_millis(40));
    }

    #[test]
    fn test_cli_debug_assert() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

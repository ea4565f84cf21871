use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use pitchmatch::matcher::{MatchParams, MatchReport, MethodSelection};
use pitchmatch::plays::{PlayContext, PlayDescriptor, PlayQueryError};

#[derive(Parser)]
#[command(name = "pitchmatch", version, about = "Hum-to-song and football play similarity search")]
struct Cli {
    /// Path to the feature cache file
    #[arg(long, global = true)]
    cache_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Dsp,
    Ai,
    Both,
}

impl MethodArg {
    fn selection(self) -> MethodSelection {
        match self {
            MethodArg::Dsp => MethodSelection::Dsp,
            MethodArg::Ai => MethodSelection::Ai,
            MethodArg::Both => MethodSelection::Both,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the song directory and refresh the feature cache
    Refresh {
        /// Song directory (defaults to config songs_dir)
        dir: Option<PathBuf>,

        /// Extraction method to refresh
        #[arg(value_enum, short, long, default_value = "dsp")]
        method: MethodArg,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,
    },

    /// Match a hummed clip against the song library
    Match {
        /// Recorded hum/clip to match
        clip: PathBuf,

        /// Song directory (defaults to config songs_dir)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Extraction method(s) to query with
        #[arg(value_enum, short, long, default_value = "both")]
        method: MethodArg,

        /// Number of results per method
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Find plays most similar to a given play
    SimilarPlays {
        /// Play index in the corpus
        index: usize,

        /// Number of results
        #[arg(short = 'k', long, default_value = "5")]
        limit: usize,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Find goals most similar to the goal scored in a given play
    SimilarGoals {
        /// Play index in the corpus (must be a goal-scoring play)
        index: usize,

        /// Number of results
        #[arg(short = 'k', long, default_value = "5")]
        limit: usize,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List teams that scored, with goal totals
    Countries,

    /// List all goals scored by a team
    Goals {
        /// Team name (exact match)
        country: String,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show corpus statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = pitchmatch::config::AppConfig::load();

    // Resolve cache path: CLI > config > XDG default
    let cache_path = cli
        .cache_path
        .or(config.cache_path.clone())
        .unwrap_or_else(pitchmatch::config::default_cache_path);

    match cli.command {
        Commands::Refresh { dir, method, jobs } => {
            let dataset_dir = resolve_songs_dir(dir, &config)?;
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };

            for &m in method.selection().methods() {
                let library = pitchmatch::library::load_song_library(
                    &dataset_dir,
                    m,
                    &cache_path,
                    config.mtime_tolerance_secs,
                    config.target_sample_rate,
                    workers,
                )
                .context("Refresh failed")?;
                println!(
                    "Refresh complete ({}): {} songs — {} cached, {} extracted, {} skipped, {} removed",
                    m,
                    library.songs.len(),
                    library.stats.cached,
                    library.stats.extracted,
                    library.stats.skipped,
                    library.stats.removed
                );
            }
        }

        Commands::Match { clip, dir, method, limit, json } => {
            let dataset_dir = resolve_songs_dir(dir, &config)?;
            let params = MatchParams {
                dataset_dir: &dataset_dir,
                cache_path: &cache_path,
                tolerance_secs: config.mtime_tolerance_secs,
                target_rate: config.target_sample_rate,
                workers: config.resolve_workers(),
            };

            let report = pitchmatch::matcher::find_matches(
                &clip, &params, method.selection(), limit,
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_match_report(&report);
            }
        }

        Commands::SimilarPlays { index, limit, json } => {
            let ctx = load_play_context(&config)?;
            let result = match ctx.rank_similar_plays(index, limit) {
                Ok(result) => result,
                Err(e) => return print_query_error(e),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "Plays similar to play {} ({} plays in corpus):",
                    index, result.total_plays
                );
                println!();
                print_play_table(std::slice::from_ref(&result.query));
                println!();
                print_play_table(&result.similar);
            }
        }

        Commands::SimilarGoals { index, limit, json } => {
            let ctx = load_play_context(&config)?;
            let result = match ctx.rank_similar_goals(index, limit) {
                Ok(result) => result,
                Err(e) => return print_query_error(e),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "Goals similar to {} ({} goals in corpus):",
                    result.query.goal_id, result.total_goals
                );
                println!();
                print_goal_table(&result.similar);
            }
        }

        Commands::Countries => {
            let ctx = load_play_context(&config)?;
            let countries = ctx.goal_index().countries();

            if countries.is_empty() {
                println!("No goals in the play corpus.");
                return Ok(());
            }

            println!("{:<30} {:>6}", "Team", "Goals");
            println!("{}", "-".repeat(37));
            for c in &countries {
                println!("{:<30} {:>6}", c.name, c.total_goals);
            }
        }

        Commands::Goals { country, json } => {
            let ctx = load_play_context(&config)?;
            let goals = ctx.goal_index().goals_for_country(&country);

            if goals.is_empty() {
                println!("No goals recorded for \"{}\".", country);
                return Ok(());
            }

            if json {
                let descriptors: Vec<_> = goals
                    .iter()
                    .map(|g| ctx.goal_descriptor(g, None))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&descriptors)?);
            } else {
                println!("Goals by {}:", country);
                println!();
                let descriptors: Vec<_> = goals
                    .iter()
                    .map(|g| ctx.goal_descriptor(g, None))
                    .collect();
                print_goal_table(&descriptors);
            }
        }

        Commands::Stats => {
            let ctx = load_play_context(&config)?;
            let goal_index = ctx.goal_index();

            println!("Corpus Statistics");
            println!("=================");
            println!("Total plays:      {}", ctx.total_plays());
            println!("Total goals:      {}", goal_index.len());
            println!("Scoring teams:    {}", goal_index.countries().len());
            println!(
                "AI note model:    {}",
                if pitchmatch::audio::ai::is_available() {
                    "available"
                } else {
                    "not installed"
                }
            );
        }
    }

    Ok(())
}

/// Resolve the songs directory: CLI > config.
fn resolve_songs_dir(
    cli_dir: Option<PathBuf>,
    config: &pitchmatch::config::AppConfig,
) -> Result<PathBuf> {
    cli_dir.or(config.songs_dir.clone()).ok_or_else(|| {
        anyhow::anyhow!("No song directory. Pass --dir or set songs_dir in config.")
    })
}

/// Load the play corpus using configured or default paths.
fn load_play_context(config: &pitchmatch::config::AppConfig) -> Result<PlayContext> {
    let plays_path = config
        .plays_path
        .clone()
        .unwrap_or_else(pitchmatch::config::default_plays_path);
    let latents_path = config
        .latents_path
        .clone()
        .unwrap_or_else(pitchmatch::config::default_latents_path);
    PlayContext::load(&plays_path, &latents_path).context("Failed to load play corpus")
}

/// A bad play index is a user mistake, not a crash.
fn print_query_error(e: PlayQueryError) -> Result<()> {
    println!("{}", e);
    Ok(())
}

fn print_match_report(report: &MatchReport) {
    for outcome in &report.outcomes {
        println!("Method: {}", outcome.method);

        if let Some(error) = &outcome.error {
            println!("  {}", error);
            if outcome.matches.is_empty() {
                println!();
                continue;
            }
        }

        println!(
            "{:<30} {:<20} {:>10}",
            "Title", "Artist", "Confidence"
        );
        println!("{}", "-".repeat(62));
        for m in &outcome.matches {
            let title = truncate(&m.title, 30);
            let artist = truncate(&m.artist, 20);
            println!("{:<30} {:<20} {:>10.4}", title, artist, m.confidence);
        }
        println!();
    }

    if !report.ai_available {
        println!("(AI note detection not installed: pip install basic-pitch)");
    }
}

fn print_play_table(plays: &[PlayDescriptor]) {
    println!("{:<6} {:>6}  {}", "Play", "Sim", "Description");
    println!("{}", "-".repeat(95));

    for p in plays {
        let sim = match p.similarity {
            Some(s) => format!("{:.4}", s),
            None => "-".to_string(),
        };
        println!("{:<6} {:>6}  {}", p.index, sim, p.description);
    }
}

fn print_goal_table(goals: &[pitchmatch::plays::goals::GoalDescriptor]) {
    println!(
        "{:<24} {:<20} {:<20} {:>4} {:>5} {:>6}",
        "Goal", "Team", "Opponent", "Min", "Num", "Sim"
    );
    println!("{}", "-".repeat(84));

    for g in goals {
        let sim = match g.similarity {
            Some(s) => format!("{:.4}", s),
            None => "-".to_string(),
        };
        println!(
            "{:<24} {:<20} {:<20} {:>4} {:>3}/{:<1} {:>6}",
            truncate(&g.goal_id, 24),
            truncate(&g.team, 20),
            truncate(&g.opponent, 20),
            g.minute,
            g.goal_num,
            g.total_goals_in_match,
            sim,
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}

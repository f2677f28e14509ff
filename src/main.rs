//! ACE rating CLI
//!
//! Ingests FRC season data from the read API, rates every team and stores
//! the results in SQLite.

use ace::{Config, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ace")]
#[command(about = "FRC team ratings (RAW / confidence / ACE)", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// Ingest and rate a season
    Sync {
        /// Season year
        year: u16,
        /// Override worker pool size
        #[arg(long)]
        workers: Option<usize>,
        /// Cache directory for API responses
        #[arg(long)]
        cache: Option<String>,
        /// Use only cached responses (no network requests)
        #[arg(long)]
        offline: bool,
        /// Include offseason and preseason events
        #[arg(long)]
        include_offseason: bool,
    },
    /// Rebuild season ratings from stored event ratings
    Recompute {
        /// Season year
        year: u16,
        /// Only this team (default: every rated team)
        #[arg(long)]
        team: Option<u32>,
    },
    /// Show database status
    Status,
    /// Show a team's ratings for a season
    Show {
        /// Team number
        team: u32,
        /// Season year
        year: u16,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Season leaderboard by ACE
    Top {
        /// Season year
        year: u16,
        /// Number of teams to list
        #[arg(long, default_value = "25")]
        limit: usize,
    },
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Sync {
            year,
            workers,
            cache,
            offline,
            include_offseason,
        } => commands::sync(&config, year, workers, cache, offline, include_offseason),
        Commands::Recompute { year, team } => commands::recompute(&config, year, team),
        Commands::Status => commands::status(&config),
        Commands::Show { team, year, format } => commands::show(&config, team, year, format),
        Commands::Top { year, limit } => commands::top(&config, year, limit),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use ace::data::api::tba::TbaClient;
    use ace::data::{Database, RatingSink};
    use ace::ingest::{self, Pipeline};
    use ace::rating::EventRating;
    use ace::{AceError, TeamId};

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        println!("Created data/ directory");

        println!("\nNext steps:");
        println!(
            "  1. Add API keys to {} (or set {})",
            config_path,
            ace::API_KEYS_ENV
        );
        println!("  2. Run 'ace sync <year>' to ingest and rate a season");
        println!("  3. Run 'ace show <team> <year>' to inspect a team");

        Ok(())
    }

    pub fn sync(
        config: &Config,
        year: u16,
        workers: Option<usize>,
        cache: Option<String>,
        offline: bool,
        include_offseason: bool,
    ) -> Result<()> {
        let mut config = config.clone();
        if let Some(w) = workers {
            config.ingest.workers = w;
        }
        if let Some(dir) = cache {
            println!("Using cache directory: {}", dir);
            config.api.cache_dir = Some(dir);
        }
        if offline {
            println!("Offline mode: using cached responses only");
            config.api.offline = true;
        }
        config.ingest.include_offseason |= include_offseason;

        let db = Database::open(&config.data.database_path)?;
        let client = TbaClient::from_config(&config.api, config.api_keys())?;
        let pipeline = Pipeline::from_config(client, &config);

        println!("Syncing {} with {} workers...", year, config.ingest.workers);
        let summary = pipeline.run_season(year, &db)?;
        println!("{}", summary);

        Ok(())
    }

    pub fn recompute(config: &Config, year: u16, team: Option<u32>) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let teams = match team {
            Some(number) => vec![TeamId(number)],
            None => db.rated_teams(year)?,
        };

        let mut updated = 0;
        for team in &teams {
            let rating = ingest::recompute_season(&config.engine, *team, year, &db)?;
            if rating.total_events > 0 {
                updated += 1;
            }
        }
        println!(
            "Recomputed {} season ratings for {} ({} teams checked)",
            updated,
            year,
            teams.len()
        );

        Ok(())
    }

    pub fn status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:           {}", config.data.database_path);
        println!("  Teams:          {}", stats.team_count);
        println!("  Events:         {}", stats.event_count);
        println!("  Matches:        {}", stats.match_count);
        println!("  Event ratings:  {}", stats.event_rating_count);
        println!("  Season ratings: {}", stats.season_rating_count);
        if let Some(year) = stats.latest_year {
            println!("  Latest season:  {}", year);
        }

        Ok(())
    }

    pub fn show(config: &Config, team: u32, year: u16, format: OutputFormat) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let team = TeamId(team);
        let season = db.season_rating(team, year)?;
        let events = db.event_ratings(team, year)?;

        if season.is_none() && events.is_empty() {
            println!("No ratings for {} in {}", team, year);
            return Ok(());
        }

        match format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "season": season,
                    "events": events,
                });
                let text = serde_json::to_string_pretty(&json).map_err(AceError::from)?;
                println!("{}", text);
            }
            OutputFormat::Table => {
                println!("{} - {}", team, year);
                println!("───────────────────────────────");
                if let Some(s) = &season {
                    let r = &s.rating;
                    println!("  ACE:         {:.2}", r.ace);
                    println!(
                        "  RAW:         {:.2} (auto {:.2}, teleop {:.2}, endgame {:.2})",
                        r.overall, r.auto, r.teleop, r.endgame
                    );
                    println!("  Confidence:  {:.3}", r.confidence);
                    println!(
                        "  Record:      {}-{}-{} over {} events",
                        s.wins, s.losses, s.ties, s.total_events
                    );
                }
                if !events.is_empty() {
                    println!();
                    println!(
                        "  {:<14} {:>8} {:>8} {:>6} {:>8}",
                        "Event", "ACE", "RAW", "Conf", "W-L-T"
                    );
                    for e in &events {
                        print_event_row(e);
                    }
                }
            }
        }

        Ok(())
    }

    fn print_event_row(e: &EventRating) {
        println!(
            "  {:<14} {:>8.2} {:>8.2} {:>6.3} {:>8}",
            e.event_key,
            e.rating.ace,
            e.rating.overall,
            e.rating.confidence,
            format!("{}-{}-{}", e.wins, e.losses, e.ties)
        );
    }

    pub fn top(config: &Config, year: u16, limit: usize) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let ratings = db.season_leaderboard(year, limit)?;
        if ratings.is_empty() {
            println!(
                "No season ratings for {}. Run 'ace sync {}' first.",
                year, year
            );
            return Ok(());
        }

        println!("{:>4}  {:>6} {:>8} {:>8} {:>6}", "#", "Team", "ACE", "RAW", "Conf");
        for (rank, s) in ratings.iter().enumerate() {
            println!(
                "{:>4}  {:>6} {:>8.2} {:>8.2} {:>6.3}",
                rank + 1,
                s.team.0,
                s.rating.ace,
                s.rating.overall,
                s.rating.confidence
            );
        }

        Ok(())
    }
}

//! FRC team rating engine
//!
//! Turns raw match results into per-team RAW / confidence / ACE ratings,
//! aggregated per event and then per season, and feeds them from a batch
//! ingestion pipeline over a read-only match-data API.

pub mod data;
pub mod ingest;
pub mod rating;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::rating::EngineConfig;

/// FRC team number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub u32);

impl TeamId {
    /// Parse an API team key such as `frc254` (a bare number is accepted too)
    pub fn from_key(key: &str) -> Option<Self> {
        let digits = key.trim().strip_prefix("frc").unwrap_or(key.trim());
        digits.parse().ok().map(TeamId)
    }

    /// API team key (`frc254`)
    pub fn key(&self) -> String {
        format!("frc{}", self.0)
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team {}", self.0)
    }
}

/// Competition level of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CompLevel {
    Qualification,
    EighthFinal,
    QuarterFinal,
    SemiFinal,
    Final,
}

impl CompLevel {
    pub fn code(&self) -> &'static str {
        match self {
            CompLevel::Qualification => "qm",
            CompLevel::EighthFinal => "ef",
            CompLevel::QuarterFinal => "qf",
            CompLevel::SemiFinal => "sf",
            CompLevel::Final => "f",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "qm" => Some(CompLevel::Qualification),
            "ef" => Some(CompLevel::EighthFinal),
            "qf" => Some(CompLevel::QuarterFinal),
            "sf" => Some(CompLevel::SemiFinal),
            "f" => Some(CompLevel::Final),
            _ => None,
        }
    }

    /// Playoff (elimination) rounds are everything after qualifications
    pub fn is_playoff(&self) -> bool {
        !matches!(self, CompLevel::Qualification)
    }
}

impl fmt::Display for CompLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompLevel::Qualification => write!(f, "Qualification"),
            CompLevel::EighthFinal => write!(f, "Eighth-final"),
            CompLevel::QuarterFinal => write!(f, "Quarterfinal"),
            CompLevel::SemiFinal => write!(f, "Semifinal"),
            CompLevel::Final => write!(f, "Final"),
        }
    }
}

/// Alliance colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllianceColor {
    Red,
    Blue,
}

impl AllianceColor {
    pub fn code(&self) -> &'static str {
        match self {
            AllianceColor::Red => "red",
            AllianceColor::Blue => "blue",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "red" => Some(AllianceColor::Red),
            "blue" => Some(AllianceColor::Blue),
            _ => None,
        }
    }

    pub fn opponent(&self) -> Self {
        match self {
            AllianceColor::Red => AllianceColor::Blue,
            AllianceColor::Blue => AllianceColor::Red,
        }
    }
}

/// Outcome of a match from one team's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    Win,
    Loss,
    Tie,
}

/// A team's season reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub nickname: Option<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub state_prov: Option<String>,
    pub country: Option<String>,
    pub rookie_year: Option<u16>,
    pub website: Option<String>,
}

impl Team {
    /// Seasons of competition including `season` itself (a rookie has 1).
    /// Unknown rookie year counts as a rookie.
    pub fn years_of_experience(&self, season: u16) -> u32 {
        match self.rookie_year {
            Some(rookie) if rookie <= season => u32::from(season - rookie) + 1,
            _ => 1,
        }
    }
}

/// A competition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub key: String,
    pub name: String,
    pub year: u16,
    pub event_type: Option<i32>,
    pub week: Option<i32>,
    pub city: Option<String>,
    pub state_prov: Option<String>,
    pub country: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Event {
    /// Offseason (99) and preseason (100) events don't count towards ratings
    pub fn is_official(&self) -> bool {
        !matches!(self.event_type, Some(99) | Some(100))
    }
}

/// One alliance in a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alliance {
    pub teams: Vec<TeamId>,
    /// Final score; negative while the match is unplayed
    pub score: i32,
}

impl Alliance {
    pub fn position_of(&self, team: TeamId) -> Option<usize> {
        self.teams.iter().position(|t| *t == team)
    }
}

/// A single match record from the data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub key: String,
    pub event_key: String,
    pub comp_level: CompLevel,
    pub set_number: u32,
    pub match_number: u32,
    pub actual_time: Option<DateTime<Utc>>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub red: Alliance,
    pub blue: Alliance,
    pub winning_alliance: Option<AllianceColor>,
    /// Season-specific breakdown exactly as received: a JSON object keyed by
    /// alliance colour, or a string containing one
    pub score_breakdown: Option<serde_json::Value>,
    pub video: Option<String>,
}

impl Match {
    pub fn alliance(&self, color: AllianceColor) -> &Alliance {
        match color {
            AllianceColor::Red => &self.red,
            AllianceColor::Blue => &self.blue,
        }
    }

    /// Alliance colour and position within it for a team
    pub fn seat_of(&self, team: TeamId) -> Option<(AllianceColor, usize)> {
        if let Some(index) = self.red.position_of(team) {
            Some((AllianceColor::Red, index))
        } else {
            self.blue
                .position_of(team)
                .map(|index| (AllianceColor::Blue, index))
        }
    }

    pub fn alliance_of(&self, team: TeamId) -> Option<AllianceColor> {
        self.seat_of(team).map(|(color, _)| color)
    }

    /// Win / loss / tie for a team, or None if it didn't play
    pub fn result_for(&self, team: TeamId) -> Option<MatchResult> {
        let color = self.alliance_of(team)?;
        Some(match self.winning_alliance {
            Some(winner) if winner == color => MatchResult::Win,
            Some(_) => MatchResult::Loss,
            None => MatchResult::Tie,
        })
    }

    /// Both alliances have a posted score
    pub fn is_played(&self) -> bool {
        self.red.score >= 0 && self.blue.score >= 0
    }

    /// When the match was played, falling back to its schedule
    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        self.actual_time.or(self.scheduled_time)
    }

    /// Sort key for chronological processing. Matches without any timestamp
    /// sort after timed ones, then by level, set and match number.
    pub fn chronological_key(&self) -> (i64, CompLevel, u32, u32) {
        (
            self.played_at().map_or(i64::MAX, |t| t.timestamp()),
            self.comp_level,
            self.set_number,
            self.match_number,
        )
    }
}

/// Team standing at an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub team: TeamId,
    pub rank: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub dq: u32,
    pub matches_played: u32,
}

/// Award given at an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Award {
    pub name: String,
    pub award_type: i32,
    pub team: Option<TeamId>,
    pub awardee: Option<String>,
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum AceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("No cached response for {0} (offline mode)")]
    Offline(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed score breakdown for {match_key}: {message}")]
    Breakdown { match_key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("Task {context} failed: {message}")]
    Task { context: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AceError {
    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AceError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            AceError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AceError>;

/// Environment variable holding extra comma-separated API keys
pub const API_KEYS_ENV: &str = "ACE_API_KEYS";

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub ingest: IngestConfig,
    pub engine: EngineConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Credential pool; each request picks one at random
    pub keys: Vec<String>,
    pub timeout_secs: u64,
    pub cache_dir: Option<String>,
    pub offline: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://www.thebluealliance.com/api/v3".to_string(),
            keys: vec![],
            timeout_secs: 30,
            cache_dir: None,
            offline: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Absent means retry transient failures forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub workers: usize,
    /// How many failure reasons the batch summary lists
    pub failure_report_limit: usize,
    pub include_offseason: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            workers: 10,
            failure_report_limit: 10,
            include_offseason: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub database_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            database_path: "data/ace.db".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AceError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| AceError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AceError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Configured keys plus any from `ACE_API_KEYS`, deduplicated
    pub fn api_keys(&self) -> Vec<String> {
        let from_env = std::env::var(API_KEYS_ENV).unwrap_or_default();
        let mut keys: Vec<String> = Vec::new();
        for key in self
            .api
            .keys
            .iter()
            .map(String::as_str)
            .chain(from_env.split(','))
        {
            let key = key.trim();
            if !key.is_empty() && !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys
    }
}

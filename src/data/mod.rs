//! Data ingestion and storage
//!
//! Read API client, score-breakdown decoding and SQLite persistence.

pub mod api;
pub mod breakdown;
pub mod database;

pub use api::MatchSource;
pub use database::Database;

use crate::rating::{EventRating, SeasonRating};
use crate::{Award, Event, Match, Ranking, Result, Team, TeamId};

/// Where the pipeline writes its results. Every write is an upsert on the
/// record's natural key, so reruns never duplicate rows.
pub trait RatingSink {
    fn upsert_team(&self, team: &Team, year: u16) -> Result<()>;

    fn upsert_event(&self, event: &Event) -> Result<()>;

    fn upsert_rankings(&self, event_key: &str, rankings: &[Ranking]) -> Result<()>;

    fn upsert_awards(&self, event_key: &str, awards: &[Award]) -> Result<()>;

    fn upsert_matches(&self, matches: &[Match]) -> Result<usize>;

    fn upsert_event_rating(&self, rating: &EventRating) -> Result<()>;

    fn upsert_season_rating(&self, rating: &SeasonRating) -> Result<()>;

    /// Stored event ratings for a team's season, for explicit recomputation
    fn event_ratings(&self, team: TeamId, year: u16) -> Result<Vec<EventRating>>;
}

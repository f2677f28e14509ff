//! SQLite database management for ratings and the data behind them

use crate::data::RatingSink;
use crate::rating::{EventRating, Rating, SeasonRating};
use crate::{
    AceError, Alliance, AllianceColor, Award, CompLevel, Event, Match, Ranking, Result, Team,
    TeamId,
};
use chrono::{DateTime, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Rating columns shared by both rating tables, in `Rating` field order
const RATING_COLUMNS: &str = "auto, teleop, endgame, overall, confidence, raw_confidence, ace, \
     consistency, dominance, record_alignment, veteran_boost, event_boost";

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                team_number INTEGER NOT NULL,
                year INTEGER NOT NULL,
                nickname TEXT,
                name TEXT,
                city TEXT,
                state_prov TEXT,
                country TEXT,
                rookie_year INTEGER,
                website TEXT,
                PRIMARY KEY (team_number, year)
            );

            CREATE TABLE IF NOT EXISTS events (
                key TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                year INTEGER NOT NULL,
                event_type INTEGER,
                week INTEGER,
                city TEXT,
                state_prov TEXT,
                country TEXT,
                start_date TEXT,
                end_date TEXT
            );

            CREATE TABLE IF NOT EXISTS event_rankings (
                event_key TEXT NOT NULL,
                team_number INTEGER NOT NULL,
                rank INTEGER NOT NULL,
                wins INTEGER NOT NULL,
                losses INTEGER NOT NULL,
                ties INTEGER NOT NULL,
                dq INTEGER NOT NULL,
                matches_played INTEGER NOT NULL,
                PRIMARY KEY (event_key, team_number)
            );

            CREATE TABLE IF NOT EXISTS event_awards (
                event_key TEXT NOT NULL,
                award_type INTEGER NOT NULL,
                team_number INTEGER NOT NULL DEFAULT 0,
                awardee TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL,
                PRIMARY KEY (event_key, award_type, team_number, awardee)
            );

            CREATE TABLE IF NOT EXISTS matches (
                key TEXT PRIMARY KEY,
                event_key TEXT NOT NULL,
                comp_level TEXT NOT NULL,
                set_number INTEGER NOT NULL,
                match_number INTEGER NOT NULL,
                actual_time INTEGER,
                scheduled_time INTEGER,
                red_teams TEXT NOT NULL,
                blue_teams TEXT NOT NULL,
                red_score INTEGER NOT NULL,
                blue_score INTEGER NOT NULL,
                winning_alliance TEXT,
                score_breakdown TEXT,
                video TEXT
            );

            CREATE TABLE IF NOT EXISTS event_ratings (
                team_number INTEGER NOT NULL,
                event_key TEXT NOT NULL,
                year INTEGER NOT NULL,
                auto REAL NOT NULL,
                teleop REAL NOT NULL,
                endgame REAL NOT NULL,
                overall REAL NOT NULL,
                confidence REAL NOT NULL,
                raw_confidence REAL NOT NULL,
                ace REAL NOT NULL,
                consistency REAL NOT NULL,
                dominance REAL NOT NULL,
                record_alignment REAL NOT NULL,
                veteran_boost REAL NOT NULL,
                event_boost REAL NOT NULL,
                match_count INTEGER NOT NULL,
                wins INTEGER NOT NULL,
                losses INTEGER NOT NULL,
                ties INTEGER NOT NULL,
                PRIMARY KEY (team_number, event_key)
            );

            CREATE TABLE IF NOT EXISTS season_ratings (
                team_number INTEGER NOT NULL,
                year INTEGER NOT NULL,
                auto REAL NOT NULL,
                teleop REAL NOT NULL,
                endgame REAL NOT NULL,
                overall REAL NOT NULL,
                confidence REAL NOT NULL,
                raw_confidence REAL NOT NULL,
                ace REAL NOT NULL,
                consistency REAL NOT NULL,
                dominance REAL NOT NULL,
                record_alignment REAL NOT NULL,
                veteran_boost REAL NOT NULL,
                event_boost REAL NOT NULL,
                match_count INTEGER NOT NULL,
                wins INTEGER NOT NULL,
                losses INTEGER NOT NULL,
                ties INTEGER NOT NULL,
                total_events INTEGER NOT NULL,
                PRIMARY KEY (team_number, year)
            );

            CREATE INDEX IF NOT EXISTS idx_matches_event ON matches(event_key);
            CREATE INDEX IF NOT EXISTS idx_event_ratings_year ON event_ratings(year, team_number);
            CREATE INDEX IF NOT EXISTS idx_season_ratings_ace ON season_ratings(year, ace DESC);
            "#,
        )?;
        Ok(())
    }

    // ==================== Rating Reads ====================

    /// Season rating for a team, if computed
    pub fn season_rating(&self, team: TeamId, year: u16) -> Result<Option<SeasonRating>> {
        let sql = format!(
            "SELECT team_number, year, {}, match_count, wins, losses, ties, total_events
             FROM season_ratings WHERE team_number = ?1 AND year = ?2",
            RATING_COLUMNS
        );
        let rating = self
            .conn
            .query_row(&sql, params![team.0, year], Self::row_to_season_rating)
            .optional()?;
        Ok(rating)
    }

    /// Season ratings for a year, best ACE first
    pub fn season_leaderboard(&self, year: u16, limit: usize) -> Result<Vec<SeasonRating>> {
        let sql = format!(
            "SELECT team_number, year, {}, match_count, wins, losses, ties, total_events
             FROM season_ratings WHERE year = ?1 ORDER BY ace DESC LIMIT ?2",
            RATING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ratings = stmt
            .query_map(params![year, limit as i64], Self::row_to_season_rating)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ratings)
    }

    /// Teams with at least one stored event rating in a year
    pub fn rated_teams(&self, year: u16) -> Result<Vec<TeamId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT team_number FROM event_ratings WHERE year = ?1 ORDER BY team_number",
        )?;
        let teams = stmt
            .query_map(params![year], |row| Ok(TeamId(row.get(0)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    /// Matches stored for an event, in match-key order
    pub fn event_matches(&self, event_key: &str) -> Result<Vec<Match>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, event_key, comp_level, set_number, match_number, actual_time,
                    scheduled_time, red_teams, blue_teams, red_score, blue_score,
                    winning_alliance, score_breakdown, video
             FROM matches WHERE event_key = ?1 ORDER BY key",
        )?;
        let matches = stmt
            .query_map(params![event_key], Self::row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    fn row_to_rating(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Rating> {
        Ok(Rating {
            auto: row.get(offset)?,
            teleop: row.get(offset + 1)?,
            endgame: row.get(offset + 2)?,
            overall: row.get(offset + 3)?,
            confidence: row.get(offset + 4)?,
            raw_confidence: row.get(offset + 5)?,
            ace: row.get(offset + 6)?,
            consistency: row.get(offset + 7)?,
            dominance: row.get(offset + 8)?,
            record_alignment: row.get(offset + 9)?,
            veteran_boost: row.get(offset + 10)?,
            event_boost: row.get(offset + 11)?,
        })
    }

    fn row_to_event_rating(row: &rusqlite::Row) -> rusqlite::Result<EventRating> {
        Ok(EventRating {
            team: TeamId(row.get(0)?),
            event_key: row.get(1)?,
            year: row.get(2)?,
            rating: Self::row_to_rating(row, 3)?,
            match_count: row.get(15)?,
            wins: row.get(16)?,
            losses: row.get(17)?,
            ties: row.get(18)?,
        })
    }

    fn row_to_season_rating(row: &rusqlite::Row) -> rusqlite::Result<SeasonRating> {
        Ok(SeasonRating {
            team: TeamId(row.get(0)?),
            year: row.get(1)?,
            rating: Self::row_to_rating(row, 2)?,
            match_count: row.get(14)?,
            wins: row.get(15)?,
            losses: row.get(16)?,
            ties: row.get(17)?,
            total_events: row.get(18)?,
        })
    }

    fn row_to_match(row: &rusqlite::Row) -> rusqlite::Result<Match> {
        let level: String = row.get(2)?;
        let red_teams: String = row.get(7)?;
        let blue_teams: String = row.get(8)?;
        let winner: Option<String> = row.get(11)?;
        let breakdown: Option<String> = row.get(12)?;
        let timestamp = |secs: Option<i64>| secs.and_then(|s| DateTime::from_timestamp(s, 0));
        let teams = |json: &str| -> Vec<TeamId> {
            serde_json::from_str::<Vec<u32>>(json)
                .unwrap_or_default()
                .into_iter()
                .map(TeamId)
                .collect()
        };

        Ok(Match {
            key: row.get(0)?,
            event_key: row.get(1)?,
            comp_level: CompLevel::from_code(&level).unwrap_or(CompLevel::Qualification),
            set_number: row.get(3)?,
            match_number: row.get(4)?,
            actual_time: timestamp(row.get(5)?),
            scheduled_time: timestamp(row.get(6)?),
            red: Alliance {
                teams: teams(&red_teams),
                score: row.get(9)?,
            },
            blue: Alliance {
                teams: teams(&blue_teams),
                score: row.get(10)?,
            },
            winning_alliance: winner.as_deref().and_then(AllianceColor::from_code),
            score_breakdown: breakdown.map(serde_json::Value::String),
            video: row.get(13)?,
        })
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
            Ok(n as usize)
        };

        let latest_year: Option<u16> = self
            .conn
            .query_row("SELECT MAX(year) FROM season_ratings", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(DatabaseStats {
            team_count: count("teams")?,
            event_count: count("events")?,
            match_count: count("matches")?,
            event_rating_count: count("event_ratings")?,
            season_rating_count: count("season_ratings")?,
            latest_year,
        })
    }
}

impl RatingSink for Database {
    fn upsert_team(&self, team: &Team, year: u16) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO teams (team_number, year, nickname, name, city, state_prov, country,
                               rookie_year, website)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(team_number, year) DO UPDATE SET
                nickname = COALESCE(excluded.nickname, nickname),
                name = COALESCE(excluded.name, name),
                city = COALESCE(excluded.city, city),
                state_prov = COALESCE(excluded.state_prov, state_prov),
                country = COALESCE(excluded.country, country),
                rookie_year = COALESCE(excluded.rookie_year, rookie_year),
                website = COALESCE(excluded.website, website)
            "#,
            params![
                team.id.0,
                year,
                team.nickname,
                team.name,
                team.city,
                team.state_prov,
                team.country,
                team.rookie_year,
                team.website,
            ],
        )?;
        Ok(())
    }

    fn upsert_event(&self, event: &Event) -> Result<()> {
        let date = |d: Option<NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string());
        self.conn.execute(
            r#"
            INSERT INTO events (key, name, year, event_type, week, city, state_prov, country,
                                start_date, end_date)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(key) DO UPDATE SET
                name = excluded.name,
                year = excluded.year,
                event_type = excluded.event_type,
                week = excluded.week,
                city = excluded.city,
                state_prov = excluded.state_prov,
                country = excluded.country,
                start_date = excluded.start_date,
                end_date = excluded.end_date
            "#,
            params![
                event.key,
                event.name,
                event.year,
                event.event_type,
                event.week,
                event.city,
                event.state_prov,
                event.country,
                date(event.start_date),
                date(event.end_date),
            ],
        )?;
        Ok(())
    }

    fn upsert_rankings(&self, event_key: &str, rankings: &[Ranking]) -> Result<()> {
        for r in rankings {
            self.conn.execute(
                r#"
                INSERT INTO event_rankings (event_key, team_number, rank, wins, losses, ties,
                                            dq, matches_played)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(event_key, team_number) DO UPDATE SET
                    rank = excluded.rank,
                    wins = excluded.wins,
                    losses = excluded.losses,
                    ties = excluded.ties,
                    dq = excluded.dq,
                    matches_played = excluded.matches_played
                "#,
                params![
                    event_key,
                    r.team.0,
                    r.rank,
                    r.wins,
                    r.losses,
                    r.ties,
                    r.dq,
                    r.matches_played
                ],
            )?;
        }
        Ok(())
    }

    fn upsert_awards(&self, event_key: &str, awards: &[Award]) -> Result<()> {
        for a in awards {
            self.conn.execute(
                r#"
                INSERT INTO event_awards (event_key, award_type, team_number, awardee, name)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(event_key, award_type, team_number, awardee) DO UPDATE SET
                    name = excluded.name
                "#,
                params![
                    event_key,
                    a.award_type,
                    a.team.map_or(0, |t| t.0),
                    a.awardee.as_deref().unwrap_or(""),
                    a.name
                ],
            )?;
        }
        Ok(())
    }

    fn upsert_matches(&self, matches: &[Match]) -> Result<usize> {
        let team_list = |alliance: &Alliance| -> Result<String> {
            let numbers: Vec<u32> = alliance.teams.iter().map(|t| t.0).collect();
            serde_json::to_string(&numbers).map_err(AceError::from)
        };

        let mut count = 0;
        for m in matches {
            let breakdown = match &m.score_breakdown {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => None,
            };
            self.conn.execute(
                r#"
                INSERT INTO matches (key, event_key, comp_level, set_number, match_number,
                                     actual_time, scheduled_time, red_teams, blue_teams,
                                     red_score, blue_score, winning_alliance, score_breakdown,
                                     video)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ON CONFLICT(key) DO UPDATE SET
                    actual_time = excluded.actual_time,
                    scheduled_time = excluded.scheduled_time,
                    red_teams = excluded.red_teams,
                    blue_teams = excluded.blue_teams,
                    red_score = excluded.red_score,
                    blue_score = excluded.blue_score,
                    winning_alliance = excluded.winning_alliance,
                    score_breakdown = COALESCE(excluded.score_breakdown, score_breakdown),
                    video = COALESCE(excluded.video, video)
                "#,
                params![
                    m.key,
                    m.event_key,
                    m.comp_level.code(),
                    m.set_number,
                    m.match_number,
                    m.actual_time.map(|t| t.timestamp()),
                    m.scheduled_time.map(|t| t.timestamp()),
                    team_list(&m.red)?,
                    team_list(&m.blue)?,
                    m.red.score,
                    m.blue.score,
                    m.winning_alliance.map(|c| c.code()),
                    breakdown,
                    m.video,
                ],
            )?;
            count += 1;
        }
        Ok(count)
    }

    fn upsert_event_rating(&self, rating: &EventRating) -> Result<()> {
        let r = &rating.rating;
        let sql = format!(
            "INSERT INTO event_ratings (team_number, event_key, year, {},
                                        match_count, wins, losses, ties)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19)
             ON CONFLICT(team_number, event_key) DO UPDATE SET
                year = excluded.year,
                auto = excluded.auto, teleop = excluded.teleop, endgame = excluded.endgame,
                overall = excluded.overall, confidence = excluded.confidence,
                raw_confidence = excluded.raw_confidence, ace = excluded.ace,
                consistency = excluded.consistency, dominance = excluded.dominance,
                record_alignment = excluded.record_alignment,
                veteran_boost = excluded.veteran_boost, event_boost = excluded.event_boost,
                match_count = excluded.match_count, wins = excluded.wins,
                losses = excluded.losses, ties = excluded.ties",
            RATING_COLUMNS
        );
        self.conn.execute(
            &sql,
            params![
                rating.team.0,
                rating.event_key,
                rating.year,
                r.auto,
                r.teleop,
                r.endgame,
                r.overall,
                r.confidence,
                r.raw_confidence,
                r.ace,
                r.consistency,
                r.dominance,
                r.record_alignment,
                r.veteran_boost,
                r.event_boost,
                rating.match_count,
                rating.wins,
                rating.losses,
                rating.ties,
            ],
        )?;
        Ok(())
    }

    fn upsert_season_rating(&self, rating: &SeasonRating) -> Result<()> {
        let r = &rating.rating;
        let sql = format!(
            "INSERT INTO season_ratings (team_number, year, {},
                                         match_count, wins, losses, ties, total_events)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19)
             ON CONFLICT(team_number, year) DO UPDATE SET
                auto = excluded.auto, teleop = excluded.teleop, endgame = excluded.endgame,
                overall = excluded.overall, confidence = excluded.confidence,
                raw_confidence = excluded.raw_confidence, ace = excluded.ace,
                consistency = excluded.consistency, dominance = excluded.dominance,
                record_alignment = excluded.record_alignment,
                veteran_boost = excluded.veteran_boost, event_boost = excluded.event_boost,
                match_count = excluded.match_count, wins = excluded.wins,
                losses = excluded.losses, ties = excluded.ties,
                total_events = excluded.total_events",
            RATING_COLUMNS
        );
        self.conn.execute(
            &sql,
            params![
                rating.team.0,
                rating.year,
                r.auto,
                r.teleop,
                r.endgame,
                r.overall,
                r.confidence,
                r.raw_confidence,
                r.ace,
                r.consistency,
                r.dominance,
                r.record_alignment,
                r.veteran_boost,
                r.event_boost,
                rating.match_count,
                rating.wins,
                rating.losses,
                rating.ties,
                rating.total_events,
            ],
        )?;
        Ok(())
    }

    fn event_ratings(&self, team: TeamId, year: u16) -> Result<Vec<EventRating>> {
        let sql = format!(
            "SELECT team_number, event_key, year, {}, match_count, wins, losses, ties
             FROM event_ratings WHERE team_number = ?1 AND year = ?2 ORDER BY event_key",
            RATING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ratings = stmt
            .query_map(params![team.0, year], Self::row_to_event_rating)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ratings)
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub team_count: usize,
    pub event_count: usize,
    pub match_count: usize,
    pub event_rating_count: usize,
    pub season_rating_count: usize,
    pub latest_year: Option<u16>,
}

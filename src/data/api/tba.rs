//! The Blue Alliance v3 read API client
//!
//! Blocking client with a randomised credential pool and an optional
//! on-disk response cache for offline runs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{KeyPool, MatchSource};
use crate::{
    AceError, Alliance, AllianceColor, ApiConfig, Award, CompLevel, Event, Match, Ranking, Result,
    Team, TeamId,
};

const AUTH_HEADER: &str = "X-TBA-Auth-Key";

/// Client for thebluealliance.com
pub struct TbaClient {
    client: reqwest::blocking::Client,
    base_url: String,
    keys: KeyPool,
    /// Optional cache directory for raw JSON responses
    cache_dir: Option<PathBuf>,
    /// If true, only use cache (no network requests)
    offline_only: bool,
}

impl TbaClient {
    pub fn new(base_url: &str, keys: KeyPool, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("ace-ratings/0.1")
            .timeout(timeout)
            .build()?;

        Ok(TbaClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            keys,
            cache_dir: None,
            offline_only: false,
        })
    }

    /// Build from the `[api]` config section and a resolved key list
    pub fn from_config(config: &ApiConfig, keys: Vec<String>) -> Result<Self> {
        if keys.is_empty() && !config.offline {
            return Err(AceError::Config(format!(
                "No API keys configured (set [api].keys or {})",
                crate::API_KEYS_ENV
            )));
        }
        let mut client = Self::new(
            &config.base_url,
            KeyPool::new(keys),
            Duration::from_secs(config.timeout_secs),
        )?;
        if let Some(dir) = &config.cache_dir {
            client = client.with_cache(dir);
        }
        Ok(client.offline_only(config.offline))
    }

    /// Create client with a cache directory
    pub fn with_cache<P: AsRef<Path>>(mut self, cache_dir: P) -> Self {
        self.cache_dir = Some(cache_dir.as_ref().to_path_buf());
        self
    }

    /// Set offline-only mode (no network requests, cache must exist)
    pub fn offline_only(mut self, offline: bool) -> Self {
        self.offline_only = offline;
        self
    }

    fn cache_path(&self, path: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| {
            let filename = path.trim_start_matches('/').replace('/', "_") + ".json";
            dir.join(filename)
        })
    }

    fn load_from_cache(&self, path: &str) -> Option<String> {
        let file = self.cache_path(path)?;
        if file.exists() {
            log::debug!("Loading from cache: {}", file.display());
            std::fs::read_to_string(&file).ok()
        } else {
            None
        }
    }

    fn save_to_cache(&self, path: &str, body: &str) -> Result<()> {
        if let Some(file) = self.cache_path(path) {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&file, body)?;
            log::debug!("Saved to cache: {}", file.display());
        }
        Ok(())
    }

    /// GET `path` and decode the JSON body. Online requests always hit the
    /// network and refresh the cache; the cache is only read offline.
    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        if self.offline_only {
            let body = self
                .load_from_cache(path)
                .ok_or_else(|| AceError::Offline(path.to_string()))?;
            return Ok(serde_json::from_str(&body)?);
        }

        let url = format!("{}{}", self.base_url, path);
        log::debug!("Fetching {}", url);

        let mut request = self.client.get(&url);
        if let Some(key) = self.keys.pick() {
            request = request.header(AUTH_HEADER, key);
        }
        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(AceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text()?;
        let decoded = serde_json::from_str(&body)?;
        if let Err(e) = self.save_to_cache(path, &body) {
            log::warn!("Failed to cache {}: {}", path, e);
        }
        Ok(decoded)
    }
}

impl MatchSource for TbaClient {
    fn events(&self, year: u16) -> Result<Vec<Event>> {
        let raw: Vec<ApiEvent> = self.get_json(&format!("/events/{}", year))?;
        Ok(raw.into_iter().map(Event::from).collect())
    }

    fn event_teams(&self, event_key: &str) -> Result<Vec<Team>> {
        let raw: Vec<ApiTeam> = self.get_json(&format!("/event/{}/teams", event_key))?;
        Ok(raw.into_iter().filter_map(ApiTeam::into_team).collect())
    }

    fn event_rankings(&self, event_key: &str) -> Result<Vec<Ranking>> {
        let raw: Option<ApiRankings> =
            self.get_json(&format!("/event/{}/rankings", event_key))?;
        Ok(raw
            .and_then(|r| r.rankings)
            .unwrap_or_default()
            .into_iter()
            .filter_map(ApiRanking::into_ranking)
            .collect())
    }

    fn event_matches(&self, event_key: &str) -> Result<Vec<Match>> {
        let raw: Vec<ApiMatch> = self.get_json(&format!("/event/{}/matches", event_key))?;
        Ok(convert_matches(raw))
    }

    fn team_event_matches(&self, team: TeamId, event_key: &str) -> Result<Vec<Match>> {
        let raw: Vec<ApiMatch> =
            self.get_json(&format!("/team/{}/event/{}/matches", team.key(), event_key))?;
        Ok(convert_matches(raw))
    }

    fn event_awards(&self, event_key: &str) -> Result<Vec<Award>> {
        let raw: Vec<ApiAward> = self.get_json(&format!("/event/{}/awards", event_key))?;
        Ok(raw.into_iter().flat_map(ApiAward::into_awards).collect())
    }
}

fn convert_matches(raw: Vec<ApiMatch>) -> Vec<Match> {
    raw.into_iter()
        .filter_map(|m| {
            let key = m.key.clone();
            let converted = m.into_match();
            if converted.is_none() {
                log::warn!("Dropping match {} with unrecognised level or teams", key);
            }
            converted
        })
        .collect()
}

// ==================== Wire types ====================

#[derive(Debug, Deserialize)]
struct ApiEvent {
    key: String,
    name: Option<String>,
    year: u16,
    event_type: Option<i32>,
    week: Option<i32>,
    city: Option<String>,
    state_prov: Option<String>,
    country: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl From<ApiEvent> for Event {
    fn from(e: ApiEvent) -> Self {
        let date = |s: Option<String>| {
            s.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
        };
        Event {
            name: e.name.unwrap_or_else(|| e.key.clone()),
            key: e.key,
            year: e.year,
            event_type: e.event_type,
            week: e.week,
            city: e.city,
            state_prov: e.state_prov,
            country: e.country,
            start_date: date(e.start_date),
            end_date: date(e.end_date),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    key: String,
    nickname: Option<String>,
    name: Option<String>,
    city: Option<String>,
    state_prov: Option<String>,
    country: Option<String>,
    rookie_year: Option<u16>,
    website: Option<String>,
}

impl ApiTeam {
    fn into_team(self) -> Option<Team> {
        Some(Team {
            id: TeamId::from_key(&self.key)?,
            nickname: self.nickname,
            name: self.name,
            city: self.city,
            state_prov: self.state_prov,
            country: self.country,
            rookie_year: self.rookie_year,
            website: self.website,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiRankings {
    rankings: Option<Vec<ApiRanking>>,
}

#[derive(Debug, Deserialize)]
struct ApiRanking {
    team_key: String,
    rank: u32,
    record: Option<ApiRecord>,
    dq: Option<u32>,
    matches_played: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiRecord {
    wins: u32,
    losses: u32,
    ties: u32,
}

impl ApiRanking {
    fn into_ranking(self) -> Option<Ranking> {
        let record = self.record.unwrap_or_default();
        Some(Ranking {
            team: TeamId::from_key(&self.team_key)?,
            rank: self.rank,
            wins: record.wins,
            losses: record.losses,
            ties: record.ties,
            dq: self.dq.unwrap_or(0),
            matches_played: self.matches_played.unwrap_or(0),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiAward {
    name: String,
    award_type: i32,
    #[serde(default)]
    recipient_list: Vec<ApiRecipient>,
}

#[derive(Debug, Deserialize)]
struct ApiRecipient {
    team_key: Option<String>,
    awardee: Option<String>,
}

impl ApiAward {
    fn into_awards(self) -> Vec<Award> {
        if self.recipient_list.is_empty() {
            return vec![Award {
                name: self.name,
                award_type: self.award_type,
                team: None,
                awardee: None,
            }];
        }
        self.recipient_list
            .into_iter()
            .map(|r| Award {
                name: self.name.clone(),
                award_type: self.award_type,
                team: r.team_key.as_deref().and_then(TeamId::from_key),
                awardee: r.awardee,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ApiMatch {
    key: String,
    event_key: String,
    comp_level: String,
    set_number: u32,
    match_number: u32,
    alliances: ApiAlliances,
    winning_alliance: Option<String>,
    score_breakdown: Option<serde_json::Value>,
    time: Option<i64>,
    actual_time: Option<i64>,
    #[serde(default)]
    videos: Vec<ApiVideo>,
}

#[derive(Debug, Deserialize)]
struct ApiAlliances {
    red: ApiAlliance,
    blue: ApiAlliance,
}

#[derive(Debug, Deserialize)]
struct ApiAlliance {
    team_keys: Vec<String>,
    score: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ApiVideo {
    #[serde(rename = "type")]
    kind: String,
    key: String,
}

impl ApiAlliance {
    fn into_alliance(self) -> Option<Alliance> {
        let teams = self
            .team_keys
            .iter()
            .map(|k| TeamId::from_key(k))
            .collect::<Option<Vec<_>>>()?;
        Some(Alliance {
            teams,
            score: self.score.unwrap_or(-1),
        })
    }
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.filter(|s| *s > 0)
        .and_then(|s| DateTime::from_timestamp(s, 0))
}

impl ApiMatch {
    fn into_match(self) -> Option<Match> {
        let video = self
            .videos
            .iter()
            .find(|v| v.kind == "youtube")
            .map(|v| v.key.clone());
        Some(Match {
            key: self.key,
            event_key: self.event_key,
            comp_level: CompLevel::from_code(&self.comp_level)?,
            set_number: self.set_number,
            match_number: self.match_number,
            actual_time: timestamp(self.actual_time),
            scheduled_time: timestamp(self.time),
            red: self.alliances.red.into_alliance()?,
            blue: self.alliances.blue.into_alliance()?,
            winning_alliance: self
                .winning_alliance
                .as_deref()
                .and_then(AllianceColor::from_code),
            score_breakdown: self.score_breakdown.filter(|b| !b.is_null()),
            video,
        })
    }
}

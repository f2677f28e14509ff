//! Batch ingestion pipeline
//!
//! A season run has three stages separated by hard barriers:
//!
//! 1. fetch the season's events (a failure here fails the run)
//! 2. one task per event fetching teams, rankings, matches and awards
//! 3. one task per team rating it at each of its events and across the season
//!
//! Tasks run on a bounded rayon pool and send their results over a channel
//! to a single collector on the calling thread, which is the only place the
//! sink is touched. A failing task is recorded and the rest carry on.

pub mod summary;

pub use summary::{BatchSummary, TaskFailure};

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use rayon::ThreadPool;

use crate::data::api::{with_retry, CancelToken, RetryPolicy};
use crate::data::{MatchSource, RatingSink};
use crate::rating::{
    EngineConfig, EventAggregator, EventContext, EventRating, SeasonAggregator, SeasonRating,
    StrategyRegistry,
};
use crate::{AceError, Award, Config, Event, IngestConfig, Match, Ranking, Result, Team, TeamId};

/// Everything fetched for one event
#[derive(Debug)]
struct EventData {
    event: Event,
    teams: Vec<Team>,
    rankings: Vec<Ranking>,
    matches: Vec<Match>,
    awards: Vec<Award>,
}

/// A team and the season events it is registered at
#[derive(Debug, Clone)]
struct TeamEntry {
    team: Team,
    events: Vec<String>,
}

#[derive(Debug)]
struct TeamOutcome {
    event_ratings: Vec<EventRating>,
    season: SeasonRating,
}

/// Season ingestion over a [`MatchSource`]
pub struct Pipeline<S> {
    source: S,
    ingest: IngestConfig,
    retry: RetryPolicy,
    engine: EngineConfig,
    strategies: StrategyRegistry,
    cancel: CancelToken,
}

impl<S: MatchSource> Pipeline<S> {
    pub fn new(source: S) -> Self {
        Pipeline {
            source,
            ingest: IngestConfig::default(),
            retry: RetryPolicy::default(),
            engine: EngineConfig::default(),
            strategies: StrategyRegistry::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn from_config(source: S, config: &Config) -> Self {
        Self::new(source)
            .with_ingest(config.ingest.clone())
            .with_retry_policy(RetryPolicy::from(&config.retry))
            .with_engine(config.engine)
    }

    pub fn with_ingest(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops the run (and any retry loop) when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Ingest and rate a whole season
    pub fn run_season(&self, year: u16, sink: &dyn RatingSink) -> Result<BatchSummary> {
        let mut summary = BatchSummary::new(year, self.ingest.failure_report_limit);

        let events: Vec<Event> = self
            .fetch(|| self.source.events(year))?
            .into_iter()
            .filter(|e| {
                let keep = self.ingest.include_offseason || e.is_official();
                if !keep {
                    log::debug!("Skipping unofficial event {}", e.key);
                }
                keep
            })
            .collect();
        log::info!("Season {}: {} events to ingest", year, events.len());

        let pool = self.thread_pool()?;

        // Event stage
        let mut rosters: BTreeMap<TeamId, TeamEntry> = BTreeMap::new();
        let tasks = events
            .into_iter()
            .map(|e| (format!("event {}", e.key), e))
            .collect();
        fan_out(
            &pool,
            tasks,
            |event| self.fetch_event(event),
            |context, outcome| match outcome {
                Ok(data) => {
                    if let Err(e) = store_event(&data, year, sink) {
                        summary.record_failure(format!("{} (storing)", context), e);
                    }
                    for team in &data.teams {
                        rosters
                            .entry(team.id)
                            .or_insert_with(|| TeamEntry {
                                team: team.clone(),
                                events: Vec::new(),
                            })
                            .events
                            .push(data.event.key.clone());
                    }
                    summary.events_processed += 1;
                    log::debug!(
                        "Stored {}: {} teams, {} matches",
                        data.event.key,
                        data.teams.len(),
                        data.matches.len()
                    );
                }
                Err(e) => note_error(&mut summary, context, e),
            },
        );

        if self.cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }
        log::info!(
            "Season {}: {} events ingested, rating {} teams",
            year,
            summary.events_processed,
            rosters.len()
        );

        // Team stage
        let aggregator = EventAggregator::new(self.engine, self.strategies.lookup(year));
        let season = SeasonAggregator::new(self.engine.rescale);
        let tasks = rosters
            .into_values()
            .map(|entry| (entry.team.id.to_string(), entry))
            .collect();
        fan_out(
            &pool,
            tasks,
            |entry| self.rate_team(&entry, year, &aggregator, &season),
            |context, outcome| match outcome {
                Ok(outcome) => {
                    summary.teams_processed += 1;
                    if outcome.season.total_events == 0 {
                        log::debug!("{}: no usable matches", context);
                        summary.teams_skipped += 1;
                        return;
                    }
                    match store_team(&outcome, sink) {
                        Ok(()) => summary.teams_updated += 1,
                        Err(e) => summary.record_failure(format!("{} (storing)", context), e),
                    }
                }
                Err(e) => note_error(&mut summary, context, e),
            },
        );

        log::info!(
            "Season {}: {} teams updated, {} skipped, {} failed",
            year,
            summary.teams_updated,
            summary.teams_skipped,
            summary.failed()
        );
        Ok(summary)
    }

    /// Rebuild a team's season rating from its stored event ratings
    pub fn recompute_season(
        &self,
        team: TeamId,
        year: u16,
        sink: &dyn RatingSink,
    ) -> Result<SeasonRating> {
        recompute_season(&self.engine, team, year, sink)
    }

    fn fetch<T>(&self, operation: impl FnMut() -> Result<T>) -> Result<T> {
        with_retry(&self.retry, &self.cancel, operation)
    }

    fn thread_pool(&self) -> Result<ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.ingest.workers.max(1))
            .thread_name(|i| format!("ace-worker-{}", i))
            .build()
            .map_err(|e| AceError::Config(format!("Failed to start worker pool: {}", e)))
    }

    fn fetch_event(&self, event: Event) -> Result<EventData> {
        let key = event.key.as_str();
        let teams = self.fetch(|| self.source.event_teams(key))?;
        let rankings = self.fetch(|| self.source.event_rankings(key))?;
        let matches = self.fetch(|| self.source.event_matches(key))?;
        let awards = self.fetch(|| self.source.event_awards(key))?;
        Ok(EventData {
            event,
            teams,
            rankings,
            matches,
            awards,
        })
    }

    fn rate_team(
        &self,
        entry: &TeamEntry,
        year: u16,
        aggregator: &EventAggregator<'_>,
        season: &SeasonAggregator,
    ) -> Result<TeamOutcome> {
        let id = entry.team.id;
        let years_experience = entry.team.years_of_experience(year);

        let mut schedules = Vec::with_capacity(entry.events.len());
        for event_key in &entry.events {
            let matches = self.fetch(|| self.source.team_event_matches(id, event_key))?;
            schedules.push((event_key, matches));
        }

        // Registered-only events don't count towards the event boost
        let season_events = schedules
            .iter()
            .filter(|(_, matches)| matches.iter().any(|m| m.is_played() && m.seat_of(id).is_some()))
            .count();

        let event_ratings: Vec<EventRating> = schedules
            .iter()
            .map(|(event_key, matches)| {
                let ctx = EventContext {
                    event_key: event_key.to_string(),
                    year,
                    years_experience,
                    season_events,
                };
                aggregator.aggregate(matches, id, &ctx)
            })
            .collect();

        let season = season.aggregate(id, year, &event_ratings);
        Ok(TeamOutcome {
            event_ratings,
            season,
        })
    }
}

/// Rebuild a team's season rating from the event ratings already in `sink`
/// and write it back. Nothing is written when no event has signal.
pub fn recompute_season(
    engine: &EngineConfig,
    team: TeamId,
    year: u16,
    sink: &dyn RatingSink,
) -> Result<SeasonRating> {
    let events = sink.event_ratings(team, year)?;
    let rating = SeasonAggregator::new(engine.rescale).aggregate(team, year, &events);
    if rating.total_events > 0 {
        sink.upsert_season_rating(&rating)?;
    } else {
        log::info!("{} has no rated events in {}", team, year);
    }
    Ok(rating)
}

fn store_event(data: &EventData, year: u16, sink: &dyn RatingSink) -> Result<()> {
    sink.upsert_event(&data.event)?;
    for team in &data.teams {
        sink.upsert_team(team, year)?;
    }
    sink.upsert_rankings(&data.event.key, &data.rankings)?;
    sink.upsert_awards(&data.event.key, &data.awards)?;
    sink.upsert_matches(&data.matches)?;
    Ok(())
}

fn store_team(outcome: &TeamOutcome, sink: &dyn RatingSink) -> Result<()> {
    for rating in outcome.event_ratings.iter().filter(|r| r.match_count > 0) {
        sink.upsert_event_rating(rating)?;
    }
    sink.upsert_season_rating(&outcome.season)
}

fn note_error(summary: &mut BatchSummary, context: String, error: AceError) {
    match error {
        AceError::Cancelled => summary.cancelled = true,
        e => summary.record_failure(context, e),
    }
}

/// Run `work` over every item on `pool` and hand each outcome to `collect`
/// on the calling thread, in completion order. Panics become task errors.
fn fan_out<T, R, W, C>(pool: &ThreadPool, items: Vec<(String, T)>, work: W, mut collect: C)
where
    T: Send,
    R: Send,
    W: Fn(T) -> Result<R> + Sync,
    C: FnMut(String, Result<R>),
{
    let (tx, rx) = mpsc::channel::<(String, Result<R>)>();
    let work = &work;

    pool.in_place_scope(move |scope| {
        for (context, item) in items {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(item)))
                    .unwrap_or_else(|payload| {
                        Err(AceError::Task {
                            context: context.clone(),
                            message: panic_message(payload.as_ref()),
                        })
                    });
                // The collector only goes away once every sender is dropped
                let _ = tx.send((context, outcome));
            });
        }
        drop(tx);

        for (context, outcome) in rx {
            collect(context, outcome);
        }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Database;
    use crate::rating::strategy::GENERIC;
    use crate::{Alliance, AllianceColor, CompLevel};
    use chrono::DateTime;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const YEAR: u16 = 2030;

    #[derive(Default)]
    struct FakeSource {
        events: Vec<Event>,
        rosters: HashMap<String, Vec<Team>>,
        matches: HashMap<String, Vec<Match>>,
        /// Events whose roster lookup is a permanent 404
        missing: Vec<String>,
        /// Event whose match list fails twice with a 503 before succeeding
        flaky: Option<String>,
        flaky_calls: AtomicU32,
        /// Event whose awards lookup panics
        panicking: Option<String>,
        /// Event whose roster lookup cancels the run
        cancel_during: Option<(String, CancelToken)>,
        events_calls: AtomicU32,
    }

    impl MatchSource for FakeSource {
        fn events(&self, _year: u16) -> Result<Vec<Event>> {
            self.events_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.events.clone())
        }

        fn event_teams(&self, event_key: &str) -> Result<Vec<Team>> {
            if let Some((key, cancel)) = &self.cancel_during {
                if key == event_key {
                    cancel.cancel();
                }
            }
            if self.missing.iter().any(|k| k == event_key) {
                return Err(AceError::Status {
                    status: 404,
                    url: format!("/event/{}/teams", event_key),
                });
            }
            Ok(self.rosters.get(event_key).cloned().unwrap_or_default())
        }

        fn event_rankings(&self, _event_key: &str) -> Result<Vec<Ranking>> {
            Ok(Vec::new())
        }

        fn event_matches(&self, event_key: &str) -> Result<Vec<Match>> {
            if self.flaky.as_deref() == Some(event_key)
                && self.flaky_calls.fetch_add(1, Ordering::SeqCst) < 2
            {
                return Err(AceError::Status {
                    status: 503,
                    url: format!("/event/{}/matches", event_key),
                });
            }
            Ok(self.matches.get(event_key).cloned().unwrap_or_default())
        }

        fn team_event_matches(&self, team: TeamId, event_key: &str) -> Result<Vec<Match>> {
            Ok(self
                .matches
                .get(event_key)
                .map(|all| {
                    all.iter()
                        .filter(|m| m.seat_of(team).is_some())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        fn event_awards(&self, event_key: &str) -> Result<Vec<Award>> {
            if self.panicking.as_deref() == Some(event_key) {
                panic!("award feed exploded");
            }
            Ok(Vec::new())
        }
    }

    fn event(key: &str, event_type: i32) -> Event {
        Event {
            key: key.to_string(),
            name: key.to_uppercase(),
            year: YEAR,
            event_type: Some(event_type),
            week: Some(1),
            city: None,
            state_prov: None,
            country: None,
            start_date: None,
            end_date: None,
        }
    }

    fn team(number: u32) -> Team {
        Team {
            id: TeamId(number),
            nickname: Some(format!("Team {}", number)),
            name: None,
            city: None,
            state_prov: None,
            country: None,
            rookie_year: Some(2020),
            website: None,
        }
    }

    fn played(event_key: &str, number: u32, red: [u32; 3], blue: [u32; 3]) -> Match {
        Match {
            key: format!("{}_qm{}", event_key, number),
            event_key: event_key.to_string(),
            comp_level: CompLevel::Qualification,
            set_number: 1,
            match_number: number,
            actual_time: DateTime::from_timestamp(1_900_000_000 + i64::from(number) * 600, 0),
            scheduled_time: None,
            red: Alliance {
                teams: red.iter().copied().map(TeamId).collect(),
                score: 75,
            },
            blue: Alliance {
                teams: blue.iter().copied().map(TeamId).collect(),
                score: 52,
            },
            winning_alliance: Some(AllianceColor::Red),
            score_breakdown: Some(json!({
                "red": {"autoPoints": 15, "teleopPoints": 50, "endGamePoints": 10},
                "blue": {"autoPoints": 9, "teleopPoints": 37, "endGamePoints": 6}
            })),
            video: None,
        }
    }

    fn season_source() -> FakeSource {
        let mut source = FakeSource {
            events: vec![
                event("2030aaa", 0),
                event("2030bbb", 0),
                event("2030ccc", 1),
                event("2030off", 99),
            ],
            missing: vec!["2030bbb".to_string()],
            flaky: Some("2030ccc".to_string()),
            ..Default::default()
        };
        source
            .rosters
            .insert("2030aaa".to_string(), (1..=7).map(team).collect());
        source
            .rosters
            .insert("2030ccc".to_string(), (1..=6).map(team).collect());
        source
            .rosters
            .insert("2030off".to_string(), (1..=6).map(team).collect());
        source.matches.insert(
            "2030aaa".to_string(),
            vec![
                played("2030aaa", 1, [1, 2, 3], [4, 5, 6]),
                played("2030aaa", 2, [4, 5, 6], [1, 2, 3]),
            ],
        );
        source.matches.insert(
            "2030ccc".to_string(),
            vec![played("2030ccc", 1, [1, 2, 3], [4, 5, 6])],
        );
        source
    }

    fn instant() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 2.0,
            max_attempts: None,
        }
    }

    fn pipeline(source: FakeSource) -> Pipeline<FakeSource> {
        Pipeline::new(source)
            .with_retry_policy(instant())
            .with_strategies(StrategyRegistry::new(GENERIC))
            .with_ingest(IngestConfig {
                workers: 4,
                ..Default::default()
            })
    }

    #[test]
    fn test_failing_event_does_not_abort_season() {
        let pipeline = pipeline(season_source());
        let db = Database::in_memory().unwrap();

        let summary = pipeline.run_season(YEAR, &db).unwrap();

        assert_eq!(summary.events_processed, 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures[0].context, "event 2030bbb");
        assert!(summary.failures[0].reason.contains("404"));
        assert!(!summary.cancelled);

        // Team 7 is on a roster but never played
        assert_eq!(summary.teams_processed, 7);
        assert_eq!(summary.teams_updated, 6);
        assert_eq!(summary.teams_skipped, 1);

        // Two transient failures, then success
        assert_eq!(pipeline.source.flaky_calls.load(Ordering::SeqCst), 3);

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.event_count, 2);
        assert_eq!(stats.team_count, 7);
        assert_eq!(stats.match_count, 3);
        assert_eq!(stats.event_rating_count, 12);
        assert_eq!(stats.season_rating_count, 6);
        assert!(db.season_rating(TeamId(7), YEAR).unwrap().is_none());
    }

    #[test]
    fn test_season_ratings_are_consistent() {
        let pipeline = pipeline(season_source());
        let db = Database::in_memory().unwrap();
        pipeline.run_season(YEAR, &db).unwrap();

        for number in 1..=6 {
            let season = db.season_rating(TeamId(number), YEAR).unwrap().unwrap();
            let r = season.rating;
            assert_eq!(season.total_events, 2);
            assert_eq!(season.match_count, 3);
            assert!(r.overall > 0.0);
            assert!((0.0..=1.0).contains(&r.confidence));
            assert!((r.ace - r.overall * r.confidence).abs() < 1e-9);
        }

        let winner = db.season_rating(TeamId(1), YEAR).unwrap().unwrap();
        assert_eq!((winner.wins, winner.losses, winner.ties), (2, 1, 0));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let pipeline = pipeline(season_source());
        let db = Database::in_memory().unwrap();
        pipeline.run_season(YEAR, &db).unwrap();
        let first = db.season_rating(TeamId(4), YEAR).unwrap();

        pipeline.run_season(YEAR, &db).unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.event_rating_count, 12);
        assert_eq!(stats.season_rating_count, 6);
        let second = db.season_rating(TeamId(4), YEAR).unwrap();
        assert_eq!(first.map(|s| s.match_count), second.map(|s| s.match_count));
    }

    #[test]
    fn test_include_offseason() {
        let pipeline = pipeline(season_source()).with_ingest(IngestConfig {
            workers: 2,
            include_offseason: true,
            ..Default::default()
        });
        let db = Database::in_memory().unwrap();
        let summary = pipeline.run_season(YEAR, &db).unwrap();
        assert_eq!(summary.events_processed, 3);
    }

    #[test]
    fn test_panicking_task_is_recorded() {
        let mut source = season_source();
        source.panicking = Some("2030aaa".to_string());
        let pipeline = pipeline(source);
        let db = Database::in_memory().unwrap();

        let summary = pipeline.run_season(YEAR, &db).unwrap();

        assert_eq!(summary.events_processed, 1);
        assert_eq!(summary.failed(), 2);
        let panicked = summary
            .failures
            .iter()
            .find(|f| f.context == "event 2030aaa")
            .unwrap();
        assert!(panicked.reason.contains("award feed exploded"));
        // Only the flaky event's teams remain
        assert_eq!(summary.teams_updated, 6);
        assert_eq!(db.get_stats().unwrap().event_rating_count, 6);
    }

    #[test]
    fn test_cancel_before_event_list() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let pipeline = pipeline(season_source()).with_cancel(cancel);
        let db = Database::in_memory().unwrap();

        let result = pipeline.run_season(YEAR, &db);

        assert!(matches!(result, Err(AceError::Cancelled)));
        assert_eq!(pipeline.source.events_calls.load(Ordering::SeqCst), 0);
        assert_eq!(db.get_stats().unwrap().event_count, 0);
    }

    #[test]
    fn test_cancel_during_event_stage() {
        let cancel = CancelToken::new();
        let mut source = season_source();
        source.missing.clear();
        source.flaky = None;
        source.cancel_during = Some(("2030ccc".to_string(), cancel.clone()));
        let pipeline = pipeline(source).with_cancel(cancel);
        let db = Database::in_memory().unwrap();

        let summary = pipeline.run_season(YEAR, &db).unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.failed(), 0);
        assert_eq!(summary.teams_processed, 0);
        assert!(summary.events_processed <= 1);
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.event_rating_count, 0);
        assert_eq!(stats.season_rating_count, 0);
    }

    #[test]
    fn test_registered_only_events_do_not_boost() {
        let mut source = season_source();
        source.matches.insert("2030ccc".to_string(), Vec::new());
        let pipeline = pipeline(source);
        let db = Database::in_memory().unwrap();
        pipeline.run_season(YEAR, &db).unwrap();

        let events = db.event_ratings(TeamId(1), YEAR).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_key, "2030aaa");
        assert_eq!(events[0].rating.event_boost, crate::rating::confidence::event_boost(1));

        let season = db.season_rating(TeamId(1), YEAR).unwrap().unwrap();
        assert_eq!(season.total_events, 1);
    }

    #[test]
    fn test_recompute_matches_batch_result() {
        let pipeline = pipeline(season_source());
        let db = Database::in_memory().unwrap();
        pipeline.run_season(YEAR, &db).unwrap();
        let stored = db.season_rating(TeamId(2), YEAR).unwrap().unwrap();

        let recomputed = pipeline.recompute_season(TeamId(2), YEAR, &db).unwrap();

        assert_eq!(recomputed.match_count, stored.match_count);
        assert_eq!(recomputed.total_events, stored.total_events);
        assert!((recomputed.rating.ace - stored.rating.ace).abs() < 1e-9);
        assert!((recomputed.rating.overall - stored.rating.overall).abs() < 1e-9);
    }

    #[test]
    fn test_recompute_without_events_writes_nothing() {
        let db = Database::in_memory().unwrap();
        let rating = recompute_season(&EngineConfig::default(), TeamId(9999), YEAR, &db).unwrap();
        assert_eq!(rating, SeasonRating::empty(TeamId(9999), YEAR));
        assert_eq!(db.get_stats().unwrap().season_rating_count, 0);
    }
}

//! Event-level rating for one team

use crate::rating::confidence::{ConfidenceEstimator, ConfidenceInputs};
use crate::rating::contribution::ContributionCalculator;
use crate::rating::record::{EventRating, Rating};
use crate::rating::strategy::ScoringStrategy;
use crate::rating::updater::RatingUpdater;
use crate::rating::EngineConfig;
use crate::{Match, MatchResult, TeamId};

/// Facts about the team and event that don't come from the matches
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event_key: String,
    pub year: u16,
    pub years_experience: u32,
    /// Events the team attends this season
    pub season_events: usize,
}

/// Folds a team's matches at an event into an [`EventRating`]
pub struct EventAggregator<'a> {
    config: EngineConfig,
    estimator: ConfidenceEstimator,
    calculator: ContributionCalculator<'a>,
}

impl<'a> EventAggregator<'a> {
    pub fn new(config: EngineConfig, strategy: &'a ScoringStrategy) -> Self {
        EventAggregator {
            config,
            estimator: config.confidence_estimator(),
            calculator: ContributionCalculator::new(strategy),
        }
    }

    pub fn aggregate(&self, matches: &[Match], team: TeamId, ctx: &EventContext) -> EventRating {
        let mut ordered: Vec<&Match> = matches.iter().filter(|m| m.is_played()).collect();
        ordered.sort_by_key(|m| m.chronological_key());

        let mut updater = RatingUpdater::new(self.config);
        let mut totals = Vec::with_capacity(ordered.len());
        let mut dominance = Vec::with_capacity(ordered.len());
        let (mut wins, mut losses, mut ties) = (0u32, 0u32, 0u32);

        for record in ordered {
            let mc = match self.calculator.contribution(record, team) {
                Ok(Some(mc)) => mc,
                Ok(None) => {
                    log::warn!("Skipping {}: {} is in neither alliance", record.key, team);
                    continue;
                }
                Err(e) => {
                    log::warn!("Skipping {} for {}: {}", record.key, team, e);
                    continue;
                }
            };

            updater.observe(&mc.contribution, mc.level);
            totals.push(mc.contribution.total());
            dominance.push(mc.dominance);
            match mc.result {
                MatchResult::Win => wins += 1,
                MatchResult::Loss => losses += 1,
                MatchResult::Tie => ties += 1,
            }
        }

        let match_count = updater.match_count();
        if match_count == 0 {
            return EventRating::empty(team, &ctx.event_key, ctx.year);
        }

        let confidence = self.estimator.estimate(&ConfidenceInputs {
            contributions: &totals,
            dominance_samples: &dominance,
            wins,
            losses,
            years_experience: ctx.years_experience,
            season_events: ctx.season_events,
        });

        EventRating {
            team,
            event_key: ctx.event_key.clone(),
            year: ctx.year,
            rating: Rating::new(updater.finish(), confidence),
            match_count,
            wins,
            losses,
            ties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::breakdown::ScoreBreakdown;
    use crate::rating::confidence::{self, RescalePolicy};
    use crate::rating::contribution::dominance_sample;
    use crate::rating::strategy::EndgameFn;
    use crate::{Alliance, AllianceColor, CompLevel};
    use chrono::DateTime;
    use serde_json::json;

    fn fixed_auto(_: &[ScoreBreakdown], _: usize) -> f64 {
        10.0
    }

    fn fixed_teleop(_: &[ScoreBreakdown], _: usize) -> f64 {
        20.0
    }

    fn fixed_endgame(_: &ScoreBreakdown, _: usize) -> f64 {
        5.0
    }

    const FIXED: ScoringStrategy = ScoringStrategy {
        name: "fixed",
        auto: fixed_auto,
        teleop: fixed_teleop,
        endgame: EndgameFn::PerRobot(fixed_endgame),
    };

    fn points(b: &[ScoreBreakdown], _: usize) -> f64 {
        b.iter().map(|x| x.number("pts")).sum()
    }

    fn none(_: &[ScoreBreakdown], _: usize) -> f64 {
        0.0
    }

    const POINTS: ScoringStrategy = ScoringStrategy {
        name: "points",
        auto: points,
        teleop: none,
        endgame: EndgameFn::Alliance(none),
    };

    fn make_match(number: u32, time: i64, red_pts: i64, winner: Option<AllianceColor>) -> Match {
        Match {
            key: format!("2024test_qm{}", number),
            event_key: "2024test".to_string(),
            comp_level: CompLevel::Qualification,
            set_number: 1,
            match_number: number,
            actual_time: DateTime::from_timestamp(time, 0),
            scheduled_time: None,
            red: Alliance {
                teams: vec![TeamId(1), TeamId(2), TeamId(3)],
                score: 60,
            },
            blue: Alliance {
                teams: vec![TeamId(4), TeamId(5), TeamId(6)],
                score: 45,
            },
            winning_alliance: winner,
            score_breakdown: Some(json!({"red": {"pts": red_pts}, "blue": {"pts": 0}})),
            video: None,
        }
    }

    fn ctx() -> EventContext {
        EventContext {
            event_key: "2024test".to_string(),
            year: 2024,
            years_experience: 2,
            season_events: 1,
        }
    }

    #[test]
    fn test_single_match_scenario() {
        let aggregator = EventAggregator::new(EngineConfig::default(), &FIXED);
        let matches = vec![make_match(1, 1000, 0, Some(AllianceColor::Red))];
        let rating = aggregator.aggregate(&matches, TeamId(1), &ctx());

        assert_eq!(rating.match_count, 1);
        assert_eq!((rating.wins, rating.losses), (1, 0));
        assert_eq!(rating.rating.auto, 10.0);
        assert_eq!(rating.rating.teleop, 20.0);
        assert_eq!(rating.rating.endgame, 5.0);
        assert_eq!(rating.rating.overall, 35.0);

        let dominance = dominance_sample(35.0, 45.0, 3);
        let raw = confidence::CONSISTENCY_WEIGHT * 1.0
            + confidence::DOMINANCE_WEIGHT * dominance
            + confidence::RECORD_ALIGNMENT_WEIGHT * 1.0
            + confidence::VETERAN_WEIGHT * 0.4
            + confidence::EVENTS_WEIGHT * 0.5;
        let expected = RescalePolicy::default().apply(raw);

        assert_eq!(rating.rating.consistency, 1.0);
        assert!((rating.rating.dominance - dominance).abs() < 1e-12);
        assert!((rating.rating.raw_confidence - raw).abs() < 1e-12);
        assert!((rating.rating.confidence - expected).abs() < 1e-12);
        assert!((rating.rating.ace - 35.0 * expected).abs() < 1e-12);
    }

    #[test]
    fn test_no_matches_is_all_zero() {
        let aggregator = EventAggregator::new(EngineConfig::default(), &FIXED);
        let rating = aggregator.aggregate(&[], TeamId(1), &ctx());
        assert_eq!(rating, EventRating::empty(TeamId(1), "2024test", 2024));
        assert_eq!(rating.rating.confidence, 0.0);
    }

    #[test]
    fn test_matches_are_sorted_by_time() {
        let aggregator = EventAggregator::new(EngineConfig::default(), &POINTS);
        let early = make_match(2, 1000, 10, None);
        let late = make_match(1, 2000, 30, None);

        let a = aggregator.aggregate(&[early.clone(), late.clone()], TeamId(1), &ctx());
        let b = aggregator.aggregate(&[late, early], TeamId(1), &ctx());
        assert_eq!(a, b);
        assert!((a.rating.auto - (10.0 + 0.44 * 20.0)).abs() < 1e-12);
        assert_eq!(a.ties, 2);
    }

    #[test]
    fn test_malformed_and_unplayed_matches_are_skipped() {
        let aggregator = EventAggregator::new(EngineConfig::default(), &POINTS);
        let good = make_match(1, 1000, 12, Some(AllianceColor::Blue));
        let mut broken = make_match(2, 2000, 50, Some(AllianceColor::Red));
        broken.score_breakdown = Some(serde_json::Value::String("not json".to_string()));
        let mut unplayed = make_match(3, 3000, 50, None);
        unplayed.red.score = -1;
        let mut stray = make_match(4, 4000, 50, Some(AllianceColor::Red));
        stray.red.teams = vec![TeamId(7), TeamId(8), TeamId(9)];

        let rating = aggregator.aggregate(&[good, broken, unplayed, stray], TeamId(1), &ctx());
        assert_eq!(rating.match_count, 1);
        assert_eq!((rating.wins, rating.losses), (0, 1));
        assert_eq!(rating.rating.auto, 12.0);
    }

    #[test]
    fn test_all_malformed_is_all_zero() {
        let aggregator = EventAggregator::new(EngineConfig::default(), &POINTS);
        let mut broken = make_match(1, 1000, 12, Some(AllianceColor::Red));
        broken.score_breakdown = None;
        let rating = aggregator.aggregate(&[broken], TeamId(1), &ctx());
        assert_eq!(rating, EventRating::empty(TeamId(1), "2024test", 2024));
    }

    #[test]
    fn test_confidence_bounds_and_ace() {
        let aggregator = EventAggregator::new(EngineConfig::default(), &POINTS);
        let matches: Vec<Match> = (0..12)
            .map(|i| {
                let time = 1000 + i64::from(i);
                make_match(i + 1, time, 5 + i64::from(i) * 7, Some(AllianceColor::Red))
            })
            .collect();
        let rating = aggregator.aggregate(&matches, TeamId(2), &ctx());
        assert_eq!(rating.match_count, 12);
        assert!(rating.rating.confidence >= 0.0 && rating.rating.confidence <= 1.0);
        let r = rating.rating;
        assert!((r.ace - r.overall * r.confidence).abs() < 1e-9);
    }
}

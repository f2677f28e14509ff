//! Per-match contribution of one team
//!
//! Locates the team's alliance, decodes that alliance's breakdown and asks
//! the season strategy for auto / teleop / endgame points. Also produces the
//! dominance sample the confidence estimator consumes.

use crate::data::breakdown::alliance_breakdown;
use crate::rating::confidence::EPSILON;
use crate::rating::strategy::ScoringStrategy;
use crate::{CompLevel, Match, MatchResult, Result, TeamId};

/// Phase points credited to one team for one match
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Contribution {
    pub auto: f64,
    pub teleop: f64,
    pub endgame: f64,
}

impl Contribution {
    pub fn new(auto: f64, teleop: f64, endgame: f64) -> Self {
        Contribution {
            auto,
            teleop,
            endgame,
        }
    }

    pub fn total(&self) -> f64 {
        self.auto + self.teleop + self.endgame
    }
}

/// A contribution plus the match facts the aggregator needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchContribution {
    pub contribution: Contribution,
    /// Normalised margin over the opponents, in [0, 1]
    pub dominance: f64,
    pub result: MatchResult,
    pub level: CompLevel,
}

/// Margin of the team over an average opposing robot, normalised to [0, 1]
pub fn dominance_sample(team_total: f64, opponent_score: f64, opponent_team_count: usize) -> f64 {
    let margin = team_total - opponent_score / opponent_team_count.max(1) as f64;
    let scaled = margin / (opponent_score + EPSILON);
    ((scaled + 1.0) / 1.3).clamp(0.0, 1.0)
}

/// Evaluates matches for a single season's strategy
pub struct ContributionCalculator<'a> {
    strategy: &'a ScoringStrategy,
}

impl<'a> ContributionCalculator<'a> {
    pub fn new(strategy: &'a ScoringStrategy) -> Self {
        ContributionCalculator { strategy }
    }

    /// `Ok(None)` if the team isn't in either alliance; `Err` if the
    /// breakdown can't be decoded.
    pub fn contribution(&self, record: &Match, team: TeamId) -> Result<Option<MatchContribution>> {
        let Some((color, index)) = record.seat_of(team) else {
            return Ok(None);
        };
        let breakdowns = [alliance_breakdown(record, color)?];
        let own = record.alliance(color);
        let opponent = record.alliance(color.opponent());
        let team_count = own.teams.len().max(1);

        let contribution = Contribution::new(
            self.strategy.auto_points(&breakdowns, team_count),
            self.strategy.teleop_points(&breakdowns, team_count),
            self.strategy.endgame_points(&breakdowns, team_count, index),
        );
        let dominance = dominance_sample(
            contribution.total(),
            f64::from(opponent.score.max(0)),
            opponent.teams.len(),
        );
        let result = record.result_for(team).unwrap_or(MatchResult::Tie);

        Ok(Some(MatchContribution {
            contribution,
            dominance,
            result,
            level: record.comp_level,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::strategy::GENERIC;
    use crate::{Alliance, AllianceColor};
    use serde_json::json;

    fn make_match(breakdown: Option<serde_json::Value>) -> Match {
        Match {
            key: "2024test_qm1".to_string(),
            event_key: "2024test".to_string(),
            comp_level: CompLevel::Qualification,
            set_number: 1,
            match_number: 1,
            actual_time: None,
            scheduled_time: None,
            red: Alliance {
                teams: vec![TeamId(1), TeamId(2), TeamId(3)],
                score: 90,
            },
            blue: Alliance {
                teams: vec![TeamId(4), TeamId(5), TeamId(6)],
                score: 60,
            },
            winning_alliance: Some(AllianceColor::Red),
            score_breakdown: breakdown,
            video: None,
        }
    }

    #[test]
    fn test_dominance_sample_formula() {
        // margin = 40 - 60/3 = 20; scaled = 20/60; normalised = (1/3 + 1)/1.3
        let d = dominance_sample(40.0, 60.0, 3);
        assert!((d - (20.0 / (60.0 + EPSILON) + 1.0) / 1.3).abs() < 1e-9);
        assert_eq!(dominance_sample(1000.0, 0.0, 3), 1.0);
        assert!(dominance_sample(0.0, 300.0, 1) < 1e-6);
        assert_eq!(dominance_sample(-10.0, 300.0, 1), 0.0);
    }

    #[test]
    fn test_absent_team_is_none() {
        let calc = ContributionCalculator::new(&GENERIC);
        let m = make_match(Some(json!({"red": {}, "blue": {}})));
        assert!(calc.contribution(&m, TeamId(99)).unwrap().is_none());
    }

    #[test]
    fn test_contribution_from_string_payload() {
        let calc = ContributionCalculator::new(&GENERIC);
        let payload = json!({
            "red": {"autoPoints": 10, "teleopPoints": 30, "endGamePoints": 5},
            "blue": {"autoPoints": 1}
        });
        let m = make_match(Some(serde_json::Value::String(payload.to_string())));

        let mc = calc.contribution(&m, TeamId(2)).unwrap().unwrap();
        let scale = 1.0 / (1.0 + 3f64.ln());
        assert!((mc.contribution.auto - 10.0 * scale).abs() < 1e-9);
        assert!((mc.contribution.teleop - 25.0 * scale).abs() < 1e-9);
        assert!((mc.contribution.endgame - 5.0 * scale).abs() < 1e-9);
        assert_eq!(mc.result, MatchResult::Win);
        assert_eq!(mc.level, CompLevel::Qualification);

        let loser = calc.contribution(&m, TeamId(5)).unwrap().unwrap();
        assert_eq!(loser.result, MatchResult::Loss);
    }

    #[test]
    fn test_malformed_payload_is_error() {
        let calc = ContributionCalculator::new(&GENERIC);
        let bad = make_match(Some(serde_json::Value::String("{oops".to_string())));
        assert!(calc.contribution(&bad, TeamId(1)).is_err());

        let missing = make_match(None);
        assert!(calc.contribution(&missing, TeamId(1)).is_err());

        let one_sided = make_match(Some(json!({"red": {"autoPoints": 3}})));
        assert!(calc.contribution(&one_sided, TeamId(1)).unwrap().is_some());
        assert!(calc.contribution(&one_sided, TeamId(4)).is_err());
    }
}

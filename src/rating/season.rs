//! Season-level aggregation
//!
//! Match-count-weighted mean of a team's event ratings. Events without
//! signal are dropped rather than zero-weighted, and confidence is rescaled
//! once more at this level before ACE is recomputed.

use crate::rating::confidence::RescalePolicy;
use crate::rating::record::{EventRating, Rating, SeasonRating};
use crate::TeamId;

#[derive(Debug, Clone, Copy, Default)]
pub struct SeasonAggregator {
    rescale: RescalePolicy,
}

impl SeasonAggregator {
    pub fn new(rescale: RescalePolicy) -> Self {
        SeasonAggregator { rescale }
    }

    pub fn aggregate(&self, team: TeamId, year: u16, events: &[EventRating]) -> SeasonRating {
        let counted: Vec<&EventRating> = events.iter().filter(|e| e.has_signal()).collect();
        let total_matches: u32 = counted.iter().map(|e| e.match_count).sum();
        if counted.is_empty() || total_matches == 0 {
            return SeasonRating::empty(team, year);
        }

        let weight_sum = f64::from(total_matches);
        let mean = |field: fn(&Rating) -> f64| {
            counted
                .iter()
                .map(|e| field(&e.rating) * f64::from(e.match_count))
                .sum::<f64>()
                / weight_sum
        };

        let auto = mean(|r| r.auto);
        let teleop = mean(|r| r.teleop);
        let endgame = mean(|r| r.endgame);
        let overall = mean(|r| r.overall);
        let weighted_confidence = mean(|r| r.confidence);
        let confidence = self.rescale.apply(weighted_confidence);

        SeasonRating {
            team,
            year,
            rating: Rating {
                auto,
                teleop,
                endgame,
                overall,
                confidence,
                raw_confidence: weighted_confidence,
                ace: overall * confidence,
                consistency: mean(|r| r.consistency),
                dominance: mean(|r| r.dominance),
                record_alignment: mean(|r| r.record_alignment),
                veteran_boost: mean(|r| r.veteran_boost),
                event_boost: mean(|r| r.event_boost),
            },
            match_count: total_matches,
            wins: counted.iter().map(|e| e.wins).sum(),
            losses: counted.iter().map(|e| e.losses).sum(),
            ties: counted.iter().map(|e| e.ties).sum(),
            total_events: counted.len() as u32,
        }
    }
}

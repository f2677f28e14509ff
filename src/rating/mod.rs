//! Team rating engine
//!
//! Match contributions feed a per-event moving average and a confidence
//! estimate; event ratings are then combined into a season rating.

pub mod confidence;
pub mod contribution;
pub mod event;
pub mod record;
pub mod season;
pub mod strategy;
pub mod updater;

pub use confidence::{ConfidenceEstimator, ConfidenceWeights, RescalePolicy};
pub use contribution::{Contribution, ContributionCalculator};
pub use event::{EventAggregator, EventContext};
pub use record::{EventRating, Rating, SeasonRating};
pub use season::SeasonAggregator;
pub use strategy::{ScoringStrategy, StrategyRegistry};
pub use updater::RatingUpdater;

use serde::{Deserialize, Serialize};

use crate::CompLevel;

/// Base EMA learning rate
pub const LEARNING_RATE: f64 = 0.4;

/// Qualification matches count slightly more: playoff alliances are picked,
/// so their scores say more about partners than about the team
pub const QUALIFICATION_IMPORTANCE: f64 = 1.1;

pub const PLAYOFF_IMPORTANCE: f64 = 1.0;

/// Immutable engine tuning, fixed at construction time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub learning_rate: f64,
    pub qualification_importance: f64,
    pub playoff_importance: f64,
    pub weights: ConfidenceWeights,
    pub rescale: RescalePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            learning_rate: LEARNING_RATE,
            qualification_importance: QUALIFICATION_IMPORTANCE,
            playoff_importance: PLAYOFF_IMPORTANCE,
            weights: ConfidenceWeights::default(),
            rescale: RescalePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn match_importance(&self, level: CompLevel) -> f64 {
        if level.is_playoff() {
            self.playoff_importance
        } else {
            self.qualification_importance
        }
    }

    pub fn confidence_estimator(&self) -> ConfidenceEstimator {
        ConfidenceEstimator::new(self.weights, self.rescale)
    }
}

//! Running per-event rating estimate
//!
//! An exponential moving average over chronologically ordered matches. The
//! first observation seeds the estimate directly; later ones move it by
//! `K × (actual − estimate)`.

use serde::{Deserialize, Serialize};

use crate::rating::contribution::Contribution;
use crate::rating::EngineConfig;
use crate::CompLevel;

/// Running auto / teleop / endgame estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseEstimate {
    pub auto: f64,
    pub teleop: f64,
    pub endgame: f64,
}

impl PhaseEstimate {
    pub fn overall(&self) -> f64 {
        self.auto + self.teleop + self.endgame
    }
}

impl From<Contribution> for PhaseEstimate {
    fn from(c: Contribution) -> Self {
        PhaseEstimate {
            auto: c.auto,
            teleop: c.teleop,
            endgame: c.endgame,
        }
    }
}

/// EMA state for one team at one event
#[derive(Debug, Clone)]
pub struct RatingUpdater {
    estimate: Option<PhaseEstimate>,
    config: EngineConfig,
    /// Recency weight; 1.0 within a single event
    decay: f64,
    matches: u32,
}

impl RatingUpdater {
    pub fn new(config: EngineConfig) -> Self {
        RatingUpdater {
            estimate: None,
            config,
            decay: 1.0,
            matches: 0,
        }
    }

    /// Scale every update after the seed by `decay`
    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    /// No observation folded in yet
    pub fn is_cold(&self) -> bool {
        self.estimate.is_none()
    }

    /// Learning rate for a match at the given level
    pub fn learning_rate(&self, level: CompLevel) -> f64 {
        self.config.learning_rate * self.config.match_importance(level) * self.decay
    }

    /// Fold in the next match in chronological order
    pub fn observe(&mut self, actual: &Contribution, level: CompLevel) {
        let k = self.learning_rate(level);
        self.estimate = Some(match self.estimate {
            None => PhaseEstimate::from(*actual),
            Some(current) => PhaseEstimate {
                auto: current.auto + k * (actual.auto - current.auto),
                teleop: current.teleop + k * (actual.teleop - current.teleop),
                endgame: current.endgame + k * (actual.endgame - current.endgame),
            },
        });
        self.matches += 1;
    }

    pub fn estimate(&self) -> Option<PhaseEstimate> {
        self.estimate
    }

    pub fn match_count(&self) -> u32 {
        self.matches
    }

    /// Final estimate; all zero if nothing was observed
    pub fn finish(self) -> PhaseEstimate {
        self.estimate.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(contributions: &[Contribution]) -> PhaseEstimate {
        let mut updater = RatingUpdater::new(EngineConfig::default());
        for c in contributions {
            updater.observe(c, CompLevel::Qualification);
        }
        updater.finish()
    }

    #[test]
    fn test_first_match_seeds_without_blending() {
        let mut updater = RatingUpdater::new(EngineConfig::default());
        assert!(updater.is_cold());
        updater.observe(&Contribution::new(10.0, 20.0, 5.0), CompLevel::Qualification);
        assert!(!updater.is_cold());

        let estimate = updater.estimate().unwrap();
        assert_eq!(estimate, PhaseEstimate { auto: 10.0, teleop: 20.0, endgame: 5.0 });
        assert_eq!(estimate.overall(), 35.0);
        assert_eq!(updater.match_count(), 1);
    }

    #[test]
    fn test_ema_update() {
        let result = run(&[
            Contribution::new(10.0, 0.0, 0.0),
            Contribution::new(30.0, 0.0, 0.0),
        ]);
        // K = 0.4 * 1.1 (qualification) * 1.0
        assert!((result.auto - (10.0 + 0.44 * 20.0)).abs() < 1e-12);
    }

    #[test]
    fn test_playoff_matches_move_less() {
        let mut qual = RatingUpdater::new(EngineConfig::default());
        let mut playoff = RatingUpdater::new(EngineConfig::default());
        for updater in [&mut qual, &mut playoff] {
            updater.observe(&Contribution::new(10.0, 0.0, 0.0), CompLevel::Qualification);
        }
        qual.observe(&Contribution::new(30.0, 0.0, 0.0), CompLevel::Qualification);
        playoff.observe(&Contribution::new(30.0, 0.0, 0.0), CompLevel::SemiFinal);
        assert!(qual.finish().auto > playoff.finish().auto);
    }

    #[test]
    fn test_order_sensitive() {
        let a = Contribution::new(10.0, 20.0, 5.0);
        let b = Contribution::new(30.0, 10.0, 0.0);
        let c = Contribution::new(15.0, 25.0, 10.0);
        assert_ne!(run(&[a, b, c]), run(&[c, b, a]));
        assert_eq!(run(&[a]), run(&[a]));
    }

    #[test]
    fn test_cold_finish_is_zero() {
        let updater = RatingUpdater::new(EngineConfig::default());
        assert_eq!(updater.finish(), PhaseEstimate::default());
    }

    #[test]
    fn test_decay_damps_updates() {
        let full = run(&[Contribution::new(10.0, 0.0, 0.0), Contribution::new(30.0, 0.0, 0.0)]);
        let mut decayed = RatingUpdater::new(EngineConfig::default()).with_decay(0.5);
        decayed.observe(&Contribution::new(10.0, 0.0, 0.0), CompLevel::Qualification);
        decayed.observe(&Contribution::new(30.0, 0.0, 0.0), CompLevel::Qualification);
        assert!(decayed.finish().auto < full.auto);
    }
}

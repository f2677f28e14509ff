//! Rating records produced by the engine

use serde::{Deserialize, Serialize};

use crate::rating::confidence::ConfidenceBreakdown;
use crate::rating::updater::PhaseEstimate;
use crate::TeamId;

/// RAW components, confidence and ACE with the confidence sub-components
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub auto: f64,
    pub teleop: f64,
    pub endgame: f64,
    /// RAW: auto + teleop + endgame
    pub overall: f64,
    pub confidence: f64,
    /// Confidence before the non-linear rescale
    pub raw_confidence: f64,
    /// overall × confidence
    pub ace: f64,
    pub consistency: f64,
    pub dominance: f64,
    pub record_alignment: f64,
    pub veteran_boost: f64,
    pub event_boost: f64,
}

impl Rating {
    /// Combine a RAW estimate with its confidence; ACE is derived here and
    /// nowhere else
    pub fn new(estimate: PhaseEstimate, confidence: ConfidenceBreakdown) -> Self {
        let overall = estimate.overall();
        Rating {
            auto: estimate.auto,
            teleop: estimate.teleop,
            endgame: estimate.endgame,
            overall,
            confidence: confidence.confidence,
            raw_confidence: confidence.raw,
            ace: overall * confidence.confidence,
            consistency: confidence.consistency,
            dominance: confidence.dominance,
            record_alignment: confidence.record_alignment,
            veteran_boost: confidence.veteran_boost,
            event_boost: confidence.event_boost,
        }
    }
}

/// One team's rating at one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRating {
    pub team: TeamId,
    pub event_key: String,
    pub year: u16,
    #[serde(flatten)]
    pub rating: Rating,
    pub match_count: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
}

impl EventRating {
    /// The record for a team with no usable matches
    pub fn empty(team: TeamId, event_key: &str, year: u16) -> Self {
        EventRating {
            team,
            event_key: event_key.to_string(),
            year,
            rating: Rating::default(),
            match_count: 0,
            wins: 0,
            losses: 0,
            ties: 0,
        }
    }

    /// Played matches and produced a positive RAW
    pub fn has_signal(&self) -> bool {
        self.match_count > 0 && self.rating.overall > 0.0
    }
}

/// One team's rating across a season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonRating {
    pub team: TeamId,
    pub year: u16,
    #[serde(flatten)]
    pub rating: Rating,
    pub match_count: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    /// Events that contributed to the aggregate
    pub total_events: u32,
}

impl SeasonRating {
    pub fn empty(team: TeamId, year: u16) -> Self {
        SeasonRating {
            team,
            year,
            rating: Rating::default(),
            match_count: 0,
            wins: 0,
            losses: 0,
            ties: 0,
            total_events: 0,
        }
    }
}

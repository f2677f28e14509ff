//! Confidence estimation
//!
//! Blends five reliability signals into a single [0, 1] score and pushes it
//! through a three-regime rescale. Every intermediate value is kept on
//! [`ConfidenceBreakdown`] so a rating can be explained after the fact.

use serde::{Deserialize, Serialize};

/// Weight of match-to-match consistency
pub const CONSISTENCY_WEIGHT: f64 = 0.35;

/// Weight of scoring dominance over opponents
pub const DOMINANCE_WEIGHT: f64 = 0.35;

/// Weight of win/loss record agreement
pub const RECORD_ALIGNMENT_WEIGHT: f64 = 0.10;

/// Weight of years of competitive experience
pub const VETERAN_WEIGHT: f64 = 0.10;

/// Weight of events attended this season
pub const EVENTS_WEIGHT: f64 = 0.10;

/// Above this, confidence is stretched upward
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Stretch factor applied to the excess above the high threshold
pub const HIGH_CONFIDENCE_STRETCH: f64 = 1.1;

/// Below this, confidence is compressed downward
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.65;

/// Multiplier applied to confidence below the low threshold
pub const LOW_CONFIDENCE_COMPRESSION: f64 = 0.9;

/// Guards divisions by a zero maximum
pub const EPSILON: f64 = 1e-6;

/// Relative weights of the confidence components (sum to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub consistency: f64,
    pub dominance: f64,
    pub record_alignment: f64,
    pub veteran: f64,
    pub events: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        ConfidenceWeights {
            consistency: CONSISTENCY_WEIGHT,
            dominance: DOMINANCE_WEIGHT,
            record_alignment: RECORD_ALIGNMENT_WEIGHT,
            veteran: VETERAN_WEIGHT,
            events: EVENTS_WEIGHT,
        }
    }
}

impl ConfidenceWeights {
    pub fn total(&self) -> f64 {
        self.consistency + self.dominance + self.record_alignment + self.veteran + self.events
    }
}

/// Three-regime rescale: stretch the top, compress the bottom, leave the
/// middle band alone. Thresholds are empirical and tunable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RescalePolicy {
    pub high_threshold: f64,
    pub high_stretch: f64,
    pub low_threshold: f64,
    pub low_compression: f64,
}

impl Default for RescalePolicy {
    fn default() -> Self {
        RescalePolicy {
            high_threshold: HIGH_CONFIDENCE_THRESHOLD,
            high_stretch: HIGH_CONFIDENCE_STRETCH,
            low_threshold: LOW_CONFIDENCE_THRESHOLD,
            low_compression: LOW_CONFIDENCE_COMPRESSION,
        }
    }
}

impl RescalePolicy {
    /// Rescale and clamp into [0, 1]
    pub fn apply(&self, raw: f64) -> f64 {
        let scaled = if raw > self.high_threshold {
            self.high_threshold + (raw - self.high_threshold) * self.high_stretch
        } else if raw < self.low_threshold {
            raw * self.low_compression
        } else {
            raw
        };
        scaled.clamp(0.0, 1.0)
    }
}

/// Everything the estimator looks at for one team at one event
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs<'a> {
    /// Per-match total contributions, chronological
    pub contributions: &'a [f64],
    /// Per-match dominance samples in [0, 1]
    pub dominance_samples: &'a [f64],
    pub wins: u32,
    pub losses: u32,
    pub years_experience: u32,
    pub season_events: usize,
}

/// Confidence and the components it was built from
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub consistency: f64,
    pub dominance: f64,
    pub record_alignment: f64,
    pub veteran_boost: f64,
    pub event_boost: f64,
    /// Weighted sum before the rescale
    pub raw: f64,
    /// Final value after rescale and clamp
    pub confidence: f64,
}

/// 1 − stdev / max, floored at 0. A single observation is defined as fully
/// consistent.
pub fn consistency(contributions: &[f64]) -> f64 {
    if contributions.len() < 2 {
        return 1.0;
    }
    let n = contributions.len() as f64;
    let mean = contributions.iter().sum::<f64>() / n;
    let variance = contributions
        .iter()
        .map(|c| (c - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let peak = contributions
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    (1.0 - variance.sqrt() / (peak + EPSILON)).clamp(0.0, 1.0)
}

/// Mean dominance sample, capped at 1
pub fn dominance(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    mean.min(1.0)
}

pub fn record_alignment(wins: u32, losses: u32) -> f64 {
    let decided = wins + losses;
    let win_rate = if decided == 0 {
        0.0
    } else {
        f64::from(wins) / f64::from(decided)
    };
    0.7 + 0.3 * win_rate
}

pub fn veteran_boost(years_experience: u32) -> f64 {
    match years_experience {
        0 | 1 => 0.2,
        2 => 0.4,
        3 => 0.6,
        _ => 1.0,
    }
}

pub fn event_boost(season_events: usize) -> f64 {
    match season_events {
        0 | 1 => 0.5,
        2 => 0.9,
        _ => 1.0,
    }
}

/// Computes [`ConfidenceBreakdown`]s under fixed weights and rescale policy
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceEstimator {
    weights: ConfidenceWeights,
    rescale: RescalePolicy,
}

impl ConfidenceEstimator {
    pub fn new(weights: ConfidenceWeights, rescale: RescalePolicy) -> Self {
        ConfidenceEstimator { weights, rescale }
    }

    pub fn rescale(&self) -> &RescalePolicy {
        &self.rescale
    }

    pub fn estimate(&self, inputs: &ConfidenceInputs<'_>) -> ConfidenceBreakdown {
        let consistency = consistency(inputs.contributions);
        let dominance = dominance(inputs.dominance_samples);
        let record_alignment = record_alignment(inputs.wins, inputs.losses);
        let veteran_boost = veteran_boost(inputs.years_experience);
        let event_boost = event_boost(inputs.season_events);

        let w = &self.weights;
        let raw = w.consistency * consistency
            + w.dominance * dominance
            + w.record_alignment * record_alignment
            + w.veteran * veteran_boost
            + w.events * event_boost;

        ConfidenceBreakdown {
            consistency,
            dominance,
            record_alignment,
            veteran_boost,
            event_boost,
            raw,
            confidence: self.rescale.apply(raw),
        }
    }
}

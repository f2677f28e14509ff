//! Season scoring strategies
//!
//! Each FRC season scores differently. A [`ScoringStrategy`] turns one
//! alliance's breakdown(s) into a per-team auto / teleop / endgame
//! contribution for that season; the [`StrategyRegistry`] maps a season year
//! to its strategy. Adding a season means registering one more entry.
//!
//! Extractors reduce their breakdowns with [`trimmed_mean`]. The per-match
//! contribution calculator passes exactly one alliance breakdown, which is
//! never trimmed; the step table only bites when a caller hands in many
//! matches' breakdowns at once.

use std::collections::BTreeMap;

use crate::data::breakdown::ScoreBreakdown;

/// Alliance-level phase extractor: `(breakdowns, team_count) -> contribution`
pub type PhaseFn = fn(&[ScoreBreakdown], usize) -> f64;

/// Per-robot phase extractor: `(breakdown, index within alliance) -> points`
pub type RobotPhaseFn = fn(&ScoreBreakdown, usize) -> f64;

/// How a season's endgame is credited
#[derive(Clone, Copy)]
pub enum EndgameFn {
    /// Alliance total shared among teammates like auto and teleop
    Alliance(PhaseFn),
    /// Scored per robot slot (`endGameRobot1..3` style fields)
    PerRobot(RobotPhaseFn),
}

/// The three phase extractors for one season
#[derive(Clone, Copy)]
pub struct ScoringStrategy {
    pub name: &'static str,
    pub auto: PhaseFn,
    pub teleop: PhaseFn,
    pub endgame: EndgameFn,
}

impl std::fmt::Debug for ScoringStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endgame = match self.endgame {
            EndgameFn::Alliance(_) => "alliance",
            EndgameFn::PerRobot(_) => "per-robot",
        };
        f.debug_struct("ScoringStrategy")
            .field("name", &self.name)
            .field("endgame", &endgame)
            .finish()
    }
}

impl ScoringStrategy {
    pub fn auto_points(&self, breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
        (self.auto)(breakdowns, team_count)
    }

    pub fn teleop_points(&self, breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
        (self.teleop)(breakdowns, team_count)
    }

    pub fn endgame_points(
        &self,
        breakdowns: &[ScoreBreakdown],
        team_count: usize,
        team_index: usize,
    ) -> f64 {
        match self.endgame {
            EndgameFn::Alliance(f) => f(breakdowns, team_count),
            EndgameFn::PerRobot(f) => {
                trimmed_mean(breakdowns.iter().map(|b| f(b, team_index)).collect())
            }
        }
    }
}

/// Fraction of the lowest samples discarded before averaging
pub fn trim_fraction(samples: usize) -> f64 {
    match samples {
        0..=11 => 0.0,
        12..=24 => 0.03,
        25..=39 => 0.05,
        40..=59 => 0.08,
        60..=100 => 0.10,
        _ => 0.12,
    }
}

/// Mean of the samples after dropping the bottom `trim_fraction(n)` of them
pub fn trimmed_mean(mut scores: Vec<f64>) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.sort_by(|a, b| a.total_cmp(b));
    let cut = (scores.len() as f64 * trim_fraction(scores.len())).floor() as usize;
    let kept = &scores[cut..];
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Share of an alliance quantity credited to one team: `1 / (1 + ln n)`
pub fn team_count_scale(team_count: usize) -> f64 {
    1.0 / (1.0 + (team_count.max(1) as f64).ln())
}

/// Apply `score` to every breakdown, scale by alliance size, trim-average
fn alliance_phase(
    breakdowns: &[ScoreBreakdown],
    team_count: usize,
    score: impl Fn(&ScoreBreakdown) -> f64,
) -> f64 {
    let scale = team_count_scale(team_count);
    trimmed_mean(breakdowns.iter().map(|b| score(b) * scale).collect())
}

// ==================== Default ====================

fn generic_endgame_total(b: &ScoreBreakdown) -> f64 {
    ["endGamePoints", "endgamePoints", "endGameTotalStagePoints", "endGameBargePoints"]
        .iter()
        .map(|k| b.number(k))
        .find(|v| *v != 0.0)
        .unwrap_or(0.0)
}

fn auto_generic(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| b.number("autoPoints"))
}

fn teleop_generic(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        (b.number("teleopPoints") - generic_endgame_total(b)).max(0.0)
    })
}

fn endgame_generic(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, generic_endgame_total)
}

/// Fallback for seasons without their own rules: alliance phase totals
pub const GENERIC: ScoringStrategy = ScoringStrategy {
    name: "generic",
    auto: auto_generic,
    teleop: teleop_generic,
    endgame: EndgameFn::Alliance(endgame_generic),
};

// ==================== 2019 Destination: Deep Space ====================

fn auto_2019(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| b.number("sandStormBonusPoints"))
}

fn teleop_2019(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.sum(&["hatchPanelPoints", "cargoPoints"])
    })
}

fn endgame_2019(b: &ScoreBreakdown, index: usize) -> f64 {
    match b.robot_text("endgameRobot", index) {
        "HabLevel3" => 12.0,
        "HabLevel2" => 6.0,
        "HabLevel1" => 3.0,
        _ => 0.0,
    }
}

// ==================== 2020/2021 Infinite Recharge ====================

fn auto_2020(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.sum(&["autoInitLinePoints", "autoCellPoints"])
    })
}

fn teleop_2020(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.sum(&["teleopCellPoints", "controlPanelPoints"])
    })
}

fn endgame_2020(b: &ScoreBreakdown, index: usize) -> f64 {
    match b.robot_text("endgameRobot", index) {
        "Hang" => 25.0,
        "Park" => 5.0,
        _ => 0.0,
    }
}

// ==================== 2022 Rapid React ====================

fn auto_2022(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.sum(&["autoTaxiPoints", "autoCargoPoints"])
    })
}

fn teleop_2022(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| b.number("teleopCargoPoints"))
}

fn endgame_2022(b: &ScoreBreakdown, index: usize) -> f64 {
    match b.robot_text("endgameRobot", index) {
        "Traversal" => 15.0,
        "High" => 10.0,
        "Mid" => 6.0,
        "Low" => 4.0,
        _ => 0.0,
    }
}

// ==================== 2023 Charged Up ====================

fn auto_2023(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.sum(&[
            "autoMobilityPoints",
            "autoGamePiecePoints",
            "autoChargeStationPoints",
        ])
    })
}

fn teleop_2023(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.sum(&["teleopGamePiecePoints", "linkPoints"])
    })
}

fn endgame_2023(b: &ScoreBreakdown, index: usize) -> f64 {
    match b.robot_text("endGameChargeStationRobot", index) {
        "Docked" if b.text("endGameBridgeState") == "Level" => 10.0,
        "Docked" => 6.0,
        "Park" => 2.0,
        _ => 0.0,
    }
}

// ==================== 2024 Crescendo ====================

fn auto_2024(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.sum(&[
            "autoLeavePoints",
            "autoSpeakerNotePoints",
            "autoAmpNotePoints",
        ])
    })
}

fn teleop_2024(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.number("teleopTotalNotePoints")
    })
}

fn endgame_2024(b: &ScoreBreakdown, index: usize) -> f64 {
    match b.robot_text("endGameRobot", index) {
        "StageLeft" | "CenterStage" | "StageRight" => 3.0,
        "Parked" => 1.0,
        _ => 0.0,
    }
}

// ==================== 2025 Reefscape ====================

fn auto_2025(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.sum(&["autoMobilityPoints", "autoCoralPoints"])
    })
}

fn teleop_2025(breakdowns: &[ScoreBreakdown], team_count: usize) -> f64 {
    alliance_phase(breakdowns, team_count, |b| {
        b.sum(&["teleopCoralPoints", "algaePoints"])
    })
}

fn endgame_2025(b: &ScoreBreakdown, index: usize) -> f64 {
    match b.robot_text("endGameRobot", index) {
        "DeepCage" => 12.0,
        "ShallowCage" => 6.0,
        "Parked" => 2.0,
        _ => 0.0,
    }
}

/// Season → strategy table with a designated fallback
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<u16, ScoringStrategy>,
    default: ScoringStrategy,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::new(GENERIC);
        registry.register(
            2019,
            ScoringStrategy {
                name: "2019 Destination: Deep Space",
                auto: auto_2019,
                teleop: teleop_2019,
                endgame: EndgameFn::PerRobot(endgame_2019),
            },
        );
        let infinite_recharge = ScoringStrategy {
            name: "2020 Infinite Recharge",
            auto: auto_2020,
            teleop: teleop_2020,
            endgame: EndgameFn::PerRobot(endgame_2020),
        };
        registry.register(2020, infinite_recharge);
        registry.register(2021, infinite_recharge);
        registry.register(
            2022,
            ScoringStrategy {
                name: "2022 Rapid React",
                auto: auto_2022,
                teleop: teleop_2022,
                endgame: EndgameFn::PerRobot(endgame_2022),
            },
        );
        registry.register(
            2023,
            ScoringStrategy {
                name: "2023 Charged Up",
                auto: auto_2023,
                teleop: teleop_2023,
                endgame: EndgameFn::PerRobot(endgame_2023),
            },
        );
        registry.register(
            2024,
            ScoringStrategy {
                name: "2024 Crescendo",
                auto: auto_2024,
                teleop: teleop_2024,
                endgame: EndgameFn::PerRobot(endgame_2024),
            },
        );
        registry.register(
            2025,
            ScoringStrategy {
                name: "2025 Reefscape",
                auto: auto_2025,
                teleop: teleop_2025,
                endgame: EndgameFn::PerRobot(endgame_2025),
            },
        );
        registry
    }
}

impl StrategyRegistry {
    /// Empty registry that resolves every season to `default`
    pub fn new(default: ScoringStrategy) -> Self {
        StrategyRegistry {
            strategies: BTreeMap::new(),
            default,
        }
    }

    pub fn register(&mut self, season: u16, strategy: ScoringStrategy) {
        self.strategies.insert(season, strategy);
    }

    pub fn is_registered(&self, season: u16) -> bool {
        self.strategies.contains_key(&season)
    }

    /// Strategy for a season, or the default (with a warning)
    pub fn lookup(&self, season: u16) -> &ScoringStrategy {
        match self.strategies.get(&season) {
            Some(strategy) => strategy,
            None => {
                log::warn!(
                    "No scoring strategy for {}, falling back to {}",
                    season,
                    self.default.name
                );
                &self.default
            }
        }
    }

    pub fn seasons(&self) -> impl Iterator<Item = u16> + '_ {
        self.strategies.keys().copied()
    }
}

//! Tunable thresholds for scoring, mastery and adaptive difficulty.
//!
//! Every constant the engine applies lives here with a named default, so a
//! deployment can tune rules from a config file without touching control flow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("correct answer award must be >= 0, got {0}")]
    NegativeAward(i64),

    #[error("max attempts must be > 0 when set")]
    InvalidMaxAttempts,

    #[error("mastery bounds must satisfy 0 < floor < ceiling < 1, got [{floor}, {ceiling}]")]
    InvalidMasteryBounds { floor: f64, ceiling: f64 },

    #[error("initial mastery {0} must lie within the mastery bounds")]
    InvalidInitialMastery(f64),

    #[error("{field} must be in (0, 1], got {value}")]
    InvalidRate { field: &'static str, value: f64 },

    #[error("completion threshold must be in (0, 1], got {0}")]
    InvalidCompletionThreshold(f64),

    #[error("history cap must be > 0")]
    InvalidHistoryCap,

    #[error("{field} must be > 0")]
    ZeroCount { field: &'static str },

    #[error("{field} ({value}) cannot exceed the adaptive window size ({window})")]
    ExceedsWindow {
        field: &'static str,
        value: usize,
        window: usize,
    },
}

//
// ─── SCORING ───────────────────────────────────────────────────────────────────
//

pub const DEFAULT_CORRECT_AWARD: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Points awarded the first time a question is answered correctly.
    pub correct_award: i64,
    /// Retry cap per question. `None` leaves retries unlimited.
    pub max_attempts: Option<u32>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            correct_award: DEFAULT_CORRECT_AWARD,
            max_attempts: None,
        }
    }
}

//
// ─── MASTERY ───────────────────────────────────────────────────────────────────
//

pub const DEFAULT_INITIAL_MASTERY: f64 = 0.1;
pub const DEFAULT_LEARN_RATE: f64 = 0.25;
pub const DEFAULT_DECAY_RATE: f64 = 0.25;
pub const MASTERY_FLOOR: f64 = 0.01;
pub const MASTERY_CEILING: f64 = 0.99;
pub const DEFAULT_COMPLETION_THRESHOLD: f64 = 0.85;
pub const DEFAULT_HISTORY_CAP: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteryPolicy {
    pub initial_mastery: f64,
    /// Share of the remaining gap to the ceiling closed by a success.
    pub learn_rate: f64,
    /// Share of the current level lost on a failure.
    pub decay_rate: f64,
    pub floor: f64,
    pub ceiling: f64,
    /// A knowledge component counts as complete at or above this level.
    pub completion_threshold: f64,
    pub history_cap: usize,
}

impl Default for MasteryPolicy {
    fn default() -> Self {
        Self {
            initial_mastery: DEFAULT_INITIAL_MASTERY,
            learn_rate: DEFAULT_LEARN_RATE,
            decay_rate: DEFAULT_DECAY_RATE,
            floor: MASTERY_FLOOR,
            ceiling: MASTERY_CEILING,
            completion_threshold: DEFAULT_COMPLETION_THRESHOLD,
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

impl MasteryPolicy {
    /// Clamps a raw level into `[floor, ceiling]`.
    #[must_use]
    pub fn clamp(&self, level: f64) -> f64 {
        level.clamp(self.floor, self.ceiling)
    }
}

//
// ─── ADAPTIVE ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptivePolicy {
    /// Interactions retained for the atom currently on screen.
    pub window_size: usize,
    /// Consecutive fast, hint-free correct answers needed to step up.
    pub escalate_after_correct: usize,
    /// Upper bound on response time for an answer to count as fast.
    pub fast_response_ms: u64,
    /// Consecutive incorrect answers that trigger a step down.
    pub deescalate_after_incorrect: usize,
    /// Number of recent answers inspected for hint reliance.
    pub hint_reliance_window: usize,
    /// Hints per answer at which an answer counts as hint-reliant.
    pub hint_reliance_threshold: u32,
    /// Practice items drawn from each atom in a lesson.
    pub items_per_atom: usize,
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self {
            window_size: 5,
            escalate_after_correct: 3,
            fast_response_ms: 15_000,
            deescalate_after_incorrect: 2,
            hint_reliance_window: 2,
            hint_reliance_threshold: 2,
            items_per_atom: 5,
        }
    }
}

//
// ─── TOP LEVEL ─────────────────────────────────────────────────────────────────
//

/// Complete rule set handed to the engines and services.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorPolicy {
    pub scoring: ScoringPolicy,
    pub mastery: MasteryPolicy,
    pub adaptive: AdaptivePolicy,
}

impl TutorPolicy {
    /// Checks that every threshold is usable.
    ///
    /// # Errors
    ///
    /// Returns the first `PolicyError` found, scoring first, then mastery,
    /// then adaptive rules.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let scoring = &self.scoring;
        if scoring.correct_award < 0 {
            return Err(PolicyError::NegativeAward(scoring.correct_award));
        }
        if scoring.max_attempts == Some(0) {
            return Err(PolicyError::InvalidMaxAttempts);
        }

        let mastery = &self.mastery;
        if !(mastery.floor > 0.0 && mastery.floor < mastery.ceiling && mastery.ceiling < 1.0) {
            return Err(PolicyError::InvalidMasteryBounds {
                floor: mastery.floor,
                ceiling: mastery.ceiling,
            });
        }
        if !(mastery.floor..=mastery.ceiling).contains(&mastery.initial_mastery) {
            return Err(PolicyError::InvalidInitialMastery(mastery.initial_mastery));
        }
        for (field, value) in [
            ("learn_rate", mastery.learn_rate),
            ("decay_rate", mastery.decay_rate),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(PolicyError::InvalidRate { field, value });
            }
        }
        if !(mastery.completion_threshold > 0.0 && mastery.completion_threshold <= 1.0) {
            return Err(PolicyError::InvalidCompletionThreshold(
                mastery.completion_threshold,
            ));
        }
        if mastery.history_cap == 0 {
            return Err(PolicyError::InvalidHistoryCap);
        }

        let adaptive = &self.adaptive;
        for (field, value) in [
            ("window_size", adaptive.window_size),
            ("escalate_after_correct", adaptive.escalate_after_correct),
            ("deescalate_after_incorrect", adaptive.deescalate_after_incorrect),
            ("hint_reliance_window", adaptive.hint_reliance_window),
            ("items_per_atom", adaptive.items_per_atom),
        ] {
            if value == 0 {
                return Err(PolicyError::ZeroCount { field });
            }
        }
        for (field, value) in [
            ("escalate_after_correct", adaptive.escalate_after_correct),
            ("deescalate_after_incorrect", adaptive.deescalate_after_incorrect),
            ("hint_reliance_window", adaptive.hint_reliance_window),
        ] {
            if value > adaptive.window_size {
                return Err(PolicyError::ExceedsWindow {
                    field,
                    value,
                    window: adaptive.window_size,
                });
            }
        }

        Ok(())
    }
}

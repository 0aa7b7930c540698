use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{KnowledgeComponentId, UserId};
use crate::policy::MasteryPolicy;

/// One graded attempt as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attempt {
    pub correct: bool,
    pub time_taken_ms: u64,
    pub hints_used: u32,
    /// Submission number on the item this attempt belongs to, starting at 1.
    pub attempt_number: u32,
}

impl Attempt {
    #[must_use]
    pub fn new(correct: bool) -> Self {
        Self {
            correct,
            time_taken_ms: 0,
            hints_used: 0,
            attempt_number: 1,
        }
    }

    #[must_use]
    pub fn with_time(mut self, time_taken_ms: u64) -> Self {
        self.time_taken_ms = time_taken_ms;
        self
    }

    #[must_use]
    pub fn with_hints(mut self, hints_used: u32) -> Self {
        self.hints_used = hints_used;
        self
    }

    #[must_use]
    pub fn with_attempt_number(mut self, attempt_number: u32) -> Self {
        self.attempt_number = attempt_number.max(1);
        self
    }
}

/// Entry in a knowledge component's bounded interaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub success: bool,
    pub time_taken_ms: u64,
    pub hints_used: u32,
    pub attempts: u32,
    pub first_attempt_success: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeComponentMastery {
    pub kc_id: KnowledgeComponentId,
    pub mastery_level: f64,
    pub total_attempts: u32,
    pub successful_attempts: u32,
    pub current_streak: u32,
    pub interaction_history: VecDeque<InteractionRecord>,
    pub last_assessed_at: Option<DateTime<Utc>>,
}

impl KnowledgeComponentMastery {
    /// Start tracking `kc_id` at `initial_level`, clamped to the policy bounds.
    #[must_use]
    pub fn new(kc_id: KnowledgeComponentId, initial_level: f64, policy: &MasteryPolicy) -> Self {
        Self {
            kc_id,
            mastery_level: policy.clamp(initial_level),
            total_attempts: 0,
            successful_attempts: 0,
            current_streak: 0,
            interaction_history: VecDeque::new(),
            last_assessed_at: None,
        }
    }

    /// Share of all attempts that succeeded, 0 before the first attempt.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        f64::from(self.successful_attempts) / f64::from(self.total_attempts)
    }

    /// Share of retained history entries solved on the first try.
    #[must_use]
    pub fn first_attempt_rate(&self) -> f64 {
        if self.interaction_history.is_empty() {
            return 0.0;
        }
        let firsts = self
            .interaction_history
            .iter()
            .filter(|r| r.first_attempt_success)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let rate = firsts as f64 / self.interaction_history.len() as f64;
        rate
    }
}

/// Per-learner mastery across all tracked knowledge components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub user_id: UserId,
    pub components: BTreeMap<KnowledgeComponentId, KnowledgeComponentMastery>,
    pub overall_mastery: f64,
    pub completed_kcs: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LearnerProfile {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            components: BTreeMap::new(),
            overall_mastery: 0.0,
            completed_kcs: 0,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn component(&self, kc_id: &KnowledgeComponentId) -> Option<&KnowledgeComponentMastery> {
        self.components.get(kc_id)
    }

    /// Mastery level for a component, if it has been tracked.
    #[must_use]
    pub fn mastery_of(&self, kc_id: &KnowledgeComponentId) -> Option<f64> {
        self.components.get(kc_id).map(|c| c.mastery_level)
    }
}

//! Per-skill mastery estimation.
//!
//! A deliberately simple exponential rule rather than Bayesian knowledge
//! tracing: a success closes a fixed share of the gap to the ceiling, a
//! failure removes a fixed share of the current level.

use chrono::{DateTime, Utc};

use crate::model::{
    Attempt, InteractionRecord, KnowledgeComponentId, KnowledgeComponentMastery, LearnerProfile,
};
use crate::policy::MasteryPolicy;

/// Change produced by a single mastery update.
#[derive(Debug, Clone, PartialEq)]
pub struct MasteryUpdate {
    pub kc_id: KnowledgeComponentId,
    pub previous_level: f64,
    pub new_level: f64,
    pub streak: u32,
    /// Whether this update pushed the component over the completion threshold.
    pub newly_completed: bool,
}

/// Apply one graded attempt to a knowledge component record.
pub fn update_mastery(
    record: &mut KnowledgeComponentMastery,
    attempt: &Attempt,
    policy: &MasteryPolicy,
    now: DateTime<Utc>,
) -> MasteryUpdate {
    let previous_level = record.mastery_level;
    let level = policy.clamp(previous_level);

    let next = if attempt.correct {
        (level + (1.0 - level) * policy.learn_rate).min(policy.ceiling)
    } else {
        (level - level * policy.decay_rate).max(policy.floor)
    };
    record.mastery_level = policy.clamp(next);

    record.total_attempts = record.total_attempts.saturating_add(1);
    if attempt.correct {
        record.successful_attempts = record.successful_attempts.saturating_add(1);
        record.current_streak = record.current_streak.saturating_add(1);
    } else {
        record.current_streak = 0;
    }

    record.interaction_history.push_back(InteractionRecord {
        success: attempt.correct,
        time_taken_ms: attempt.time_taken_ms,
        hints_used: attempt.hints_used,
        attempts: attempt.attempt_number.max(1),
        first_attempt_success: attempt.correct && attempt.attempt_number <= 1,
        at: now,
    });
    while record.interaction_history.len() > policy.history_cap {
        record.interaction_history.pop_front();
    }
    record.last_assessed_at = Some(now);

    MasteryUpdate {
        kc_id: record.kc_id.clone(),
        previous_level,
        new_level: record.mastery_level,
        streak: record.current_streak,
        newly_completed: previous_level < policy.completion_threshold
            && record.mastery_level >= policy.completion_threshold,
    }
}

/// Refresh the profile's aggregate fields from its component records.
pub fn recompute_aggregate(profile: &mut LearnerProfile, policy: &MasteryPolicy) {
    let count = profile.components.len();
    if count == 0 {
        profile.overall_mastery = 0.0;
        profile.completed_kcs = 0;
        return;
    }

    let total: f64 = profile.components.values().map(|c| c.mastery_level).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = total / count as f64;
    profile.overall_mastery = mean;
    profile.completed_kcs = profile
        .components
        .values()
        .filter(|c| c.mastery_level >= policy.completion_threshold)
        .count();
}

impl LearnerProfile {
    /// Record an attempt against `kc_id`, tracking it on first sight, and
    /// refresh the aggregate.
    pub fn record_attempt(
        &mut self,
        kc_id: &KnowledgeComponentId,
        attempt: &Attempt,
        policy: &MasteryPolicy,
        now: DateTime<Utc>,
    ) -> MasteryUpdate {
        let record = self
            .components
            .entry(kc_id.clone())
            .or_insert_with(|| {
                KnowledgeComponentMastery::new(kc_id.clone(), policy.initial_mastery, policy)
            });
        let update = update_mastery(record, attempt, policy, now);
        recompute_aggregate(self, policy);
        self.updated_at = Some(now);
        update
    }

    #[must_use]
    pub fn is_complete(&self, kc_id: &KnowledgeComponentId, policy: &MasteryPolicy) -> bool {
        self.mastery_of(kc_id)
            .is_some_and(|level| level >= policy.completion_threshold)
    }
}

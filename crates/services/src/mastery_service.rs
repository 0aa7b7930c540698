use std::sync::Arc;

use storage::repository::ProfileRepository;
use tutor_core::Clock;
use tutor_core::mastery::MasteryUpdate;
use tutor_core::model::{Attempt, KnowledgeComponentId, LearnerProfile, UserId};
use tutor_core::policy::MasteryPolicy;

/// Loads, updates and stores learner profiles.
///
/// Storage is best-effort in both directions: an unreadable profile is
/// replaced by a fresh one and a failed save is logged, so mastery tracking
/// never blocks the learning flow.
#[derive(Clone)]
pub struct MasteryService {
    clock: Clock,
    profiles: Arc<dyn ProfileRepository>,
    policy: MasteryPolicy,
}

impl MasteryService {
    #[must_use]
    pub fn new(clock: Clock, profiles: Arc<dyn ProfileRepository>) -> Self {
        Self {
            clock,
            profiles,
            policy: MasteryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: MasteryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &MasteryPolicy {
        &self.policy
    }

    /// Current profile for `user_id`, or an empty one.
    pub async fn load_profile(&self, user_id: &UserId) -> LearnerProfile {
        match self.profiles.get_profile(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => LearnerProfile::new(user_id.clone()),
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "failed to load learner profile");
                LearnerProfile::new(user_id.clone())
            }
        }
    }

    /// Apply one attempt to the learner's profile and store the result.
    pub async fn record_attempt(
        &self,
        user_id: &UserId,
        kc_id: &KnowledgeComponentId,
        attempt: &Attempt,
    ) -> MasteryUpdate {
        let mut profile = self.load_profile(user_id).await;
        let update = profile.record_attempt(kc_id, attempt, &self.policy, self.clock.now());

        tracing::debug!(
            user_id = %user_id,
            kc_id = %kc_id,
            from = update.previous_level,
            to = update.new_level,
            "mastery updated"
        );
        if update.newly_completed {
            tracing::info!(user_id = %user_id, kc_id = %kc_id, "knowledge component mastered");
        }

        if let Err(err) = self.profiles.save_profile(&profile).await {
            tracing::warn!(user_id = %user_id, error = %err, "failed to save learner profile");
        }
        update
    }

    pub async fn is_complete(&self, user_id: &UserId, kc_id: &KnowledgeComponentId) -> bool {
        self.load_profile(user_id)
            .await
            .is_complete(kc_id, &self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use storage::repository::{InMemoryRepository, StorageError};
    use tutor_core::time::fixed_now;

    struct FailingProfiles;

    #[async_trait]
    impl ProfileRepository for FailingProfiles {
        async fn get_profile(
            &self,
            _user_id: &UserId,
        ) -> Result<Option<LearnerProfile>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn save_profile(&self, _profile: &LearnerProfile) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    #[tokio::test]
    async fn profile_outage_falls_back_to_fresh_profile() {
        let service = MasteryService::new(Clock::fixed(fixed_now()), Arc::new(FailingProfiles));
        let user = UserId::new("u3");
        let kc = KnowledgeComponentId::new("kc");

        let profile = service.load_profile(&user).await;
        assert_eq!(profile, LearnerProfile::new(user.clone()));

        let update = service.record_attempt(&user, &kc, &Attempt::new(true)).await;
        assert!((update.previous_level - 0.1).abs() < 1e-9);
        assert!((update.new_level - 0.325).abs() < 1e-9);
        assert!(!service.is_complete(&user, &kc).await);
    }

    #[tokio::test]
    async fn attempts_accumulate_across_loads() {
        let repo = InMemoryRepository::new();
        let service = MasteryService::new(Clock::fixed(fixed_now()), Arc::new(repo.clone()));
        let user = UserId::new("u1");
        let kc = KnowledgeComponentId::new("kc");

        let first = service.record_attempt(&user, &kc, &Attempt::new(true)).await;
        assert!((first.previous_level - 0.1).abs() < 1e-9);
        assert!((first.new_level - 0.325).abs() < 1e-9);

        let second = service.record_attempt(&user, &kc, &Attempt::new(false)).await;
        assert!((second.previous_level - first.new_level).abs() < 1e-9);

        let stored = repo.get_profile(&user).await.unwrap().expect("saved");
        assert_eq!(stored.component(&kc).unwrap().total_attempts, 2);
        assert_eq!(stored.updated_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn completion_follows_threshold() {
        let service =
            MasteryService::new(Clock::fixed(fixed_now()), Arc::new(InMemoryRepository::new()));
        let user = UserId::new("u2");
        let kc = KnowledgeComponentId::new("kc");

        assert!(!service.is_complete(&user, &kc).await);
        for _ in 0..12 {
            service.record_attempt(&user, &kc, &Attempt::new(true)).await;
        }
        assert!(service.is_complete(&user, &kc).await);
    }
}

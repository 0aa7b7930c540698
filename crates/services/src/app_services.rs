use std::sync::Arc;

use storage::repository::{ScenarioRepository, Storage};
use tutor_core::policy::TutorPolicy;

use crate::Clock;
use crate::error::AppServicesError;
use crate::events::{EventLogger, RepositoryEventSink};
use crate::lesson_service::LessonService;
use crate::mastery_service::MasteryService;
use crate::narration::Narrator;
use crate::scenario_player::ScenarioPlayer;

/// Wires the tutoring services over one storage backend and policy.
#[derive(Clone)]
pub struct AppServices {
    scenarios: Arc<dyn ScenarioRepository>,
    player: Arc<ScenarioPlayer>,
    lessons: Arc<LessonService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the policy is invalid or storage
    /// initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        policy: TutorPolicy,
    ) -> Result<Self, AppServicesError> {
        policy.validate()?;
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, &policy))
    }

    /// Build services over an existing storage aggregate.
    ///
    /// The policy is assumed valid; see [`TutorPolicy::validate`].
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, policy: &TutorPolicy) -> Self {
        let events = EventLogger::new(Arc::new(RepositoryEventSink::new(Arc::clone(
            &storage.events,
        ))));
        let mastery = MasteryService::new(clock, Arc::clone(&storage.profiles))
            .with_policy(policy.mastery.clone());
        let player = ScenarioPlayer::new(
            clock,
            Arc::clone(&storage.scenarios),
            Arc::clone(&storage.sessions),
            mastery.clone(),
        )
        .with_scoring(policy.scoring.clone())
        .with_events(events.clone());
        let lessons = LessonService::new(clock)
            .with_adaptive_policy(policy.adaptive.clone())
            .with_scoring(policy.scoring.clone())
            .with_events(events)
            .with_mastery(mastery);

        Self {
            scenarios: Arc::clone(&storage.scenarios),
            player: Arc::new(player),
            lessons: Arc::new(lessons),
        }
    }

    /// Replace the player's narrator.
    #[must_use]
    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        let player = (*self.player).clone().with_narrator(narrator);
        self.player = Arc::new(player);
        self
    }

    /// Shuffle answer options when presenting questions.
    #[must_use]
    pub fn with_shuffle_options(mut self, shuffle: bool) -> Self {
        let player = (*self.player).clone().with_shuffle_options(shuffle);
        self.player = Arc::new(player);
        self
    }

    #[must_use]
    pub fn scenarios(&self) -> Arc<dyn ScenarioRepository> {
        Arc::clone(&self.scenarios)
    }

    #[must_use]
    pub fn player(&self) -> Arc<ScenarioPlayer> {
        Arc::clone(&self.player)
    }

    #[must_use]
    pub fn lessons(&self) -> Arc<LessonService> {
        Arc::clone(&self.lessons)
    }
}

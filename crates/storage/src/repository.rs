use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tutor_core::model::{
    InteractionEvent, LearnerProfile, ScenarioDefinition, ScenarioId, ScenarioSession, SessionId,
    UserId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Event as read back from the log, with its storage-assigned sequence id.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: i64,
    pub event: InteractionEvent,
}

/// Source of immutable scenario definitions.
#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    /// Persist or replace a scenario definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the definition cannot be stored.
    async fn upsert_scenario(&self, scenario: &ScenarioDefinition) -> Result<(), StorageError>;

    /// Fetch a scenario by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_scenario(&self, id: &ScenarioId) -> Result<ScenarioDefinition, StorageError>;

    /// Ids of all stored scenarios, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_scenarios(&self) -> Result<Vec<ScenarioId>, StorageError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetch a learner profile; `None` when the learner has no history yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failure.
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<LearnerProfile>, StorageError>;

    /// Persist or replace a learner profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be stored.
    async fn save_profile(&self, profile: &LearnerProfile) -> Result<(), StorageError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist or replace a scenario session snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn save_session(&self, session: &ScenarioSession) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_session(&self, id: SessionId) -> Result<ScenarioSession, StorageError>;

    /// Sessions started by a learner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failure.
    async fn sessions_for_user(&self, user_id: &UserId)
    -> Result<Vec<ScenarioSession>, StorageError>;
}

/// Append-only log of interaction events.
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    /// Append an event and return its sequence id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the event cannot be stored.
    async fn append_event(&self, event: &InteractionEvent) -> Result<i64, StorageError>;

    /// Events of one session in append order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failure.
    async fn events_for_session(&self, session_id: SessionId)
    -> Result<Vec<EventRecord>, StorageError>;
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    scenarios: Arc<Mutex<HashMap<ScenarioId, ScenarioDefinition>>>,
    profiles: Arc<Mutex<HashMap<UserId, LearnerProfile>>>,
    sessions: Arc<Mutex<HashMap<SessionId, ScenarioSession>>>,
    events: Arc<Mutex<Vec<InteractionEvent>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScenarioRepository for InMemoryRepository {
    async fn upsert_scenario(&self, scenario: &ScenarioDefinition) -> Result<(), StorageError> {
        let mut guard = self.scenarios.lock().map_err(poisoned)?;
        guard.insert(scenario.id().clone(), scenario.clone());
        Ok(())
    }

    async fn get_scenario(&self, id: &ScenarioId) -> Result<ScenarioDefinition, StorageError> {
        let guard = self.scenarios.lock().map_err(poisoned)?;
        guard.get(id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_scenarios(&self) -> Result<Vec<ScenarioId>, StorageError> {
        let guard = self.scenarios.lock().map_err(poisoned)?;
        let mut ids: Vec<ScenarioId> = guard.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<LearnerProfile>, StorageError> {
        let guard = self.profiles.lock().map_err(poisoned)?;
        Ok(guard.get(user_id).cloned())
    }

    async fn save_profile(&self, profile: &LearnerProfile) -> Result<(), StorageError> {
        let mut guard = self.profiles.lock().map_err(poisoned)?;
        guard.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn save_session(&self, session: &ScenarioSession) -> Result<(), StorageError> {
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        guard.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<ScenarioSession, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn sessions_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ScenarioSession>, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        let mut found: Vec<ScenarioSession> = guard
            .values()
            .filter(|s| s.user_id.as_ref() == Some(user_id))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.started_at);
        Ok(found)
    }
}

#[async_trait]
impl EventLogRepository for InMemoryRepository {
    async fn append_event(&self, event: &InteractionEvent) -> Result<i64, StorageError> {
        let mut guard = self.events.lock().map_err(poisoned)?;
        guard.push(event.clone());
        i64::try_from(guard.len()).map_err(|_| StorageError::Serialization("event id overflow".into()))
    }

    async fn events_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let guard = self.events.lock().map_err(poisoned)?;
        let mut out = Vec::new();
        for (idx, event) in guard.iter().enumerate() {
            if event.session_id == session_id {
                let id = i64::try_from(idx + 1)
                    .map_err(|_| StorageError::Serialization("event id overflow".into()))?;
                out.push(EventRecord {
                    id,
                    event: event.clone(),
                });
            }
        }
        Ok(out)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub scenarios: Arc<dyn ScenarioRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub events: Arc<dyn EventLogRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            scenarios: Arc::new(repo.clone()),
            profiles: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            events: Arc::new(repo),
        }
    }
}

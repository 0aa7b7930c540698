use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::content::DifficultyTier;
use crate::model::ids::{ContentAtomId, NodeId, ScenarioId, SessionId, UserId};
use crate::model::session::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStarted,
    SessionEnded,
    Navigation,
    ContentViewed,
    QuestionAttempted,
    AnswerRevised,
    DifficultyAdapted,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session_started",
            EventKind::SessionEnded => "session_ended",
            EventKind::Navigation => "navigation",
            EventKind::ContentViewed => "content_viewed",
            EventKind::QuestionAttempted => "question_attempted",
            EventKind::AnswerRevised => "answer_revised",
            EventKind::DifficultyAdapted => "difficulty_adapted",
        }
    }
}

/// Typed body of an interaction event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SessionStarted {
        scenario_id: ScenarioId,
        entry_node_id: NodeId,
    },
    SessionEnded {
        scenario_id: ScenarioId,
        status: SessionStatus,
        score: i64,
        percent_complete: u8,
    },
    Navigation {
        from: NodeId,
        to: NodeId,
        outcome: Option<String>,
    },
    ContentViewed {
        node_id: NodeId,
    },
    QuestionAttempted {
        node_id: NodeId,
        answer: String,
        correct: bool,
        attempt: u32,
        score_delta: i64,
    },
    AnswerRevised {
        node_id: NodeId,
        previous: String,
        selected: String,
    },
    DifficultyAdapted {
        atom_id: ContentAtomId,
        from: DifficultyTier,
        to: DifficultyTier,
        reason: String,
    },
}

impl EventPayload {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::SessionStarted { .. } => EventKind::SessionStarted,
            EventPayload::SessionEnded { .. } => EventKind::SessionEnded,
            EventPayload::Navigation { .. } => EventKind::Navigation,
            EventPayload::ContentViewed { .. } => EventKind::ContentViewed,
            EventPayload::QuestionAttempted { .. } => EventKind::QuestionAttempted,
            EventPayload::AnswerRevised { .. } => EventKind::AnswerRevised,
            EventPayload::DifficultyAdapted { .. } => EventKind::DifficultyAdapted,
        }
    }
}

/// Analytics record handed to the event sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl InteractionEvent {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        user_id: Option<UserId>,
        occurred_at: DateTime<Utc>,
        payload: EventPayload,
    ) -> Self {
        Self {
            session_id,
            user_id,
            occurred_at,
            payload,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn payload_serializes_with_type_tag() {
        let event = InteractionEvent::new(
            SessionId::generate(),
            None,
            fixed_now(),
            EventPayload::ContentViewed {
                node_id: "intro".into(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "content_viewed");
        assert_eq!(json["payload"]["node_id"], "intro");
        assert_eq!(event.kind().as_str(), "content_viewed");
    }
}

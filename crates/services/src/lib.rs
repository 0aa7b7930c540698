#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod events;
pub mod lesson_service;
pub mod mastery_service;
pub mod narration;
pub mod scenario_player;

pub use tutor_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, LessonError, PlayerError};
pub use events::{EventLogger, EventSink, NoopEventSink, RecordingEventSink, RepositoryEventSink};
pub use lesson_service::{Lesson, LessonItem, LessonService, LessonStep};
pub use mastery_service::MasteryService;
pub use narration::{Narrator, SilentNarrator};
pub use scenario_player::{
    ActiveScenario, NodeView, OptionView, QuestionView, ScenarioPlayer, SubmitOutcome,
};

mod content;
mod event;
mod ids;
pub mod lesson;
mod profile;
mod scenario;
mod session;

pub use content::{AtomKind, ContentAtom, DifficultyTier};
pub use event::{EventKind, EventPayload, InteractionEvent};
pub use ids::{
    ContentAtomId, KnowledgeComponentId, NodeId, ParseIdError, ScenarioId, SessionId, UserId,
};
pub use lesson::{LessonAnswer, LessonState};
pub use profile::{Attempt, InteractionRecord, KnowledgeComponentMastery, LearnerProfile};
pub use scenario::{
    AnswerOption, DefinitionError, NodeEffects, Question, ScenarioDefinition, ScenarioDocument,
    ScenarioNode, outcome,
};
pub use session::{NodeResponse, ScenarioSession, SessionProgress, SessionStatus};

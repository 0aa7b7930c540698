use std::sync::Arc;

use rand::rng;
use rand::seq::SliceRandom;
use storage::repository::{ScenarioRepository, SessionRepository};
use tutor_core::Clock;
use tutor_core::engine::{ScenarioEngine, Transition, TransitionError};
use tutor_core::evaluation::{AnswerEvaluator, Evaluation};
use tutor_core::mastery::MasteryUpdate;
use tutor_core::model::{
    Attempt, EventPayload, InteractionEvent, NodeId, NodeResponse, ScenarioDefinition, ScenarioId,
    ScenarioSession, SessionId, UserId, outcome,
};
use tutor_core::policy::ScoringPolicy;

use crate::error::PlayerError;
use crate::events::EventLogger;
use crate::mastery_service::MasteryService;
use crate::narration::{Narrator, SilentNarrator};

//
// ─── VIEWS ─────────────────────────────────────────────────────────────────────
//

/// An answer option as shown to the learner, without its correctness flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionView {
    pub value: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub prompt: String,
    pub options: Vec<OptionView>,
}

/// Read-side snapshot of the node the learner is on.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeView {
    pub node_id: NodeId,
    pub content: String,
    pub question: Option<QuestionView>,
    /// Connection keys available from this node, sorted.
    pub outcomes: Vec<String>,
    pub is_terminal: bool,
    pub selected: Option<String>,
    pub response: Option<NodeResponse>,
    pub percent_complete: u8,
    pub score: i64,
}

/// Everything that happened on one submission.
///
/// The evaluation is always kept. `transition` is an error when the graded
/// outcome points at a node the scenario does not have; the learner then
/// stays on the current node with the response already saved.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub evaluation: Evaluation,
    pub transition: Result<Transition, TransitionError>,
    pub mastery: Option<MasteryUpdate>,
}

//
// ─── ACTIVE SCENARIO ───────────────────────────────────────────────────────────
//

/// A running session together with the definition it walks.
#[derive(Debug, Clone)]
pub struct ActiveScenario {
    definition: ScenarioDefinition,
    session: ScenarioSession,
}

impl ActiveScenario {
    #[must_use]
    pub fn definition(&self) -> &ScenarioDefinition {
        &self.definition
    }

    #[must_use]
    pub fn session(&self) -> &ScenarioSession {
        &self.session
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session.id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    fn engine(&self) -> ScenarioEngine<'_> {
        ScenarioEngine::new(&self.definition)
    }
}

//
// ─── PLAYER ────────────────────────────────────────────────────────────────────
//

/// Drives scenario sessions and their side effects.
///
/// Rules live in `tutor-core`; the player adds events, narration, mastery
/// updates and persistence around them. Side effects are best-effort: only
/// loading the scenario at start time can fail because of storage.
#[derive(Clone)]
pub struct ScenarioPlayer {
    clock: Clock,
    scenarios: Arc<dyn ScenarioRepository>,
    sessions: Arc<dyn SessionRepository>,
    mastery: MasteryService,
    events: EventLogger,
    narrator: Arc<dyn Narrator>,
    evaluator: AnswerEvaluator,
    shuffle_options: bool,
}

impl ScenarioPlayer {
    #[must_use]
    pub fn new(
        clock: Clock,
        scenarios: Arc<dyn ScenarioRepository>,
        sessions: Arc<dyn SessionRepository>,
        mastery: MasteryService,
    ) -> Self {
        Self {
            clock,
            scenarios,
            sessions,
            mastery,
            events: EventLogger::noop(),
            narrator: Arc::new(SilentNarrator),
            evaluator: AnswerEvaluator::default(),
            shuffle_options: false,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventLogger) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = narrator;
        self
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.evaluator = AnswerEvaluator::new(scoring);
        self
    }

    #[must_use]
    pub fn with_shuffle_options(mut self, shuffle_options: bool) -> Self {
        self.shuffle_options = shuffle_options;
        self
    }

    /// Load a stored scenario and start a session on it.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Load` if the scenario cannot be fetched and
    /// `PlayerError::Definition` if it fails validation.
    pub async fn start(
        &self,
        scenario_id: &ScenarioId,
        user_id: Option<UserId>,
    ) -> Result<ActiveScenario, PlayerError> {
        let definition = self.scenarios.get_scenario(scenario_id).await?;
        self.start_with(definition, user_id).await
    }

    /// Start a session on a definition the caller already holds.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Definition` if the definition fails validation.
    pub async fn start_with(
        &self,
        definition: ScenarioDefinition,
        user_id: Option<UserId>,
    ) -> Result<ActiveScenario, PlayerError> {
        definition.validate()?;
        let session = ScenarioEngine::new(&definition).start(
            SessionId::generate(),
            user_id,
            self.clock.now(),
        )?;
        let active = ActiveScenario {
            definition,
            session,
        };

        tracing::info!(
            session_id = %active.session.id,
            scenario_id = %active.definition.id(),
            "scenario session started"
        );
        self.emit(
            &active.session,
            EventPayload::SessionStarted {
                scenario_id: active.definition.id().clone(),
                entry_node_id: active.session.current_node_id.clone(),
            },
        )
        .await;
        self.enter(&active.session, &active.definition).await;
        self.persist(&active.session).await;
        Ok(active)
    }

    /// Reopen a stored session together with its scenario.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Load` if either record cannot be fetched and
    /// `PlayerError::Definition` if the stored scenario fails validation.
    pub async fn resume(&self, session_id: SessionId) -> Result<ActiveScenario, PlayerError> {
        let session = self.sessions.get_session(session_id).await?;
        let definition = self.scenarios.get_scenario(&session.scenario_id).await?;
        definition.validate()?;
        tracing::info!(session_id = %session.id, "scenario session resumed");
        Ok(ActiveScenario {
            definition,
            session,
        })
    }

    /// Snapshot of the current node, with options shuffled when enabled.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Transition` if the session points at a node the
    /// definition does not have.
    pub fn present(&self, active: &ActiveScenario) -> Result<NodeView, PlayerError> {
        let node = active.engine().current_node(&active.session)?;
        let question = node.question.as_ref().map(|q| {
            let mut options: Vec<OptionView> = q
                .options
                .iter()
                .map(|o| OptionView {
                    value: o.value.clone(),
                    text: o.text.clone(),
                })
                .collect();
            if self.shuffle_options {
                options.shuffle(&mut rng());
            }
            QuestionView {
                prompt: q.prompt.clone(),
                options,
            }
        });

        Ok(NodeView {
            node_id: node.id.clone(),
            content: node.content.clone(),
            question,
            outcomes: node.connections.keys().cloned().collect(),
            is_terminal: node.is_terminal(),
            selected: active.session.selections.get(&node.id).cloned(),
            response: active.session.response(&node.id).cloned(),
            percent_complete: active.session.progress.percent_complete,
            score: active.session.score(),
        })
    }

    /// Remember a pending answer on the current node.
    ///
    /// Replacing an earlier, different choice is logged as a revision.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Transition` for closed sessions.
    pub async fn select_answer(
        &self,
        active: &mut ActiveScenario,
        answer: &str,
    ) -> Result<(), PlayerError> {
        let node_id = active.session.current_node_id.clone();
        let engine = ScenarioEngine::new(&active.definition);
        let previous = engine.select_answer(&mut active.session, &node_id, answer)?;

        if let Some(previous) = previous {
            tracing::debug!(session_id = %active.session.id, node_id = %node_id, "answer revised");
            self.emit(
                &active.session,
                EventPayload::AnswerRevised {
                    node_id,
                    previous,
                    selected: answer.to_owned(),
                },
            )
            .await;
        }
        self.persist(&active.session).await;
        Ok(())
    }

    /// Grade `answer` (or the pending selection) and follow the outcome.
    ///
    /// Mastery is only updated when the submission changes the node's graded
    /// state: resubmitting an answer that was already credited as correct
    /// leaves the knowledge component alone.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Evaluation` when the submission is rejected; the
    /// session is unchanged in that case. A failed transition after grading
    /// is reported through [`SubmitOutcome::transition`] instead.
    pub async fn submit_answer(
        &self,
        active: &mut ActiveScenario,
        answer: Option<&str>,
    ) -> Result<SubmitOutcome, PlayerError> {
        let now = self.clock.now();
        let time_taken_ms = self.clock.millis_since(active.session.last_active_at);
        let pending = active
            .session
            .selections
            .get(&active.session.current_node_id)
            .cloned();
        let selected = answer.map(str::to_owned).or(pending);
        let already_credited = active
            .session
            .response(&active.session.current_node_id)
            .is_some_and(|r| r.correct && r.scored);

        let engine = ScenarioEngine::new(&active.definition);
        let evaluation =
            self.evaluator
                .submit(&engine, &mut active.session, selected.as_deref(), now)?;

        tracing::debug!(
            session_id = %active.session.id,
            node_id = %evaluation.node_id,
            correct = evaluation.correct,
            attempt = evaluation.attempt,
            "answer submitted"
        );
        self.emit(
            &active.session,
            EventPayload::QuestionAttempted {
                node_id: evaluation.node_id.clone(),
                answer: evaluation.answer.clone(),
                correct: evaluation.correct,
                attempt: evaluation.attempt,
                score_delta: evaluation.score_delta,
            },
        )
        .await;

        let mastery = match (&active.session.user_id, &evaluation.knowledge_component) {
            _ if already_credited && evaluation.correct => None,
            (Some(user_id), Some(kc_id)) => {
                let attempt = Attempt::new(evaluation.correct)
                    .with_time(time_taken_ms)
                    .with_attempt_number(evaluation.attempt);
                Some(self.mastery.record_attempt(user_id, kc_id, &attempt).await)
            }
            _ => None,
        };

        let transition = match engine.follow(&mut active.session, evaluation.outcome, now) {
            Ok(transition) => {
                self.after_transition(active, &transition, Some(evaluation.outcome))
                    .await;
                Ok(transition)
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %active.session.id,
                    node_id = %evaluation.node_id,
                    error = %err,
                    "graded outcome has no usable target; staying on node"
                );
                self.persist(&active.session).await;
                Err(err)
            }
        };

        Ok(SubmitOutcome {
            evaluation,
            transition,
            mastery,
        })
    }

    /// Leave a content node through its `next` connection.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Transition` for closed sessions or dangling
    /// targets; the session is unchanged in that case.
    pub async fn continue_on(&self, active: &mut ActiveScenario) -> Result<Transition, PlayerError> {
        self.choose(active, outcome::NEXT).await
    }

    /// Follow the connection named `outcome_key`, e.g. a decision branch.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Transition` for closed sessions or dangling
    /// targets; the session is unchanged in that case.
    pub async fn choose(
        &self,
        active: &mut ActiveScenario,
        outcome_key: &str,
    ) -> Result<Transition, PlayerError> {
        let engine = ScenarioEngine::new(&active.definition);
        let transition = engine.follow(&mut active.session, outcome_key, self.clock.now())?;
        self.after_transition(active, &transition, Some(outcome_key))
            .await;
        Ok(transition)
    }

    /// Jump straight to `target`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Transition` if `target` is not in the scenario.
    pub async fn advance_to(
        &self,
        active: &mut ActiveScenario,
        target: &NodeId,
    ) -> Result<Transition, PlayerError> {
        let engine = ScenarioEngine::new(&active.definition);
        let transition = engine.advance(&mut active.session, target, self.clock.now())?;
        self.after_transition(active, &transition, None).await;
        Ok(transition)
    }

    /// Abandon the session.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Transition` if the session already ended.
    pub async fn exit(&self, active: &mut ActiveScenario) -> Result<(), PlayerError> {
        let engine = ScenarioEngine::new(&active.definition);
        engine.abandon(&mut active.session, self.clock.now())?;
        tracing::info!(session_id = %active.session.id, "scenario session abandoned");
        self.emit_ended(&active.session).await;
        self.persist(&active.session).await;
        Ok(())
    }

    async fn after_transition(
        &self,
        active: &ActiveScenario,
        transition: &Transition,
        outcome_key: Option<&str>,
    ) {
        match transition {
            Transition::Moved { from, to } => {
                self.emit(
                    &active.session,
                    EventPayload::Navigation {
                        from: from.clone(),
                        to: to.clone(),
                        outcome: outcome_key.map(str::to_owned),
                    },
                )
                .await;
                self.enter(&active.session, &active.definition).await;
            }
            Transition::Completed { at } => {
                tracing::info!(
                    session_id = %active.session.id,
                    node_id = %at,
                    score = active.session.score(),
                    "scenario session completed"
                );
                self.emit_ended(&active.session).await;
            }
            Transition::Stalled { at, outcome } => {
                tracing::debug!(
                    session_id = %active.session.id,
                    node_id = %at,
                    outcome = %outcome,
                    "no connection for outcome; staying on node"
                );
            }
        }
        self.persist(&active.session).await;
    }

    async fn enter(&self, session: &ScenarioSession, definition: &ScenarioDefinition) {
        let Some(node) = definition.node(&session.current_node_id) else {
            return;
        };
        self.narrator.speak(&node.content);
        self.emit(
            session,
            EventPayload::ContentViewed {
                node_id: node.id.clone(),
            },
        )
        .await;
    }

    async fn emit_ended(&self, session: &ScenarioSession) {
        self.emit(
            session,
            EventPayload::SessionEnded {
                scenario_id: session.scenario_id.clone(),
                status: session.status,
                score: session.score(),
                percent_complete: session.progress.percent_complete,
            },
        )
        .await;
    }

    async fn emit(&self, session: &ScenarioSession, payload: EventPayload) {
        let event = InteractionEvent::new(
            session.id,
            session.user_id.clone(),
            self.clock.now(),
            payload,
        );
        self.events.log(event).await;
    }

    async fn persist(&self, session: &ScenarioSession) {
        if let Err(err) = self.sessions.save_session(session).await {
            tracing::warn!(session_id = %session.id, error = %err, "failed to save session");
        }
    }
}

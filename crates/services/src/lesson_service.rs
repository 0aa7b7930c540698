use chrono::{DateTime, Utc};
use tutor_core::Clock;
use tutor_core::adaptive::{AdaptationDecision, AdaptiveStepper, AtomInteraction, InteractionWindow};
use tutor_core::mastery::MasteryUpdate;
use tutor_core::model::{
    Attempt, ContentAtom, ContentAtomId, DifficultyTier, EventPayload, InteractionEvent,
    LessonState, SessionId, UserId,
};
use tutor_core::policy::{AdaptivePolicy, ScoringPolicy};

use crate::error::LessonError;
use crate::events::EventLogger;
use crate::mastery_service::MasteryService;

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// What the learner should answer next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonItem {
    pub atom_id: ContentAtomId,
    pub difficulty: DifficultyTier,
    pub prompt: String,
    pub hints: Vec<String>,
    pub question_index: usize,
    pub total_questions: usize,
}

/// Result of answering one lesson item.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonStep {
    pub correct: bool,
    pub expected: Option<String>,
    pub score_delta: i64,
    /// Present when this answer moved the atom to another tier.
    pub adaptation: Option<AdaptationDecision>,
    pub mastery: Option<MasteryUpdate>,
    pub is_complete: bool,
}

/// A linear practice run over content atoms.
///
/// Each authored atom is presented `items_per_atom` times. Between items the
/// current atom may be swapped for an easier or harder variant.
#[derive(Debug, Clone)]
pub struct Lesson {
    session_id: SessionId,
    user_id: Option<UserId>,
    atoms: Vec<ContentAtom>,
    atom_index: usize,
    item_in_atom: usize,
    items_per_atom: usize,
    current: ContentAtom,
    window: InteractionWindow,
    state: LessonState,
    presented_at: DateTime<Utc>,
}

impl Lesson {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn state(&self) -> &LessonState {
        &self.state
    }

    /// The atom (or adapted variant) currently being practised.
    #[must_use]
    pub fn current_atom(&self) -> &ContentAtom {
        &self.current
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Next item to answer, or `None` once the lesson is complete.
    #[must_use]
    pub fn current_item(&self) -> Option<LessonItem> {
        if self.is_complete() {
            return None;
        }
        Some(LessonItem {
            atom_id: self.current.id.clone(),
            difficulty: self.current.difficulty,
            prompt: self.current.render_prompt(),
            hints: self.current.hints.clone(),
            question_index: self.state.current_index,
            total_questions: self.state.total_questions,
        })
    }

    fn next_item(&mut self, now: DateTime<Utc>) {
        self.state.advance();
        self.item_in_atom += 1;
        if self.item_in_atom >= self.items_per_atom {
            self.item_in_atom = 0;
            self.atom_index += 1;
            if let Some(next) = self.atoms.get(self.atom_index) {
                self.current = next.clone();
                self.window.reset_for(next.root_id().clone());
            }
        }
        self.presented_at = now;
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Runs adaptive practice lessons.
#[derive(Clone)]
pub struct LessonService {
    clock: Clock,
    stepper: AdaptiveStepper,
    scoring: ScoringPolicy,
    events: EventLogger,
    mastery: Option<MasteryService>,
}

impl LessonService {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            stepper: AdaptiveStepper::default(),
            scoring: ScoringPolicy::default(),
            events: EventLogger::noop(),
            mastery: None,
        }
    }

    #[must_use]
    pub fn with_adaptive_policy(mut self, policy: AdaptivePolicy) -> Self {
        self.stepper = AdaptiveStepper::new(policy);
        self
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventLogger) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_mastery(mut self, mastery: MasteryService) -> Self {
        self.mastery = Some(mastery);
        self
    }

    /// Begin a lesson over `atoms` in order.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::Empty` when there is nothing to practise.
    pub fn start(
        &self,
        atoms: Vec<ContentAtom>,
        user_id: Option<UserId>,
    ) -> Result<Lesson, LessonError> {
        let policy = self.stepper.policy();
        let items_per_atom = policy.items_per_atom.max(1);
        let first = atoms.first().cloned().ok_or(LessonError::Empty)?;
        let window = InteractionWindow::new(first.root_id().clone(), policy.window_size);
        let total = atoms.len().saturating_mul(items_per_atom);

        let lesson = Lesson {
            session_id: SessionId::generate(),
            user_id,
            atoms,
            atom_index: 0,
            item_in_atom: 0,
            items_per_atom,
            current: first,
            window,
            state: LessonState::new(total),
            presented_at: self.clock.now(),
        };
        tracing::info!(session_id = %lesson.session_id, total, "lesson started");
        Ok(lesson)
    }

    /// Grade an answer to the current item, adapt difficulty, and move on.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::Completed` after the last item and
    /// `LessonError::NotGradable` for atoms without an answer template.
    pub async fn answer(
        &self,
        lesson: &mut Lesson,
        answer: &str,
        hints_used: u32,
    ) -> Result<LessonStep, LessonError> {
        if lesson.is_complete() {
            return Err(LessonError::Completed);
        }
        let answer = answer.trim();
        let atom = lesson.current.clone();
        let correct = atom
            .check_answer(answer)
            .ok_or_else(|| LessonError::NotGradable(atom.id.clone()))?;

        let now = self.clock.now();
        let response_time_ms = self.clock.millis_since(lesson.presented_at);
        let score_delta = lesson.state.record_answer(
            atom.id.clone(),
            atom.difficulty,
            answer,
            correct,
            now,
            &self.scoring,
        );
        lesson.window.push(AtomInteraction {
            correct,
            response_time_ms,
            hints_used,
        });

        let mastery = match (&self.mastery, &lesson.user_id) {
            (Some(service), Some(user_id)) => {
                let attempt = Attempt::new(correct)
                    .with_time(response_time_ms)
                    .with_hints(hints_used);
                Some(
                    service
                        .record_attempt(user_id, &atom.knowledge_component, &attempt)
                        .await,
                )
            }
            _ => None,
        };

        let decision = self.stepper.decide(&atom, &lesson.window);
        let adaptation = match self.stepper.synthesize_variant(&atom, &decision) {
            Some(variant) => {
                let reason = decision.reason.map_or("unknown", |r| r.as_str());
                tracing::debug!(
                    session_id = %lesson.session_id,
                    atom_id = %atom.root_id(),
                    from = %atom.difficulty,
                    to = %variant.difficulty,
                    reason,
                    "difficulty adapted"
                );
                self.events
                    .log(InteractionEvent::new(
                        lesson.session_id,
                        lesson.user_id.clone(),
                        now,
                        EventPayload::DifficultyAdapted {
                            atom_id: atom.root_id().clone(),
                            from: atom.difficulty,
                            to: variant.difficulty,
                            reason: reason.to_owned(),
                        },
                    ))
                    .await;
                lesson.current = variant;
                // Evidence gathered at the old tier says nothing about the new one.
                lesson.window.clear();
                Some(decision)
            }
            None => None,
        };

        lesson.next_item(now);
        let is_complete = lesson.is_complete();
        if is_complete {
            tracing::info!(
                session_id = %lesson.session_id,
                score = lesson.state.score,
                accuracy = lesson.state.accuracy(),
                "lesson completed"
            );
        }

        Ok(LessonStep {
            correct,
            expected: atom.render_answer(),
            score_delta,
            adaptation,
            mastery,
            is_complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use storage::repository::{InMemoryRepository, ProfileRepository};
    use tutor_core::model::EventKind;
    use tutor_core::time::fixed_now;

    use crate::events::RecordingEventSink;

    fn atom(id: &str) -> ContentAtom {
        ContentAtom::question(id, "arith.add", "{a} + {b} = ?", "{s}")
            .at(DifficultyTier::Easy)
            .with_parameter("a", ["1", "12", "123", "1234"])
            .with_parameter("b", ["2", "30", "400", "5000"])
            .with_parameter("s", ["3", "42", "523", "6234"])
    }

    fn service(sink: &RecordingEventSink) -> LessonService {
        LessonService::new(Clock::fixed(fixed_now())).with_events(EventLogger::new(Arc::new(sink.clone())))
    }

    #[test]
    fn empty_lesson_is_rejected() {
        let svc = LessonService::new(Clock::fixed(fixed_now()));
        assert!(matches!(svc.start(Vec::new(), None), Err(LessonError::Empty)));
    }

    #[tokio::test]
    async fn fast_correct_streak_escalates_difficulty() {
        let sink = RecordingEventSink::new();
        let svc = service(&sink);
        let mut lesson = svc.start(vec![atom("add")], None).unwrap();
        assert_eq!(lesson.state().total_questions, 5);

        let first = lesson.current_item().unwrap();
        assert_eq!(first.prompt, "1 + 2 = ?");

        for _ in 0..2 {
            let step = svc.answer(&mut lesson, "3", 0).await.unwrap();
            assert!(step.correct);
            assert!(step.adaptation.is_none());
        }
        let third = svc.answer(&mut lesson, "3", 0).await.unwrap();
        let decision = third.adaptation.expect("escalated");
        assert_eq!(decision.new_difficulty, Some(DifficultyTier::Medium));

        let item = lesson.current_item().unwrap();
        assert_eq!(item.difficulty, DifficultyTier::Medium);
        assert_eq!(item.prompt, "12 + 30 = ?");
        assert_eq!(item.atom_id.as_str(), "add@medium");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::DifficultyAdapted);
    }

    #[tokio::test]
    async fn struggling_steps_down_and_stops_at_easiest() {
        let sink = RecordingEventSink::new();
        let svc = service(&sink);
        let start = atom("add").at(DifficultyTier::Medium);
        let mut lesson = svc.start(vec![start], None).unwrap();

        svc.answer(&mut lesson, "0", 0).await.unwrap();
        let step = svc.answer(&mut lesson, "0", 0).await.unwrap();
        assert_eq!(
            step.adaptation.and_then(|d| d.new_difficulty),
            Some(DifficultyTier::Easy)
        );

        svc.answer(&mut lesson, "0", 0).await.unwrap();
        let step = svc.answer(&mut lesson, "0", 0).await.unwrap();
        assert!(step.adaptation.is_none());
        assert_eq!(lesson.current_atom().difficulty, DifficultyTier::Easy);
    }

    #[tokio::test]
    async fn lesson_walks_every_atom_then_completes() {
        let sink = RecordingEventSink::new();
        let svc = service(&sink).with_adaptive_policy(AdaptivePolicy {
            items_per_atom: 2,
            ..AdaptivePolicy::default()
        });
        let mut lesson = svc.start(vec![atom("a1"), atom("a2")], None).unwrap();

        let mut seen = Vec::new();
        while let Some(item) = lesson.current_item() {
            seen.push(item.atom_id.to_string());
            svc.answer(&mut lesson, "3", 1).await.unwrap();
        }
        assert_eq!(seen, vec!["a1", "a1", "a2", "a2"]);
        assert_eq!(lesson.state().score, 40);
        assert_eq!(lesson.state().best_streak, 4);
        assert!(matches!(
            svc.answer(&mut lesson, "3", 0).await,
            Err(LessonError::Completed)
        ));
    }

    #[tokio::test]
    async fn stored_answer_is_the_graded_text() {
        let svc = service(&RecordingEventSink::new());
        let mut lesson = svc.start(vec![atom("add")], None).unwrap();

        let step = svc.answer(&mut lesson, "  3\n", 0).await.unwrap();
        assert!(step.correct);
        assert_eq!(lesson.state().answers[0].answer, "3");
    }

    #[tokio::test]
    async fn answers_feed_mastery_when_learner_is_known() {
        let repo = InMemoryRepository::new();
        let mastery = MasteryService::new(Clock::fixed(fixed_now()), Arc::new(repo.clone()));
        let svc = LessonService::new(Clock::fixed(fixed_now())).with_mastery(mastery);
        let user = UserId::new("learner");
        let mut lesson = svc.start(vec![atom("add")], Some(user.clone())).unwrap();

        let step = svc.answer(&mut lesson, "3", 0).await.unwrap();
        assert!(step.mastery.is_some());

        let profile = repo.get_profile(&user).await.unwrap().expect("profile");
        assert_eq!(
            profile.component(&"arith.add".into()).unwrap().total_attempts,
            1
        );
    }
}

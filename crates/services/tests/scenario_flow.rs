use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use services::{
    Clock, EventLogger, MasteryService, Narrator, PlayerError, RecordingEventSink, ScenarioPlayer,
};
use storage::repository::{
    InMemoryRepository, ProfileRepository, ScenarioRepository, SessionRepository, StorageError,
};
use tutor_core::engine::{ScenarioEngine, Transition};
use tutor_core::evaluation::{EvaluationError, ValidationError};
use tutor_core::model::{
    AnswerOption, DefinitionError, EventKind, EventPayload, LearnerProfile, Question,
    ScenarioDefinition, ScenarioNode, ScenarioSession, SessionId, SessionStatus, UserId, outcome,
};
use tutor_core::time::fixed_now;

#[derive(Default)]
struct RecordingNarrator {
    spoken: Mutex<Vec<String>>,
}

impl Narrator for RecordingNarrator {
    fn speak(&self, text: &str) {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_owned());
        }
    }
}

/// Session store that is always offline.
struct OfflineSessions;

#[async_trait]
impl SessionRepository for OfflineSessions {
    async fn save_session(&self, _session: &ScenarioSession) -> Result<(), StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn get_session(&self, _id: SessionId) -> Result<ScenarioSession, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn sessions_for_user(
        &self,
        _user_id: &UserId,
    ) -> Result<Vec<ScenarioSession>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }
}

/// Profile store that is always offline.
struct OfflineProfiles;

#[async_trait]
impl ProfileRepository for OfflineProfiles {
    async fn get_profile(&self, _user_id: &UserId) -> Result<Option<LearnerProfile>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn save_profile(&self, _profile: &LearnerProfile) -> Result<(), StorageError> {
        Err(StorageError::Connection("offline".into()))
    }
}

fn types_question() -> Question {
    Question {
        prompt: "Which tool checks types?".into(),
        options: vec![
            AnswerOption::new("compiler", "The compiler", true),
            AnswerOption::new("linter", "A linter", false),
        ],
        correct_answer: "compiler".into(),
        explanation: Some("Type checking happens at compile time.".into()),
        knowledge_component: Some("types.basics".into()),
    }
}

fn quiz_scenario() -> ScenarioDefinition {
    let question = types_question();
    ScenarioDefinition::new(
        "types-101",
        "Types 101",
        "intro",
        vec![
            ScenarioNode::new("intro", "Types catch mistakes early.")
                .connect(outcome::NEXT, Some("quiz")),
            ScenarioNode::new("quiz", "Quick check.")
                .with_question(question)
                .connect(outcome::CORRECT, Some("wrap")),
            ScenarioNode::new("wrap", "Well done."),
        ],
    )
    .unwrap()
}

fn player(repo: &InMemoryRepository, sink: &RecordingEventSink) -> ScenarioPlayer {
    let clock = Clock::fixed(fixed_now());
    ScenarioPlayer::new(
        clock,
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        MasteryService::new(clock, Arc::new(repo.clone())),
    )
    .with_events(EventLogger::new(Arc::new(sink.clone())))
}

#[tokio::test]
async fn full_walk_scores_once_and_completes() {
    let repo = InMemoryRepository::new();
    let sink = RecordingEventSink::new();
    let scenario = quiz_scenario();
    repo.upsert_scenario(&scenario).await.unwrap();

    let narrator = Arc::new(RecordingNarrator::default());
    let player = player(&repo, &sink).with_narrator(narrator.clone());
    let user = UserId::new("learner");

    let mut active = player
        .start(scenario.id(), Some(user.clone()))
        .await
        .unwrap();
    let view = player.present(&active).unwrap();
    assert_eq!(view.node_id.as_str(), "intro");
    assert!(view.question.is_none());

    let moved = player.continue_on(&mut active).await.unwrap();
    assert!(matches!(moved, Transition::Moved { .. }));

    let view = player.present(&active).unwrap();
    let options: Vec<String> = view
        .question
        .expect("question")
        .options
        .into_iter()
        .map(|o| o.value)
        .collect();
    assert_eq!(options, vec!["compiler", "linter"]);

    // A wrong answer has no connection to follow, so the learner stays put.
    let wrong = player
        .submit_answer(&mut active, Some("linter"))
        .await
        .unwrap();
    assert!(!wrong.evaluation.correct);
    assert!(matches!(wrong.transition, Ok(Transition::Stalled { .. })));
    assert_eq!(active.session().current_node_id.as_str(), "quiz");

    player.select_answer(&mut active, "linter").await.unwrap();
    player.select_answer(&mut active, "compiler").await.unwrap();
    let right = player.submit_answer(&mut active, None).await.unwrap();
    assert!(right.evaluation.correct);
    assert_eq!(right.evaluation.attempt, 2);
    assert_eq!(right.evaluation.score_delta, 10);
    assert!(right.mastery.is_some());

    let done = player.continue_on(&mut active).await.unwrap();
    assert!(matches!(done, Transition::Completed { .. }));
    assert_eq!(active.session().status, SessionStatus::Completed);
    assert_eq!(active.session().progress.percent_complete, 100);
    assert_eq!(active.session().score(), 10);

    let stored = repo.get_session(active.session_id()).await.unwrap();
    assert_eq!(&stored, active.session());

    let profile = repo.get_profile(&user).await.unwrap().expect("profile");
    assert_eq!(
        profile
            .component(&"types.basics".into())
            .unwrap()
            .total_attempts,
        2
    );

    let kinds: Vec<EventKind> = sink.events().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::SessionStarted,
            EventKind::ContentViewed,
            EventKind::Navigation,
            EventKind::ContentViewed,
            EventKind::QuestionAttempted,
            EventKind::AnswerRevised,
            EventKind::QuestionAttempted,
            EventKind::Navigation,
            EventKind::ContentViewed,
            EventKind::SessionEnded,
        ]
    );

    let spoken = narrator.spoken.lock().unwrap().clone();
    assert_eq!(
        spoken,
        vec!["Types catch mistakes early.", "Quick check.", "Well done."]
    );
}

#[tokio::test]
async fn invalid_submission_leaves_session_untouched() {
    let repo = InMemoryRepository::new();
    let sink = RecordingEventSink::new();
    let scenario = quiz_scenario();
    repo.upsert_scenario(&scenario).await.unwrap();
    let player = player(&repo, &sink);

    let mut active = player.start(scenario.id(), None).await.unwrap();
    player.continue_on(&mut active).await.unwrap();
    let before = active.session().clone();

    let err = player
        .submit_answer(&mut active, Some("debugger"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PlayerError::Evaluation(EvaluationError::Validation(
            ValidationError::UnknownOption { .. }
        ))
    ));
    assert_eq!(active.session(), &before);

    let err = player.submit_answer(&mut active, None).await.unwrap_err();
    assert!(matches!(
        err,
        PlayerError::Evaluation(EvaluationError::Validation(ValidationError::MissingAnswer))
    ));
}

#[tokio::test]
async fn missing_scenario_surfaces_load_error() {
    let repo = InMemoryRepository::new();
    let player = player(&repo, &RecordingEventSink::new());
    let err = player.start(&"absent".into(), None).await.unwrap_err();
    assert!(matches!(err, PlayerError::Load(StorageError::NotFound)));
}

#[tokio::test]
async fn storage_outage_does_not_block_play() {
    let repo = InMemoryRepository::new();
    let sink = RecordingEventSink::new();
    let clock = Clock::fixed(fixed_now());
    let player = ScenarioPlayer::new(
        clock,
        Arc::new(repo.clone()),
        Arc::new(OfflineSessions),
        MasteryService::new(clock, Arc::new(repo.clone())),
    )
    .with_events(EventLogger::new(Arc::new(sink.clone())));

    let mut active = player.start_with(quiz_scenario(), None).await.unwrap();
    player.continue_on(&mut active).await.unwrap();
    player
        .submit_answer(&mut active, Some("compiler"))
        .await
        .unwrap();
    assert_eq!(active.session().current_node_id.as_str(), "wrap");
}

#[tokio::test]
async fn exit_abandons_and_reports_end() {
    let repo = InMemoryRepository::new();
    let sink = RecordingEventSink::new();
    let player = player(&repo, &sink);

    let mut active = player.start_with(quiz_scenario(), None).await.unwrap();
    player.exit(&mut active).await.unwrap();
    assert_eq!(active.session().status, SessionStatus::Abandoned);
    assert!(player.exit(&mut active).await.is_err());

    let last = sink.events().last().cloned().expect("events");
    assert!(matches!(
        last.payload,
        EventPayload::SessionEnded {
            status: SessionStatus::Abandoned,
            ..
        }
    ));

    let resumed = player.resume(active.session_id()).await;
    // The definition was never imported, only the session was stored.
    assert!(matches!(resumed, Err(PlayerError::Load(StorageError::NotFound))));
}

#[tokio::test]
async fn profile_outage_does_not_block_play() {
    let repo = InMemoryRepository::new();
    let clock = Clock::fixed(fixed_now());
    let player = ScenarioPlayer::new(
        clock,
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        MasteryService::new(clock, Arc::new(OfflineProfiles)),
    );

    let mut active = player
        .start_with(quiz_scenario(), Some(UserId::new("learner")))
        .await
        .unwrap();
    player.continue_on(&mut active).await.unwrap();
    let result = player
        .submit_answer(&mut active, Some("compiler"))
        .await
        .unwrap();

    let update = result.mastery.expect("mastery update");
    assert!((update.new_level - 0.325).abs() < 1e-9);
    assert_eq!(active.session().current_node_id.as_str(), "wrap");
}

#[tokio::test]
async fn resubmitting_a_credited_answer_leaves_mastery_alone() {
    let repo = InMemoryRepository::new();
    let player = player(&repo, &RecordingEventSink::new());
    let user = UserId::new("learner");
    // Only a wrong answer leads anywhere, so a right one keeps the learner here.
    let scenario = ScenarioDefinition::new(
        "stuck",
        "Stuck",
        "quiz",
        vec![
            ScenarioNode::new("quiz", "Quick check.")
                .with_question(types_question())
                .connect(outcome::INCORRECT, Some("review")),
            ScenarioNode::new("review", "Let us review."),
        ],
    )
    .unwrap();

    let mut active = player
        .start_with(scenario, Some(user.clone()))
        .await
        .unwrap();
    let mut deltas = Vec::new();
    for _ in 0..3 {
        let result = player
            .submit_answer(&mut active, Some("compiler"))
            .await
            .unwrap();
        assert!(matches!(result.transition, Ok(Transition::Stalled { .. })));
        deltas.push((result.evaluation.score_delta, result.mastery.is_some()));
    }
    assert_eq!(deltas, vec![(10, true), (0, false), (0, false)]);
    assert_eq!(active.session().score(), 10);

    let profile = repo.get_profile(&user).await.unwrap().expect("profile");
    let kc = profile.component(&"types.basics".into()).unwrap();
    assert_eq!(kc.total_attempts, 1);
    assert_eq!(kc.successful_attempts, 1);
    assert!((kc.mastery_level - 0.325).abs() < 1e-9);
}

#[tokio::test]
async fn resume_rejects_a_broken_stored_scenario() {
    let repo = InMemoryRepository::new();
    let broken = ScenarioDefinition::new(
        "broken",
        "Broken",
        "quiz",
        vec![
            ScenarioNode::new("quiz", "Quick check.")
                .with_question(types_question())
                .connect(outcome::CORRECT, Some("ghost")),
        ],
    )
    .unwrap();
    repo.upsert_scenario(&broken).await.unwrap();
    let session = ScenarioEngine::new(&broken)
        .start(SessionId::generate(), None, fixed_now())
        .unwrap();
    repo.save_session(&session).await.unwrap();

    let player = player(&repo, &RecordingEventSink::new());
    let err = player.resume(session.id).await.unwrap_err();
    assert!(matches!(
        err,
        PlayerError::Definition(DefinitionError::DanglingConnection { .. })
    ));
}

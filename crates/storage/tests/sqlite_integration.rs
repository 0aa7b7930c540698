use chrono::Duration;
use tutor_core::engine::ScenarioEngine;
use tutor_core::model::{
    Attempt, EventKind, EventPayload, InteractionEvent, LearnerProfile, Question,
    ScenarioDefinition, ScenarioNode, SessionId, SessionStatus, UserId, outcome,
};
use tutor_core::policy::MasteryPolicy;
use tutor_core::time::fixed_now;
use storage::repository::{
    EventLogRepository, ProfileRepository, ScenarioRepository, SessionRepository, Storage,
    StorageError,
};
use storage::sqlite::SqliteRepository;

fn build_scenario() -> ScenarioDefinition {
    let question = Question {
        prompt: "Pick one".into(),
        options: Vec::new(),
        correct_answer: "a".into(),
        explanation: None,
        knowledge_component: Some("kc-1".into()),
    };
    ScenarioDefinition::new(
        "onboarding",
        "Onboarding",
        "A",
        vec![
            ScenarioNode::new("A", "Welcome").connect(outcome::NEXT, Some("B")),
            ScenarioNode::new("B", "Quiz")
                .with_question(question)
                .connect(outcome::CORRECT, Some("C"))
                .connect(outcome::INCORRECT, Some("A")),
            ScenarioNode::new("C", "Done"),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_roundtrip_persists_scenarios() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_scenarios?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let scenario = build_scenario();
    repo.upsert_scenario(&scenario).await.unwrap();
    repo.upsert_scenario(&scenario).await.unwrap();

    let fetched = repo.get_scenario(scenario.id()).await.expect("fetch");
    assert_eq!(fetched, scenario);
    assert_eq!(fetched.total_nodes(), 3);
    assert_eq!(
        repo.list_scenarios().await.unwrap(),
        vec![scenario.id().clone()]
    );

    let missing = repo.get_scenario(&"missing".into()).await;
    assert!(matches!(missing, Err(StorageError::NotFound)));
}

#[tokio::test]
async fn sqlite_roundtrip_persists_sessions() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_sessions?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let scenario = build_scenario();
    let engine = ScenarioEngine::new(&scenario);
    let user = UserId::new("learner-1");
    let mut session = engine
        .start(SessionId::generate(), Some(user.clone()), fixed_now())
        .unwrap();
    repo.save_session(&session).await.unwrap();

    engine
        .follow(&mut session, outcome::NEXT, fixed_now() + Duration::seconds(5))
        .unwrap();
    repo.save_session(&session).await.unwrap();

    let fetched = repo.get_session(session.id).await.unwrap();
    assert_eq!(fetched, session);
    assert_eq!(fetched.current_node_id.as_str(), "B");
    assert_eq!(fetched.progress.percent_complete, 33);
    assert_eq!(fetched.status, SessionStatus::Active);

    let later = engine
        .start(SessionId::generate(), Some(user.clone()), fixed_now() + Duration::hours(1))
        .unwrap();
    repo.save_session(&later).await.unwrap();

    let history = repo.sessions_for_user(&user).await.unwrap();
    let ids: Vec<SessionId> = history.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![session.id, later.id]);
}

#[tokio::test]
async fn sqlite_roundtrip_persists_profiles() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_profiles?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let user = UserId::new("learner-2");
    assert!(repo.get_profile(&user).await.unwrap().is_none());

    let policy = MasteryPolicy::default();
    let mut profile = LearnerProfile::new(user.clone());
    let kc = "kc-1".into();
    profile.record_attempt(&kc, &Attempt::new(true), &policy, fixed_now());
    profile.record_attempt(&kc, &Attempt::new(true), &policy, fixed_now());
    repo.save_profile(&profile).await.unwrap();

    let fetched = repo.get_profile(&user).await.unwrap().expect("profile");
    let component = fetched.component(&kc).expect("component");
    assert_eq!(component.total_attempts, 2);
    assert_eq!(component.interaction_history.len(), 2);
    let expected = profile.mastery_of(&kc).unwrap();
    assert!((component.mastery_level - expected).abs() < 1e-12);
}

#[tokio::test]
async fn sqlite_event_log_preserves_append_order() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_events?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let session_id = SessionId::generate();
    let other = SessionId::generate();
    let user = Some(UserId::new("learner-3"));

    let started = InteractionEvent::new(
        session_id,
        user.clone(),
        fixed_now(),
        EventPayload::SessionStarted {
            scenario_id: "onboarding".into(),
            entry_node_id: "A".into(),
        },
    );
    let noise = InteractionEvent::new(
        other,
        None,
        fixed_now(),
        EventPayload::ContentViewed {
            node_id: "A".into(),
        },
    );
    let moved = InteractionEvent::new(
        session_id,
        user,
        fixed_now() + Duration::seconds(3),
        EventPayload::Navigation {
            from: "A".into(),
            to: "B".into(),
            outcome: Some(outcome::NEXT.to_string()),
        },
    );

    let first = repo.append_event(&started).await.unwrap();
    repo.append_event(&noise).await.unwrap();
    let third = repo.append_event(&moved).await.unwrap();
    assert!(third > first);

    let events = repo.events_for_session(session_id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event, started);
    assert_eq!(events[1].event, moved);
    assert_eq!(events[1].event.kind(), EventKind::Navigation);
}

#[tokio::test]
async fn storage_sqlite_wires_all_repositories() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");

    let scenario = build_scenario();
    storage.scenarios.upsert_scenario(&scenario).await.unwrap();
    let loaded = storage.scenarios.get_scenario(scenario.id()).await.unwrap();
    assert_eq!(loaded.entry_node_id().as_str(), "A");

    // Migrations are idempotent on an already-initialized database.
    let repo = SqliteRepository::connect("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .unwrap();
    repo.migrate().await.unwrap();
}

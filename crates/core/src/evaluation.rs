//! Grading of a single node's question.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::engine::{ScenarioEngine, TransitionError};
use crate::model::{KnowledgeComponentId, NodeId, ScenarioSession, outcome};
use crate::policy::ScoringPolicy;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// A submission was rejected before touching the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("no answer was selected")]
    MissingAnswer,

    #[error("node {0} has no question to answer")]
    NoQuestion(NodeId),

    #[error("{answer:?} is not an option on node {node}")]
    UnknownOption { node: NodeId, answer: String },

    #[error("node {node} allows at most {max} attempts")]
    AttemptsExhausted { node: NodeId, max: u32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvaluationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

//
// ─── EVALUATION ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub node_id: NodeId,
    pub answer: String,
    pub correct: bool,
    /// Points actually added to the session by this submission.
    pub score_delta: i64,
    pub attempt: u32,
    pub first_attempt_success: bool,
    /// Connection key the caller should follow next.
    pub outcome: &'static str,
    pub explanation: Option<String>,
    pub knowledge_component: Option<KnowledgeComponentId>,
}

/// Grades submissions against the current node's question.
#[derive(Debug, Clone, Default)]
pub struct AnswerEvaluator {
    scoring: ScoringPolicy,
}

impl AnswerEvaluator {
    #[must_use]
    pub fn new(scoring: ScoringPolicy) -> Self {
        Self { scoring }
    }

    /// Final submission of `selected` for the session's current node.
    ///
    /// Every submission counts as an attempt. The correct-answer award is
    /// granted at most once per node, so re-submitting a correct answer
    /// never adds score twice.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for malformed submissions and
    /// `TransitionError` for closed sessions or unknown nodes. Neither
    /// modifies the session.
    pub fn submit(
        &self,
        engine: &ScenarioEngine<'_>,
        session: &mut ScenarioSession,
        selected: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, EvaluationError> {
        if session.status.is_closed() {
            return Err(TransitionError::SessionClosed(session.status).into());
        }
        let node = engine.current_node(session)?;
        let question = node
            .question
            .as_ref()
            .ok_or_else(|| ValidationError::NoQuestion(node.id.clone()))?;

        let answer = selected
            .filter(|a| !a.trim().is_empty())
            .ok_or(ValidationError::MissingAnswer)?;
        if !question.accepts(answer) {
            return Err(ValidationError::UnknownOption {
                node: node.id.clone(),
                answer: answer.to_owned(),
            }
            .into());
        }

        let prior_attempts = session.response(&node.id).map_or(0, |r| r.attempts);
        if let Some(max) = self.scoring.max_attempts {
            if prior_attempts >= max {
                return Err(ValidationError::AttemptsExhausted {
                    node: node.id.clone(),
                    max,
                }
                .into());
            }
        }

        let correct = question.is_correct(answer);
        let attempt = engine
            .record_response(session, &node.id, answer, correct, now)?
            .attempts;

        let mut score_delta = 0;
        if correct {
            if let Some(response) = session.responses.get_mut(&node.id) {
                if !response.scored {
                    response.scored = true;
                    score_delta = self.scoring.correct_award;
                }
            }
        }
        session.progress.score = session.progress.score.saturating_add(score_delta);

        Ok(Evaluation {
            node_id: node.id.clone(),
            answer: answer.to_owned(),
            correct,
            score_delta,
            attempt,
            first_attempt_success: correct && attempt == 1,
            outcome: if correct {
                outcome::CORRECT
            } else {
                outcome::INCORRECT
            },
            explanation: question.explanation.clone(),
            knowledge_component: question.knowledge_component.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AnswerOption, Question, ScenarioDefinition, ScenarioNode, SessionId,
    };
    use crate::time::fixed_now;

    fn quiz() -> ScenarioDefinition {
        ScenarioDefinition::new(
            "quiz",
            "Quiz",
            "q1",
            vec![
                ScenarioNode::new("q1", "Capital of France?")
                    .with_question(Question {
                        prompt: "Pick".into(),
                        options: vec![
                            AnswerOption::new("paris", "Paris", true),
                            AnswerOption::new("lyon", "Lyon", false),
                        ],
                        correct_answer: "paris".into(),
                        explanation: Some("Paris is the capital.".into()),
                        knowledge_component: Some("geo.capitals".into()),
                    })
                    .connect(outcome::CORRECT, Some("done")),
                ScenarioNode::new("done", "Well done"),
            ],
        )
        .unwrap()
    }

    fn session(def: &ScenarioDefinition) -> ScenarioSession {
        ScenarioEngine::new(def)
            .start(SessionId::generate(), None, fixed_now())
            .unwrap()
    }

    #[test]
    fn correct_answer_awards_once() {
        let def = quiz();
        let engine = ScenarioEngine::new(&def);
        let evaluator = AnswerEvaluator::default();
        let mut s = session(&def);

        let first = evaluator
            .submit(&engine, &mut s, Some("paris"), fixed_now())
            .unwrap();
        let second = evaluator
            .submit(&engine, &mut s, Some("paris"), fixed_now())
            .unwrap();

        assert!(first.correct && first.first_attempt_success);
        assert_eq!(first.score_delta, 10);
        assert_eq!(second.score_delta, 0);
        assert_eq!(second.attempt, 2);
        assert_eq!(s.score(), 10);
        assert_eq!(first.outcome, outcome::CORRECT);
        assert_eq!(first.knowledge_component, Some("geo.capitals".into()));
    }

    #[test]
    fn retry_until_correct_counts_attempts() {
        let def = quiz();
        let engine = ScenarioEngine::new(&def);
        let evaluator = AnswerEvaluator::default();
        let mut s = session(&def);

        let wrong = evaluator
            .submit(&engine, &mut s, Some("lyon"), fixed_now())
            .unwrap();
        assert!(!wrong.correct);
        assert_eq!(wrong.score_delta, 0);
        assert_eq!(wrong.outcome, outcome::INCORRECT);

        let right = evaluator
            .submit(&engine, &mut s, Some("paris"), fixed_now())
            .unwrap();
        assert_eq!(right.attempt, 2);
        assert!(!right.first_attempt_success);
        assert_eq!(right.score_delta, 10);
    }

    #[test]
    fn malformed_submissions_leave_session_untouched() {
        let def = quiz();
        let engine = ScenarioEngine::new(&def);
        let evaluator = AnswerEvaluator::default();
        let mut s = session(&def);
        let before = s.clone();

        let missing = evaluator.submit(&engine, &mut s, None, fixed_now());
        let blank = evaluator.submit(&engine, &mut s, Some("  "), fixed_now());
        let unknown = evaluator.submit(&engine, &mut s, Some("berlin"), fixed_now());

        assert_eq!(
            missing.unwrap_err(),
            EvaluationError::Validation(ValidationError::MissingAnswer)
        );
        assert!(matches!(
            blank.unwrap_err(),
            EvaluationError::Validation(ValidationError::MissingAnswer)
        ));
        assert!(matches!(
            unknown.unwrap_err(),
            EvaluationError::Validation(ValidationError::UnknownOption { .. })
        ));
        assert_eq!(s, before);
    }

    #[test]
    fn retry_cap_is_enforced_when_configured() {
        let def = quiz();
        let engine = ScenarioEngine::new(&def);
        let evaluator = AnswerEvaluator::new(ScoringPolicy {
            max_attempts: Some(1),
            ..ScoringPolicy::default()
        });
        let mut s = session(&def);

        evaluator
            .submit(&engine, &mut s, Some("lyon"), fixed_now())
            .unwrap();
        let err = evaluator
            .submit(&engine, &mut s, Some("paris"), fixed_now())
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Validation(ValidationError::AttemptsExhausted { max: 1, .. })
        ));
    }

    #[test]
    fn nodes_without_questions_reject_answers() {
        let def = quiz();
        let engine = ScenarioEngine::new(&def);
        let mut s = session(&def);
        engine.advance(&mut s, &"done".into(), fixed_now()).unwrap();

        let err = AnswerEvaluator::default()
            .submit(&engine, &mut s, Some("paris"), fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            EvaluationError::Validation(ValidationError::NoQuestion("done".into()))
        );
    }
}

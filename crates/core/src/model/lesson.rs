//! Question-by-question state for a linear practice lesson.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::content::DifficultyTier;
use crate::model::ids::ContentAtomId;
use crate::policy::ScoringPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonAnswer {
    pub question_index: usize,
    pub atom_id: ContentAtomId,
    pub difficulty: DifficultyTier,
    pub answer: String,
    pub correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonState {
    pub current_index: usize,
    pub total_questions: usize,
    pub score: i64,
    pub streak: u32,
    pub best_streak: u32,
    pub answers: Vec<LessonAnswer>,
}

impl LessonState {
    #[must_use]
    pub fn new(total_questions: usize) -> Self {
        Self {
            current_index: 0,
            total_questions,
            score: 0,
            streak: 0,
            best_streak: 0,
            answers: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_index >= self.total_questions
    }

    /// Record an answer for the current question and return the score delta.
    pub fn record_answer(
        &mut self,
        atom_id: ContentAtomId,
        difficulty: DifficultyTier,
        answer: impl Into<String>,
        correct: bool,
        answered_at: DateTime<Utc>,
        scoring: &ScoringPolicy,
    ) -> i64 {
        self.answers.push(LessonAnswer {
            question_index: self.current_index,
            atom_id,
            difficulty,
            answer: answer.into(),
            correct,
            answered_at,
        });

        if correct {
            self.streak = self.streak.saturating_add(1);
            self.best_streak = self.best_streak.max(self.streak);
            self.score = self.score.saturating_add(scoring.correct_award);
            scoring.correct_award
        } else {
            self.streak = 0;
            0
        }
    }

    /// Move to the next question; no-op once the lesson is complete.
    pub fn advance(&mut self) {
        if !self.is_complete() {
            self.current_index += 1;
        }
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.answers.is_empty() {
            return 0.0;
        }
        let correct = self.answers.iter().filter(|a| a.correct).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = correct as f64 / self.answers.len() as f64;
        ratio
    }
}

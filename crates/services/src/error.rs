//! Shared error types for the services crate.

use thiserror::Error;

use tutor_core::engine::TransitionError;
use tutor_core::evaluation::EvaluationError;
use tutor_core::model::{ContentAtomId, DefinitionError};
use tutor_core::policy::PolicyError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ScenarioPlayer`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("scenario could not be loaded: {0}")]
    Load(#[from] StorageError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Errors emitted by `LessonService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson has no content")]
    Empty,
    #[error("lesson already completed")]
    Completed,
    #[error("content atom {0} has no answer to grade against")]
    NotGradable(ContentAtomId),
}

/// Errors emitted while bootstrapping services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

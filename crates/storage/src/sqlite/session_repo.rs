use tutor_core::model::{ScenarioSession, SessionId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, from_document, to_document};
use crate::repository::{SessionRepository, StorageError};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn save_session(&self, session: &ScenarioSession) -> Result<(), StorageError> {
        let document = to_document(session)?;

        sqlx::query(
            r"
            INSERT INTO scenario_sessions (
                id, scenario_id, user_id, status, percent_complete, score,
                started_at, last_active_at, document
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                percent_complete = excluded.percent_complete,
                score = excluded.score,
                last_active_at = excluded.last_active_at,
                document = excluded.document
            ",
        )
        .bind(session.id.to_string())
        .bind(session.scenario_id.as_str())
        .bind(session.user_id.as_ref().map(UserId::as_str))
        .bind(session.status.as_str())
        .bind(i64::from(session.progress.percent_complete))
        .bind(session.progress.score)
        .bind(session.started_at)
        .bind(session.last_active_at)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<ScenarioSession, StorageError> {
        let row = sqlx::query("SELECT document FROM scenario_sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        from_document(&row, "document")
    }

    async fn sessions_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ScenarioSession>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT document FROM scenario_sessions
            WHERE user_id = ?1
            ORDER BY started_at ASC, id ASC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(|row| from_document(row, "document")).collect()
    }
}

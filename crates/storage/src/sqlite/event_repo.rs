use sqlx::Row;
use tutor_core::model::{EventPayload, InteractionEvent, SessionId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, from_document, ser, to_document};
use crate::repository::{EventLogRepository, EventRecord, StorageError};

#[async_trait::async_trait]
impl EventLogRepository for SqliteRepository {
    async fn append_event(&self, event: &InteractionEvent) -> Result<i64, StorageError> {
        let payload = to_document(&event.payload)?;

        let res = sqlx::query(
            r"
            INSERT INTO interaction_events (session_id, user_id, kind, occurred_at, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(event.session_id.to_string())
        .bind(event.user_id.as_ref().map(UserId::as_str))
        .bind(event.kind().as_str())
        .bind(event.occurred_at)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn events_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, occurred_at, payload
            FROM interaction_events
            WHERE session_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| -> Result<EventRecord, StorageError> {
                let payload: EventPayload = from_document(row, "payload")?;
                let user_id: Option<String> = row.try_get("user_id").map_err(ser)?;
                Ok(EventRecord {
                    id: row.try_get("id").map_err(ser)?,
                    event: InteractionEvent::new(
                        session_id,
                        user_id.map(UserId::new),
                        row.try_get("occurred_at").map_err(ser)?,
                        payload,
                    ),
                })
            })
            .collect()
    }
}

use chrono::Utc;
use sqlx::Row;
use tutor_core::model::{ScenarioDefinition, ScenarioDocument, ScenarioId};

use super::SqliteRepository;
use super::mapping::{conn, count_to_i64, from_document, ser, to_document};
use crate::repository::{ScenarioRepository, StorageError};

#[async_trait::async_trait]
impl ScenarioRepository for SqliteRepository {
    async fn upsert_scenario(&self, scenario: &ScenarioDefinition) -> Result<(), StorageError> {
        let document = to_document(scenario)?;
        let total = count_to_i64("total_nodes", scenario.total_nodes())?;

        sqlx::query(
            r"
            INSERT INTO scenarios (id, title, total_nodes, document, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                total_nodes = excluded.total_nodes,
                document = excluded.document,
                updated_at = excluded.updated_at
            ",
        )
        .bind(scenario.id().as_str())
        .bind(scenario.title())
        .bind(total)
        .bind(document)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_scenario(&self, id: &ScenarioId) -> Result<ScenarioDefinition, StorageError> {
        let row = sqlx::query("SELECT document FROM scenarios WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        // Stored documents are re-validated so a hand-edited row cannot
        // produce a graph with dangling targets.
        let document: ScenarioDocument = from_document(&row, "document")?;
        ScenarioDefinition::load(document).map_err(ser)
    }

    async fn list_scenarios(&self) -> Result<Vec<ScenarioId>, StorageError> {
        let rows = sqlx::query("SELECT id FROM scenarios ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("id")
                    .map(ScenarioId::new)
                    .map_err(ser)
            })
            .collect()
    }
}

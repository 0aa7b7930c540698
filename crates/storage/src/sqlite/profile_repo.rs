use chrono::Utc;
use tutor_core::model::{LearnerProfile, UserId};

use super::SqliteRepository;
use super::mapping::{conn, count_to_i64, from_document, to_document};
use crate::repository::{ProfileRepository, StorageError};

#[async_trait::async_trait]
impl ProfileRepository for SqliteRepository {
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<LearnerProfile>, StorageError> {
        let row = sqlx::query("SELECT document FROM learner_profiles WHERE user_id = ?1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.map(|r| from_document(&r, "document")).transpose()
    }

    async fn save_profile(&self, profile: &LearnerProfile) -> Result<(), StorageError> {
        let document = to_document(profile)?;
        let completed = count_to_i64("completed_kcs", profile.completed_kcs)?;

        sqlx::query(
            r"
            INSERT INTO learner_profiles (user_id, overall_mastery, completed_kcs, document, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id) DO UPDATE SET
                overall_mastery = excluded.overall_mastery,
                completed_kcs = excluded.completed_kcs,
                document = excluded.document,
                updated_at = excluded.updated_at
            ",
        )
        .bind(profile.user_id.as_str())
        .bind(profile.overall_mastery)
        .bind(completed)
        .bind(document)
        .bind(profile.updated_at.unwrap_or_else(Utc::now))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}

// crates/db/src/queries/processed_chats.rs
//! `mark_processed` / `is_chat_processed` (§4.3). Read at upload start
//! unless `force_reprocess` is requested (§4.10).

use crate::DbResult;
use chrono::Utc;
use sqlx::SqlitePool;

/// True if `chat_id` has a ProcessedChat row from a prior successful
/// upload.
pub async fn is_chat_processed(pool: &SqlitePool, chat_id: &str) -> DbResult<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM processed_chats WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

/// Records every chat in `chat_ids` as processed, with its message count
/// looked up from the conversations table. Called at successful upload
/// completion (§3, §4.10); `force_reprocess` lets a chat be re-marked with
/// updated counts.
pub async fn mark_processed(pool: &SqlitePool, chat_ids: &[String]) -> DbResult<()> {
    let now = Utc::now().to_rfc3339();
    for chat_id in chat_ids {
        let count: Option<(i64,)> =
            sqlx::query_as("SELECT total_messages FROM conversations WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_optional(pool)
                .await?;
        let message_count = count.map(|(c,)| c).unwrap_or(0);

        sqlx::query(
            r#"
            INSERT INTO processed_chats (chat_id, processed_at, message_count)
            VALUES (?, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                processed_at = excluded.processed_at,
                message_count = excluded.message_count
            "#,
        )
        .bind(chat_id)
        .bind(&now)
        .bind(message_count)
        .execute(pool)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn unprocessed_chat_reports_false() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(!is_chat_processed(db.pool(), "C1").await.unwrap());
    }

    #[tokio::test]
    async fn mark_processed_then_is_processed_true() {
        let db = Database::new_in_memory().await.unwrap();
        mark_processed(db.pool(), &["C1".to_string()]).await.unwrap();
        assert!(is_chat_processed(db.pool(), "C1").await.unwrap());
    }

    #[tokio::test]
    async fn remarking_is_idempotent_on_row_count() {
        let db = Database::new_in_memory().await.unwrap();
        mark_processed(db.pool(), &["C1".to_string()]).await.unwrap();
        mark_processed(db.pool(), &["C1".to_string()]).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processed_chats")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}

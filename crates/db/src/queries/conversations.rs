// crates/db/src/queries/conversations.rs
//! `upsert_conversation` (§4.3). Keyed on `chat_id`; idempotent.

use crate::DbResult;
use chrono::{DateTime, Utc};
use serde_json;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;

/// Summary derived by the grouper (C2), fed into the upsert.
#[derive(Debug, Clone)]
pub struct ConversationMetadata {
    pub customer_name: Option<String>,
    pub total_messages: i64,
    pub customer_messages: i64,
    pub agent_messages: i64,
    pub first_message_time: DateTime<Utc>,
    pub last_message_time: DateTime<Utc>,
    pub common_topics: BTreeSet<String>,
}

/// The row id and whether this call created it (vs. refreshed an existing
/// one on conflict) — the persistence gateway never returns this as an
/// error, per the idempotence contract in §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertedConversation {
    pub id: i64,
    pub created: bool,
}

/// Inserts a new Conversation row, or — on a `chat_id` conflict — refreshes
/// its counters and timestamps from the latest ingest and returns the
/// existing row's id (§4.3 idempotence, §3 "mutated by ingest only").
pub async fn upsert_conversation(
    pool: &SqlitePool,
    chat_id: &str,
    metadata: &ConversationMetadata,
) -> DbResult<UpsertedConversation> {
    let now = Utc::now();
    let topics = serde_json::to_string(&metadata.common_topics)?;

    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM conversations WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(pool)
            .await?;

    if let Some((id,)) = existing {
        sqlx::query(
            r#"
            UPDATE conversations SET
                customer_name = ?,
                total_messages = ?,
                customer_messages = ?,
                agent_messages = ?,
                first_message_time = ?,
                last_message_time = ?,
                common_topics = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&metadata.customer_name)
        .bind(metadata.total_messages)
        .bind(metadata.customer_messages)
        .bind(metadata.agent_messages)
        .bind(metadata.first_message_time.to_rfc3339())
        .bind(metadata.last_message_time.to_rfc3339())
        .bind(topics)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

        return Ok(UpsertedConversation { id, created: false });
    }

    let row = sqlx::query(
        r#"
        INSERT INTO conversations (
            chat_id, customer_name, total_messages, customer_messages,
            agent_messages, first_message_time, last_message_time,
            common_topics, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(chat_id)
    .bind(&metadata.customer_name)
    .bind(metadata.total_messages)
    .bind(metadata.customer_messages)
    .bind(metadata.agent_messages)
    .bind(metadata.first_message_time.to_rfc3339())
    .bind(metadata.last_message_time.to_rfc3339())
    .bind(topics)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .fetch_one(pool)
    .await?;

    Ok(UpsertedConversation {
        id: row.get(0),
        created: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn metadata() -> ConversationMetadata {
        let t = Utc::now();
        ConversationMetadata {
            customer_name: Some("Ada".to_string()),
            total_messages: 2,
            customer_messages: 1,
            agent_messages: 1,
            first_message_time: t,
            last_message_time: t,
            common_topics: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn first_upsert_creates_row() {
        let db = Database::new_in_memory().await.unwrap();
        let result = upsert_conversation(db.pool(), "C1", &metadata()).await.unwrap();
        assert!(result.created);
    }

    #[tokio::test]
    async fn repeat_upsert_is_idempotent_on_chat_id() {
        let db = Database::new_in_memory().await.unwrap();
        let first = upsert_conversation(db.pool(), "C1", &metadata()).await.unwrap();
        let second = upsert_conversation(db.pool(), "C1", &metadata()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(!second.created);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}

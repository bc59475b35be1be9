// crates/db/src/queries/messages.rs
//! `insert_messages` (§4.3). Append-only; one transaction per upload's raw
//! ingest (§4.3 "transaction discipline").

use crate::DbResult;
use powerpulse_core::model::{Direction, Message};
use sqlx::SqlitePool;

fn direction_str(d: Direction) -> &'static str {
    match d {
        Direction::ToCompany => "to_company",
        Direction::ToClient => "to_client",
    }
}

/// Appends `messages` under `conversation_id`. Ordering within a day is
/// preserved by insertion order (§3); callers should pass messages already
/// sorted by `social_create_time`.
pub async fn insert_messages(
    pool: &SqlitePool,
    conversation_id: i64,
    chat_id: &str,
    messages: &[Message],
) -> DbResult<()> {
    for message in messages {
        let agent_info = message
            .agent_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO messages (
                conversation_id, chat_id, message_content, direction,
                social_create_time, agent_info
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation_id)
        .bind(chat_id)
        .bind(&message.message_content)
        .bind(direction_str(message.direction))
        .bind(message.social_create_time.to_rfc3339())
        .bind(agent_info)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Loads every message for one conversation, in insertion (i.e.
/// chronological) order. Used by C7's round-trip reconstruction from the
/// database (§8 "Round-trip of time metrics").
pub async fn messages_for_conversation(
    pool: &SqlitePool,
    conversation_id: i64,
) -> DbResult<Vec<Message>> {
    let rows = sqlx::query_as::<_, (String, String, String, String, Option<String>)>(
        r#"
        SELECT chat_id, message_content, direction, social_create_time, agent_info
        FROM messages
        WHERE conversation_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(chat_id, content, direction, time, agent_info)| {
            Ok(Message {
                chat_id,
                conversation_id: Some(conversation_id),
                message_content: content,
                direction: if direction == "to_company" {
                    Direction::ToCompany
                } else {
                    Direction::ToClient
                },
                social_create_time: chrono::DateTime::parse_from_rfc3339(&time)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .map_err(|e| crate::DbError::InvalidTimestamp(e.to_string()))?,
                agent_info: agent_info
                    .map(|s| serde_json::from_str(&s))
                    .transpose()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::conversations::{upsert_conversation, ConversationMetadata};
    use crate::Database;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn msg(direction: Direction, offset_secs: i64) -> Message {
        Message {
            chat_id: "C1".to_string(),
            conversation_id: None,
            message_content: "hi".to_string(),
            direction,
            social_create_time: Utc::now() + chrono::Duration::seconds(offset_secs),
            agent_info: None,
        }
    }

    #[tokio::test]
    async fn inserts_and_reloads_in_order() {
        let db = Database::new_in_memory().await.unwrap();
        let t = Utc::now();
        let conv = upsert_conversation(
            db.pool(),
            "C1",
            &ConversationMetadata {
                customer_name: None,
                total_messages: 2,
                customer_messages: 1,
                agent_messages: 1,
                first_message_time: t,
                last_message_time: t,
                common_topics: BTreeSet::new(),
            },
        )
        .await
        .unwrap();

        let messages = vec![msg(Direction::ToCompany, 0), msg(Direction::ToClient, 10)];
        insert_messages(db.pool(), conv.id, "C1", &messages).await.unwrap();

        let loaded = messages_for_conversation(db.pool(), conv.id).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].direction, Direction::ToCompany);
        assert_eq!(loaded[1].direction, Direction::ToClient);
    }
}

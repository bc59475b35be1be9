// crates/core/src/grouper.rs
//! Grouper (C2, §4.2). Groups validated messages by `chat_id`, then by UTC
//! calendar day, and derives per-chat conversation summaries.

use crate::model::{Conversation, DayGroup, Direction, Message};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;

/// Per-chat summary derived while grouping, feeding `upsert_conversation`
/// (C3).
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub chat_id: String,
    pub total_messages: i64,
    pub customer_messages: i64,
    pub agent_messages: i64,
    pub first_message_time: chrono::DateTime<Utc>,
    pub last_message_time: chrono::DateTime<Utc>,
}

impl ConversationSummary {
    pub fn into_conversation(self, customer_name: Option<String>) -> Conversation {
        let now = self.first_message_time;
        Conversation {
            id: None,
            chat_id: self.chat_id,
            customer_name,
            total_messages: self.total_messages,
            customer_messages: self.customer_messages,
            agent_messages: self.agent_messages,
            first_message_time: self.first_message_time,
            last_message_time: self.last_message_time,
            common_topics: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of grouping one chat's validated messages.
pub struct GroupedChat {
    pub summary: ConversationSummary,
    pub days: Vec<DayGroup>,
}

/// Groups one chat's messages by day (§4.2). Messages must already be
/// validated (C1); `messages` need not arrive pre-sorted.
pub fn group_chat(chat_id: &str, mut messages: Vec<Message>) -> Option<GroupedChat> {
    if messages.is_empty() {
        return None;
    }

    messages.sort_by_key(|m| m.social_create_time);

    let total = messages.len() as i64;
    let customer = messages
        .iter()
        .filter(|m| m.direction == Direction::ToCompany)
        .count() as i64;
    let agent = messages
        .iter()
        .filter(|m| m.direction == Direction::ToClient)
        .count() as i64;
    let first_message_time = messages.first().unwrap().social_create_time;
    let last_message_time = messages.last().unwrap().social_create_time;

    let mut by_day: BTreeMap<NaiveDate, Vec<Message>> = BTreeMap::new();
    for m in messages {
        let day = m.social_create_time.date_naive();
        by_day.entry(day).or_default().push(m);
    }

    let days = by_day
        .into_iter()
        .map(|(analysis_date, messages)| DayGroup {
            chat_id: chat_id.to_string(),
            analysis_date,
            messages,
        })
        .collect();

    Some(GroupedChat {
        summary: ConversationSummary {
            chat_id: chat_id.to_string(),
            total_messages: total,
            customer_messages: customer,
            agent_messages: agent,
            first_message_time,
            last_message_time,
        },
        days,
    })
}

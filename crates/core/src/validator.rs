// crates/core/src/validator.rs
//! Message validator (C1, §4.1). Accepts a raw upload record and yields
//! either a normalized `Message` or a `RejectionReason`.

use crate::error::RejectionReason;
use crate::model::{Direction, Message};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One message exactly as it appears in the upload JSON (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(rename = "MESSAGE_CONTENT")]
    pub message_content: Option<serde_json::Value>,
    #[serde(rename = "DIRECTION")]
    pub direction: Option<String>,
    #[serde(rename = "SOCIAL_CREATE_TIME")]
    pub social_create_time: Option<String>,
    #[serde(rename = "AGENT_USERNAME")]
    pub agent_username: Option<String>,
    #[serde(rename = "AGENT_EMAIL")]
    pub agent_email: Option<String>,
}

/// Validates and normalizes one raw message for one `chat_id`.
///
/// Rejection order follows §4.1: content type, then direction, then
/// timestamp, then the auto-reply sentence — content must already be a
/// valid string before it can be compared against the sentence.
pub fn validate(
    chat_id: &str,
    raw: &RawMessage,
    autoresponse_sentence: &str,
    substring_match: bool,
) -> Result<Message, RejectionReason> {
    let content = match &raw.message_content {
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => return Err(RejectionReason::InvalidContent),
    };

    let direction = match raw.direction.as_deref() {
        Some("to_company") => Direction::ToCompany,
        Some("to_client") => Direction::ToClient,
        _ => return Err(RejectionReason::InvalidDirection),
    };

    let social_create_time = raw
        .social_create_time
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(RejectionReason::InvalidTimestamp)?;

    let is_autoresponse = if substring_match {
        content.contains("*977#")
    } else {
        content == autoresponse_sentence
    };
    if is_autoresponse {
        return Err(RejectionReason::Autoresponse);
    }

    let agent_info = if raw.agent_username.is_some() || raw.agent_email.is_some() {
        Some(serde_json::json!({
            "agent_username": raw.agent_username,
            "agent_email": raw.agent_email,
        }))
    } else {
        None
    };

    Ok(Message {
        chat_id: chat_id.to_string(),
        conversation_id: None,
        message_content: content,
        direction,
        social_create_time,
        agent_info,
    })
}

/// Tally of rejections across one upload, reported via the progress
/// tracker's `statistics` (§4.9).
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationStats {
    pub filtered_autoresponses: u64,
    pub filtered_invalid: u64,
}

impl ValidationStats {
    pub fn record(&mut self, reason: &RejectionReason) {
        match reason {
            RejectionReason::Autoresponse => self.filtered_autoresponses += 1,
            _ => self.filtered_invalid += 1,
        }
    }
}

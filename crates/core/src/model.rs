// crates/core/src/model.rs
//! Domain entities shared by the core pipeline and the persistence gateway
//! (§3). These are plain data holders; behavior lives in the sibling
//! modules (`validator`, `grouper`, `scoring`, `time_metrics`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which side sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToCompany,
    ToClient,
}

/// A single normalized message, post-validation (C1).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub chat_id: String,
    pub conversation_id: Option<i64>,
    pub message_content: String,
    pub direction: Direction,
    pub social_create_time: DateTime<Utc>,
    pub agent_info: Option<serde_json::Value>,
}

/// One conversation thread, unique by `chat_id` (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: Option<i64>,
    pub chat_id: String,
    pub customer_name: Option<String>,
    pub total_messages: i64,
    pub customer_messages: i64,
    pub agent_messages: i64,
    pub first_message_time: DateTime<Utc>,
    pub last_message_time: DateTime<Utc>,
    pub common_topics: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Five micro-metrics the LLM adapter (C5) scores per unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiMetrics {
    pub sentiment_score: f64,
    pub sentiment_shift: f64,
    pub resolution_achieved: f64,
    pub fcr_score: f64,
    pub ces: f64,
}

impl AiMetrics {
    /// The fallback record used when the LLM response fails strict
    /// parsing (§4.5).
    pub fn fallback() -> Self {
        Self {
            sentiment_score: 5.0,
            sentiment_shift: 0.0,
            resolution_achieved: 5.0,
            fcr_score: 5.0,
            ces: 4.0,
        }
    }
}

/// Three time-derived micro-metrics computed by C7.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeMetrics {
    pub first_response_time: Option<f64>,
    pub avg_response_time: Option<f64>,
    pub total_handling_time: Option<f64>,
}

/// Four pillar scores and the composite CSI, computed by C8.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PillarScores {
    pub effectiveness_score: Option<f64>,
    pub effort_score: Option<f64>,
    pub efficiency_score: Option<f64>,
    pub empathy_score: Option<f64>,
    pub csi_score: Option<f64>,
}

/// One row per (Conversation, `analysis_date`) — the unit of scoring (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAnalysis {
    pub id: Option<i64>,
    pub conversation_id: i64,
    pub analysis_date: NaiveDate,
    pub ai: Option<AiMetrics>,
    pub time: TimeMetrics,
    pub pillars: PillarScores,
    pub error: Option<String>,
}

impl DailyAnalysis {
    pub fn empty(conversation_id: i64, analysis_date: NaiveDate) -> Self {
        Self {
            id: None,
            conversation_id,
            analysis_date,
            ai: None,
            time: TimeMetrics::default(),
            pillars: PillarScores::default(),
            error: None,
        }
    }
}

/// Lifecycle status of a Job (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A batch of DailyAnalysis rows dispatched to the LLM together (§3, §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Option<i64>,
    pub upload_id: String,
    pub status: JobStatus,
    pub daily_analysis_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
}

/// Marker row recording that a chat id has already been ingested (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedChat {
    pub chat_id: String,
    pub processed_at: DateTime<Utc>,
    pub message_count: i64,
}

/// A single cached aggregate row, rewritten wholesale after every upload
/// (§3, §4.8 "Aggregates").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_name: String,
    pub metric_value: f64,
    pub metric_metadata: Option<serde_json::Value>,
    pub calculated_at: DateTime<Utc>,
}

/// A (chat_id, day) grouping emitted by C2 — the grouper's unit of output,
/// consumed by C3 to seed a DailyAnalysis row and by C4 as a batching unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup {
    pub chat_id: String,
    pub analysis_date: NaiveDate,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_matches_spec_contract() {
        let f = AiMetrics::fallback();
        assert_eq!(f.sentiment_score, 5.0);
        assert_eq!(f.sentiment_shift, 0.0);
        assert_eq!(f.resolution_achieved, 5.0);
        assert_eq!(f.fcr_score, 5.0);
        assert_eq!(f.ces, 4.0);
    }

    #[test]
    fn empty_daily_analysis_has_no_metrics() {
        let d = DailyAnalysis::empty(1, NaiveDate::from_ymd_opt(2025, 8, 26).unwrap());
        assert!(d.ai.is_none());
        assert!(d.pillars.csi_score.is_none());
        assert!(d.error.is_none());
    }
}

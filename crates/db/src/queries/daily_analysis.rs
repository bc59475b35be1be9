// crates/db/src/queries/daily_analysis.rs
//! `create_daily_analysis` / `update_daily_analysis` (§4.3). Keyed on
//! (conversation_id, analysis_date); on conflict returns the existing row.

use crate::DbResult;
use chrono::NaiveDate;
use powerpulse_core::model::{AiMetrics, DailyAnalysis, PillarScores, TimeMetrics};
use sqlx::{Row, SqlitePool};

/// Creates an empty DailyAnalysis row for (conversation_id, analysis_date),
/// or returns the existing row's id on conflict (§4.3 idempotence).
pub async fn create_daily_analysis(
    pool: &SqlitePool,
    conversation_id: i64,
    analysis_date: NaiveDate,
) -> DbResult<i64> {
    if let Some((id,)) = sqlx::query_as::<_, (i64,)>(
        "SELECT id FROM daily_analyses WHERE conversation_id = ? AND analysis_date = ?",
    )
    .bind(conversation_id)
    .bind(analysis_date.to_string())
    .fetch_optional(pool)
    .await?
    {
        return Ok(id);
    }

    let row = sqlx::query(
        r#"
        INSERT INTO daily_analyses (conversation_id, analysis_date)
        VALUES (?, ?)
        ON CONFLICT(conversation_id, analysis_date) DO UPDATE SET conversation_id = excluded.conversation_id
        RETURNING id
        "#,
    )
    .bind(conversation_id)
    .bind(analysis_date.to_string())
    .fetch_one(pool)
    .await?;

    Ok(row.get(0))
}

/// The full set of computed metrics written on successful job completion,
/// or left absent (with `error` set) on failure (§3 "mutated exactly once
/// on successful job completion").
#[derive(Debug, Clone)]
pub struct DailyAnalysisUpdate {
    pub ai: Option<AiMetrics>,
    pub time: TimeMetrics,
    pub pillars: PillarScores,
    pub error: Option<String>,
}

/// Writes the final metrics for one DailyAnalysis row. Each job's result
/// update is its own transaction (§4.3) — callers invoke this once per
/// completed unit, not batched across a job, so one failing write cannot
/// roll back its siblings.
pub async fn update_daily_analysis(
    pool: &SqlitePool,
    id: i64,
    update: &DailyAnalysisUpdate,
) -> DbResult<()> {
    let ai = update.ai.as_ref();
    sqlx::query(
        r#"
        UPDATE daily_analyses SET
            sentiment_score = ?,
            sentiment_shift = ?,
            resolution_achieved = ?,
            fcr_score = ?,
            ces = ?,
            first_response_time = ?,
            avg_response_time = ?,
            total_handling_time = ?,
            effectiveness_score = ?,
            effort_score = ?,
            efficiency_score = ?,
            empathy_score = ?,
            csi_score = ?,
            error = ?
        WHERE id = ?
        "#,
    )
    .bind(ai.map(|a| a.sentiment_score))
    .bind(ai.map(|a| a.sentiment_shift))
    .bind(ai.map(|a| a.resolution_achieved))
    .bind(ai.map(|a| a.fcr_score))
    .bind(ai.map(|a| a.ces))
    .bind(update.time.first_response_time)
    .bind(update.time.avg_response_time)
    .bind(update.time.total_handling_time)
    .bind(update.pillars.effectiveness_score)
    .bind(update.pillars.effort_score)
    .bind(update.pillars.efficiency_score)
    .bind(update.pillars.empathy_score)
    .bind(update.pillars.csi_score)
    .bind(&update.error)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Loads one DailyAnalysis row by id, used when assembling Job results and
/// aggregate Metrics.
pub async fn get_daily_analysis(pool: &SqlitePool, id: i64) -> DbResult<Option<DailyAnalysis>> {
    let row = sqlx::query(
        r#"
        SELECT conversation_id, analysis_date, sentiment_score, sentiment_shift,
               resolution_achieved, fcr_score, ces, first_response_time,
               avg_response_time, total_handling_time, effectiveness_score,
               effort_score, efficiency_score, empathy_score, csi_score, error
        FROM daily_analyses WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else { return Ok(None) };

    let conversation_id: i64 = row.get("conversation_id");
    let analysis_date: String = row.get("analysis_date");
    let analysis_date = analysis_date
        .parse::<NaiveDate>()
        .map_err(|e| crate::DbError::InvalidTimestamp(e.to_string()))?;

    let sentiment_score: Option<f64> = row.get("sentiment_score");
    let ai = sentiment_score.map(|sentiment_score| AiMetrics {
        sentiment_score,
        sentiment_shift: row.get("sentiment_shift"),
        resolution_achieved: row.get("resolution_achieved"),
        fcr_score: row.get("fcr_score"),
        ces: row.get("ces"),
    });

    let time = TimeMetrics {
        first_response_time: row.get("first_response_time"),
        avg_response_time: row.get("avg_response_time"),
        total_handling_time: row.get("total_handling_time"),
    };

    let pillars = PillarScores {
        effectiveness_score: row.get("effectiveness_score"),
        effort_score: row.get("effort_score"),
        efficiency_score: row.get("efficiency_score"),
        empathy_score: row.get("empathy_score"),
        csi_score: row.get("csi_score"),
    };

    Ok(Some(DailyAnalysis {
        id: Some(id),
        conversation_id,
        analysis_date,
        ai,
        time,
        pillars,
        error: row.get("error"),
    }))
}

/// All DailyAnalysis rows belonging to one upload's jobs — used to rebuild
/// the Metric cache after an upload completes (§4.8 "Aggregates").
pub async fn daily_analyses_for_upload(pool: &SqlitePool, upload_id: &str) -> DbResult<Vec<DailyAnalysis>> {
    let ids: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT jda.daily_analysis_id
        FROM job_daily_analyses jda
        JOIN jobs j ON j.id = jda.job_id
        WHERE j.upload_id = ?
        "#,
    )
    .bind(upload_id)
    .fetch_all(pool)
    .await?;

    let mut rows = Vec::with_capacity(ids.len());
    for (id,) in ids {
        if let Some(row) = get_daily_analysis(pool, id).await? {
            rows.push(row);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::conversations::{upsert_conversation, ConversationMetadata};
    use crate::Database;
    use chrono::Utc;
    use std::collections::BTreeSet;

    async fn conversation_id(db: &Database) -> i64 {
        let t = Utc::now();
        upsert_conversation(
            db.pool(),
            "C1",
            &ConversationMetadata {
                customer_name: None,
                total_messages: 1,
                customer_messages: 1,
                agent_messages: 0,
                first_message_time: t,
                last_message_time: t,
                common_topics: BTreeSet::new(),
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn create_is_idempotent_per_day() {
        let db = Database::new_in_memory().await.unwrap();
        let conv_id = conversation_id(&db).await;
        let date = NaiveDate::from_ymd_opt(2025, 8, 26).unwrap();

        let first = create_daily_analysis(db.pool(), conv_id, date).await.unwrap();
        let second = create_daily_analysis(db.pool(), conv_id, date).await.unwrap();
        assert_eq!(first, second);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM daily_analyses")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn update_then_get_round_trips() {
        let db = Database::new_in_memory().await.unwrap();
        let conv_id = conversation_id(&db).await;
        let date = NaiveDate::from_ymd_opt(2025, 8, 26).unwrap();
        let id = create_daily_analysis(db.pool(), conv_id, date).await.unwrap();

        let update = DailyAnalysisUpdate {
            ai: Some(AiMetrics {
                sentiment_score: 8.0,
                sentiment_shift: 1.0,
                resolution_achieved: 9.0,
                fcr_score: 7.0,
                ces: 2.0,
            }),
            time: TimeMetrics {
                first_response_time: Some(120.0),
                avg_response_time: Some(120.0),
                total_handling_time: Some(2.0),
            },
            pillars: PillarScores {
                effectiveness_score: Some(8.0),
                effort_score: Some(8.3),
                efficiency_score: Some(9.0),
                empathy_score: Some(7.8),
                csi_score: Some(82.0),
            },
            error: None,
        };
        update_daily_analysis(db.pool(), id, &update).await.unwrap();

        let loaded = get_daily_analysis(db.pool(), id).await.unwrap().unwrap();
        assert_eq!(loaded.ai.unwrap().sentiment_score, 8.0);
        assert_eq!(loaded.pillars.csi_score, Some(82.0));
        assert_eq!(loaded.analysis_date, date);
    }
}

// crates/db/src/queries/jobs.rs
//! `create_job` / `update_job` (§4.3). A Job shares DailyAnalysis rows by
//! weak reference through `job_daily_analyses`; deleting a Job never
//! cascades to DailyAnalysis (§3 "Ownership").

use crate::DbResult;
use chrono::{DateTime, Utc};
use powerpulse_core::model::{Job, JobStatus};
use sqlx::{Row, SqlitePool};

fn status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "pending",
        JobStatus::InProgress => "in_progress",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> JobStatus {
    match s {
        "in_progress" => JobStatus::InProgress,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

/// Creates a Job covering `daily_ids` for `upload_id`. Every DailyAnalysis
/// row belongs to exactly one Job (§3 invariant) — the unique index on
/// `job_daily_analyses.daily_analysis_id` enforces this at the schema
/// level, surfacing as a `DbError::Sqlx` constraint violation if a caller
/// mistakenly tries to double-assign a row.
pub async fn create_job(pool: &SqlitePool, upload_id: &str, daily_ids: &[i64]) -> DbResult<i64> {
    let now = Utc::now().to_rfc3339();
    let row = sqlx::query(
        r#"
        INSERT INTO jobs (upload_id, status, created_at, completed_at, result)
        VALUES (?, 'pending', ?, NULL, NULL)
        RETURNING id
        "#,
    )
    .bind(upload_id)
    .bind(&now)
    .fetch_one(pool)
    .await?;

    let job_id: i64 = row.get(0);

    for daily_id in daily_ids {
        sqlx::query("INSERT INTO job_daily_analyses (job_id, daily_analysis_id) VALUES (?, ?)")
            .bind(job_id)
            .bind(daily_id)
            .execute(pool)
            .await?;
    }

    Ok(job_id)
}

/// Structured outcome recorded in `jobs.result` on completion or failure
/// (§3 Job.result, §4.6 failure isolation).
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobResultUpdate {
    pub status: JobStatus,
    pub result: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

/// Writes a Job's terminal state. Each call is its own transaction (§4.3)
/// so one job's failure never rolls back a sibling's success.
pub async fn update_job(pool: &SqlitePool, id: i64, update: &JobResultUpdate) -> DbResult<()> {
    sqlx::query("UPDATE jobs SET status = ?, result = ?, completed_at = ? WHERE id = ?")
        .bind(status_str(update.status))
        .bind(serde_json::to_string(&update.result)?)
        .bind(update.completed_at.to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Marks a Job as `in_progress`, the transition made right before the
/// worker acquires the semaphore and starts the LLM call (§4.6).
pub async fn mark_job_in_progress(pool: &SqlitePool, id: i64) -> DbResult<()> {
    sqlx::query("UPDATE jobs SET status = 'in_progress' WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Loads a Job by id, including its associated DailyAnalysis ids.
pub async fn get_job(pool: &SqlitePool, id: i64) -> DbResult<Option<Job>> {
    let row = sqlx::query(
        "SELECT upload_id, status, created_at, completed_at, result FROM jobs WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else { return Ok(None) };

    let daily_ids: Vec<(i64,)> =
        sqlx::query_as("SELECT daily_analysis_id FROM job_daily_analyses WHERE job_id = ?")
            .bind(id)
            .fetch_all(pool)
            .await?;

    let created_at: String = row.get("created_at");
    let completed_at: Option<String> = row.get("completed_at");
    let result: Option<String> = row.get("result");
    let status: String = row.get("status");

    Ok(Some(Job {
        id: Some(id),
        upload_id: row.get("upload_id"),
        status: parse_status(&status),
        daily_analysis_ids: daily_ids.into_iter().map(|(i,)| i).collect(),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| crate::DbError::InvalidTimestamp(e.to_string()))?,
        completed_at: completed_at
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| crate::DbError::InvalidTimestamp(e.to_string()))?,
        result: result.map(|s| serde_json::from_str(&s)).transpose()?,
    }))
}

/// All Job ids created for one upload, in creation order — FIFO dispatch
/// order for the scheduler (§4.6, §5).
pub async fn jobs_for_upload(pool: &SqlitePool, upload_id: &str) -> DbResult<Vec<i64>> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM jobs WHERE upload_id = ? ORDER BY id ASC")
            .bind(upload_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn create_and_fetch_job() {
        let db = Database::new_in_memory().await.unwrap();
        let id = create_job(db.pool(), "upload-1", &[]).await.unwrap();
        let job = get_job(db.pool(), id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.upload_id, "upload-1");
    }

    #[tokio::test]
    async fn a_daily_analysis_row_cannot_join_two_jobs() {
        use crate::queries::conversations::{upsert_conversation, ConversationMetadata};
        use crate::queries::daily_analysis::create_daily_analysis;
        use chrono::Utc;
        use std::collections::BTreeSet;

        let db = Database::new_in_memory().await.unwrap();
        let t = Utc::now();
        let conv = upsert_conversation(
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
        .unwrap();
        let daily_id = create_daily_analysis(
            db.pool(),
            conv.id,
            chrono::NaiveDate::from_ymd_opt(2025, 8, 26).unwrap(),
        )
        .await
        .unwrap();

        create_job(db.pool(), "upload-1", &[daily_id]).await.unwrap();
        let second = create_job(db.pool(), "upload-1", &[daily_id]).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn update_job_sets_terminal_state() {
        let db = Database::new_in_memory().await.unwrap();
        let id = create_job(db.pool(), "upload-1", &[]).await.unwrap();
        update_job(
            db.pool(),
            id,
            &JobResultUpdate {
                status: JobStatus::Completed,
                result: serde_json::json!({"ok": true}),
                completed_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let job = get_job(db.pool(), id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.completed_at.unwrap() >= job.created_at);
    }

    #[tokio::test]
    async fn jobs_for_upload_returns_creation_order() {
        let db = Database::new_in_memory().await.unwrap();
        let a = create_job(db.pool(), "upload-1", &[]).await.unwrap();
        let b = create_job(db.pool(), "upload-1", &[]).await.unwrap();
        let ids = jobs_for_upload(db.pool(), "upload-1").await.unwrap();
        assert_eq!(ids, vec![a, b]);
    }
}

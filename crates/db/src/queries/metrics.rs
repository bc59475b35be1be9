// crates/db/src/queries/metrics.rs
//! `replace_metrics` (§4.3). Rewritten wholesale after every successful
//! upload (§3 "Metric").

use crate::DbResult;
use powerpulse_core::model::Metric;
use sqlx::SqlitePool;

/// Replaces the entire Metric cache with `snapshot`. Runs in a single
/// transaction so readers never observe a half-written cache.
pub async fn replace_metrics(pool: &SqlitePool, snapshot: &[Metric]) -> DbResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM metrics").execute(&mut *tx).await?;

    for metric in snapshot {
        sqlx::query(
            r#"
            INSERT INTO metrics (metric_name, metric_value, metric_metadata, calculated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&metric.metric_name)
        .bind(metric.metric_value)
        .bind(
            metric
                .metric_metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(metric.calculated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Reads the current Metric cache, keyed by `metric_name`.
pub async fn all_metrics(pool: &SqlitePool) -> DbResult<Vec<Metric>> {
    let rows: Vec<(String, f64, Option<String>, String)> = sqlx::query_as(
        "SELECT metric_name, metric_value, metric_metadata, calculated_at FROM metrics",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(metric_name, metric_value, metadata, calculated_at)| {
            Ok(Metric {
                metric_name,
                metric_value,
                metric_metadata: metadata.map(|s| serde_json::from_str(&s)).transpose()?,
                calculated_at: chrono::DateTime::parse_from_rfc3339(&calculated_at)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .map_err(|e| crate::DbError::InvalidTimestamp(e.to_string()))?,
            })
        })
        .collect()
}

// crates/server/src/orchestrator.rs
//! Upload orchestrator (C10, §4.10). Composes C1–C9 end-to-end and owns
//! the background task lifecycle for one upload.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use powerpulse_core::batching::{self, WorkUnit};
use powerpulse_core::error::RejectionReason;
use powerpulse_core::grouper;
use powerpulse_core::llm::LlmProvider;
use powerpulse_core::model::{JobStatus, Message, Metric};
use powerpulse_core::scoring;
use powerpulse_core::time_metrics;
use powerpulse_core::validator::{self, RawMessage};
use powerpulse_core::Config;
use powerpulse_db::queries::conversations::{upsert_conversation, ConversationMetadata};
use powerpulse_db::queries::daily_analysis::{
    create_daily_analysis, daily_analyses_for_upload, update_daily_analysis, DailyAnalysisUpdate,
};
use powerpulse_db::queries::jobs::{create_job, mark_job_in_progress, update_job, JobResultUpdate};
use powerpulse_db::queries::messages::insert_messages;
use powerpulse_db::queries::metrics::replace_metrics;
use powerpulse_db::queries::processed_chats::{is_chat_processed, mark_processed};
use powerpulse_db::Database;
use tokio::sync::Semaphore;

use crate::progress::{ProgressRegistry, Stage, UploadState, UploadStatus};
use crate::scheduler;

/// The parsed upload body: chat id -> ordered raw message records (§6).
pub type UploadPayload = BTreeMap<String, Vec<RawMessage>>;

/// Runs one upload's pipeline to completion, updating the progress
/// tracker at each stage transition (§4.10 "control flow").
pub async fn run(
    upload_id: String,
    payload: UploadPayload,
    force_reprocess: bool,
    db: Database,
    config: Config,
    provider: Arc<dyn LlmProvider>,
    registry: ProgressRegistry,
) {
    crate::metrics::record_upload_accepted();
    crate::metrics::upload_started();

    let total_conversations = payload.len() as u64;
    let state = registry.register(upload_id.clone(), total_conversations);
    let cancel = state.cancellation_token();
    state.set_status(UploadStatus::Processing);

    let deadline = tokio::time::sleep(config.upload_total_timeout);
    tokio::pin!(deadline);

    let work = run_pipeline(
        upload_id.clone(),
        payload,
        force_reprocess,
        &db,
        &config,
        provider,
        state.clone(),
    );
    tokio::pin!(work);

    tokio::select! {
        _ = &mut work => {}
        _ = &mut deadline => {
            cancel.cancel();
            state.push_error("upload exceeded the total timeout".to_string());
            state.set_status(UploadStatus::Failed);
            crate::metrics::upload_finished();
            return;
        }
    }

    crate::metrics::upload_finished();
}

/// One validated-and-grouped day of a conversation, carrying both the
/// original messages (needed to recompute C7 from the DB reconstruction)
/// and the work unit handed to C4/C6.
struct PendingUnit {
    messages: Vec<Message>,
    unit: WorkUnit,
}

async fn run_pipeline(
    upload_id: String,
    payload: UploadPayload,
    force_reprocess: bool,
    db: &Database,
    config: &Config,
    provider: Arc<dyn LlmProvider>,
    state: Arc<UploadState>,
) {
    state.set_stage(Stage::Validating, "validating messages");
    let mut grouped = Vec::new();
    for (chat_id, raw_messages) in &payload {
        if state.cancellation_token().is_cancelled() {
            return;
        }
        let mut messages = Vec::with_capacity(raw_messages.len());
        for raw in raw_messages {
            match validator::validate(
                chat_id,
                raw,
                &config.autoresponse_sentence,
                config.autoresponse_substring_match,
            ) {
                Ok(mut message) => {
                    message.chat_id = chat_id.clone();
                    messages.push(message);
                }
                Err(RejectionReason::Autoresponse) => {
                    state.record_filtered_autoresponse();
                }
                Err(_) => {
                    state.record_filtered_invalid();
                }
            }
        }

        if messages.is_empty() {
            continue;
        }

        if let Some(grouped_chat) = grouper::group_chat(chat_id, messages) {
            grouped.push(grouped_chat);
        }
    }

    if grouped.is_empty() {
        finish(&state, db, &upload_id, Vec::new()).await;
        return;
    }

    state.set_stage(Stage::Persisting, "persisting conversations and daily analyses");
    let mut pending_units: Vec<PendingUnit> = Vec::new();
    let mut processed_chat_ids = Vec::new();

    for grouped_chat in grouped {
        let chat_id = grouped_chat.summary.chat_id.clone();

        if !force_reprocess {
            match is_chat_processed(db.pool(), &chat_id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    state.push_error(format!("failed checking processed state: {e}"));
                    continue;
                }
            }
        }

        let metadata = ConversationMetadata {
            customer_name: None,
            total_messages: grouped_chat.summary.total_messages,
            customer_messages: grouped_chat.summary.customer_messages,
            agent_messages: grouped_chat.summary.agent_messages,
            first_message_time: grouped_chat.summary.first_message_time,
            last_message_time: grouped_chat.summary.last_message_time,
            common_topics: BTreeSet::new(),
        };

        let conversation = match upsert_conversation(db.pool(), &chat_id, &metadata).await {
            Ok(c) => c,
            Err(e) => {
                state.push_error(format!("failed to persist conversation {chat_id}: {e}"));
                continue;
            }
        };

        for day in grouped_chat.days {
            let daily_id =
                match create_daily_analysis(db.pool(), conversation.id, day.analysis_date).await {
                    Ok(id) => id,
                    Err(e) => {
                        state.push_error(format!(
                            "failed to seed daily analysis for {chat_id}/{}: {e}",
                            day.analysis_date
                        ));
                        continue;
                    }
                };

            if let Err(e) =
                insert_messages(db.pool(), conversation.id, &chat_id, &day.messages).await
            {
                state.push_error(format!("failed to persist messages for {chat_id}: {e}"));
                continue;
            }

            let prompt_text = day
                .messages
                .iter()
                .map(|m| {
                    format!(
                        "{:?} @ {}: {}",
                        m.direction,
                        m.social_create_time.to_rfc3339(),
                        m.message_content
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");

            pending_units.push(PendingUnit {
                messages: day.messages,
                unit: WorkUnit {
                    daily_analysis_id: daily_id,
                    chat_id: chat_id.clone(),
                    analysis_date: day.analysis_date,
                    prompt_text,
                },
            });
        }

        state.increment_processed_conversations();
        processed_chat_ids.push(chat_id);
    }

    if pending_units.is_empty() {
        finish(&state, db, &upload_id, processed_chat_ids).await;
        return;
    }

    state.set_stage(Stage::Batching, "packing jobs");
    let messages_by_daily_id: BTreeMap<i64, Vec<Message>> = pending_units
        .iter()
        .map(|p| (p.unit.daily_analysis_id, p.messages.clone()))
        .collect();
    let units: Vec<WorkUnit> = pending_units.into_iter().map(|p| p.unit).collect();
    let batches = batching::pack(units, config.max_tokens_per_job, config.batch_size);

    let mut job_ids = Vec::with_capacity(batches.len());
    for batch in &batches {
        let daily_ids: Vec<i64> = batch.units.iter().map(|u| u.daily_analysis_id).collect();
        match create_job(db.pool(), &upload_id, &daily_ids).await {
            Ok(id) => job_ids.push(id),
            Err(e) => state.push_error(format!("failed to create job: {e}")),
        }
    }
    state.set_total_jobs(job_ids.len() as u64);

    state.set_stage(Stage::AiAnalysis, "scoring conversation-days");
    let semaphore = Arc::new(Semaphore::new(config.ai_concurrency.max(1)));
    let thresholds = scoring::EfficiencyThresholds::default();

    let mut handles = Vec::with_capacity(batches.len());
    for (job_id, batch) in job_ids.into_iter().zip(batches.into_iter()) {
        if let Err(e) = mark_job_in_progress(db.pool(), job_id).await {
            state.push_error(format!("failed to mark job {job_id} in_progress: {e}"));
        }

        let provider = provider.clone();
        let semaphore = semaphore.clone();
        let cancel = state.cancellation_token();
        let min_inter_call_delay = config.min_inter_call_delay;
        let state_for_job = state.clone();
        handles.push(tokio::spawn(async move {
            let started = Instant::now();
            let outcome = scheduler::run_job(
                provider,
                semaphore,
                min_inter_call_delay,
                batch,
                cancel,
                state_for_job,
            )
            .await;
            (job_id, outcome, started.elapsed())
        }));
    }

    for handle in handles {
        let (job_id, outcome, duration) = match handle.await {
            Ok(v) => v,
            Err(e) => {
                state.push_error(format!("job task panicked: {e}"));
                continue;
            }
        };
        crate::metrics::record_job_completed(
            if outcome.error.is_some() { "failed" } else { "completed" },
            duration,
        );

        for (daily_id, ai_metrics) in outcome.daily_analysis_ids.iter().zip(outcome.metrics.iter()) {
            let time = messages_by_daily_id
                .get(daily_id)
                .map(|messages| time_metrics::compute(messages))
                .unwrap_or_default();
            let pillars = scoring::compute(Some(ai_metrics), &time, &thresholds);

            let update = DailyAnalysisUpdate {
                ai: Some(*ai_metrics),
                time,
                pillars,
                error: outcome.error.clone(),
            };
            if let Err(e) = update_daily_analysis(db.pool(), *daily_id, &update).await {
                state.push_error(format!("failed to persist daily analysis {daily_id}: {e}"));
            }
        }

        let job_status = if outcome.error.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        let result = JobResultUpdate {
            status: job_status,
            result: serde_json::json!({ "error": outcome.error }),
            completed_at: Utc::now(),
        };
        if let Err(e) = update_job(db.pool(), job_id, &result).await {
            state.push_error(format!("failed to finalize job {job_id}: {e}"));
        }
        state.increment_completed_jobs();
    }

    finish(&state, db, &upload_id, processed_chat_ids).await;
}

/// Finalizes a successfully-run upload (§4.10): refreshes the Metric
/// cache, marks the processed chats, and sets the terminal status per the
/// §4.9/§7 `completed` vs `completed_with_filters` rule.
async fn finish(
    state: &UploadState,
    db: &Database,
    upload_id: &str,
    processed_chat_ids: Vec<String>,
) {
    state.set_stage(Stage::Finalizing, "refreshing aggregates");

    let daily_analyses = match daily_analyses_for_upload(db.pool(), upload_id).await {
        Ok(rows) => rows,
        Err(e) => {
            state.push_error(format!("failed to load daily analyses: {e}"));
            Vec::new()
        }
    };
    let processed_any_daily_analysis = !daily_analyses.is_empty();

    if !processed_chat_ids.is_empty() {
        if let Err(e) = mark_processed(db.pool(), &processed_chat_ids).await {
            state.push_error(format!("failed to mark chats processed: {e}"));
        }
    }

    let csi_values: Vec<f64> = daily_analyses.iter().filter_map(|d| d.pillars.csi_score).collect();
    let mut snapshot = Vec::new();
    if !csi_values.is_empty() {
        snapshot.push(Metric {
            metric_name: "system_csi".to_string(),
            metric_value: csi_values.iter().sum::<f64>() / csi_values.len() as f64,
            metric_metadata: None,
            calculated_at: Utc::now(),
        });
    }
    snapshot.push(Metric {
        metric_name: "daily_analysis_count".to_string(),
        metric_value: daily_analyses.len() as f64,
        metric_metadata: None,
        calculated_at: Utc::now(),
    });
    if let Err(e) = replace_metrics(db.pool(), &snapshot).await {
        state.push_error(format!("failed to refresh metric cache: {e}"));
    }

    if processed_any_daily_analysis {
        state.set_status(UploadStatus::Completed);
    } else {
        state.set_status(UploadStatus::CompletedWithFilters);
    }
}

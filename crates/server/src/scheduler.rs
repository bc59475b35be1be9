// crates/server/src/scheduler.rs
//! Job scheduler (C6, §4.6). A single background executor dispatches jobs
//! in creation order through a counting semaphore that bounds how many LLM
//! calls are in flight at once.

use std::sync::Arc;
use std::time::Duration;

use powerpulse_core::batching::Batch;
use powerpulse_core::error::LlmError;
use powerpulse_core::llm::LlmProvider;
use powerpulse_core::model::AiMetrics;
use tokio::sync::Semaphore;

use crate::progress::{CancellationToken, UploadState};

const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_FACTOR: u32 = 2;
const RETRY_ATTEMPTS: u32 = 3;

/// Outcome of running one job through the scheduler.
pub struct JobOutcome {
    pub daily_analysis_ids: Vec<i64>,
    pub metrics: Vec<AiMetrics>,
    /// `Some` when the job ended `failed` — either from a structural LLM
    /// failure (fallback substitution applied) or from cancellation.
    pub error: Option<String>,
}

/// Cheap, dependency-free jitter source: the sub-millisecond part of the
/// monotonic clock, which is unpredictable enough to decorrelate retries
/// across concurrent workers without pulling in a PRNG crate.
fn jitter(base: Duration) -> Duration {
    let nanos = tokio::time::Instant::now().elapsed().subsec_nanos();
    let max_jitter_ms = (base.as_millis() as u64 / 4).max(1);
    Duration::from_millis(nanos as u64 % max_jitter_ms)
}

/// Runs a single batch through the LLM with retry/backoff on transient
/// failures (§4.6). Non-transient failures resolve via the fallback
/// substitution already embedded in `analyze_daily_batch`'s contract, so
/// only the transport-level error varies here.
async fn call_with_retry(
    provider: &dyn LlmProvider,
    batch: &Batch,
    cancel: &CancellationToken,
) -> Result<(Vec<AiMetrics>, powerpulse_core::llm::Usage), LlmError> {
    let mut attempt = 0;
    let mut delay = RETRY_BASE;

    loop {
        if cancel.is_cancelled() {
            return Err(LlmError::NotConfigured("cancelled".to_string()));
        }

        match provider.analyze_daily_batch(&batch.units).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt + 1 < RETRY_ATTEMPTS => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "transient LLM failure, retrying");
                tokio::time::sleep(delay + jitter(delay)).await;
                delay *= RETRY_FACTOR;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Executes one job: waits for a semaphore permit, pauses for the
/// inter-call delay, calls the LLM with retry, and reports back the
/// positional metrics (or a fallback-and-error pair) for C3 to persist.
///
/// Checks `cancel` at every suspension point named in §5: semaphore
/// acquisition, the inter-call delay, and the LLM call itself.
pub async fn run_job(
    provider: Arc<dyn LlmProvider>,
    semaphore: Arc<Semaphore>,
    min_inter_call_delay: Duration,
    batch: Batch,
    cancel: CancellationToken,
    progress: Arc<UploadState>,
) -> JobOutcome {
    let daily_analysis_ids: Vec<i64> = batch.units.iter().map(|u| u.daily_analysis_id).collect();

    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return cancelled_outcome(daily_analysis_ids, batch.units.len());
        }
    };

    if cancel.is_cancelled() {
        drop(permit);
        return cancelled_outcome(daily_analysis_ids, batch.units.len());
    }

    tokio::time::sleep(min_inter_call_delay).await;

    if cancel.is_cancelled() {
        drop(permit);
        return cancelled_outcome(daily_analysis_ids, batch.units.len());
    }

    let result = call_with_retry(provider.as_ref(), &batch, &cancel).await;
    drop(permit);

    match result {
        Ok((metrics, usage)) => {
            progress.record_ai_call(
                usage.prompt_tokens.unwrap_or(0) + usage.response_tokens.unwrap_or(0),
            );
            crate::metrics::record_ai_call(provider.name());
            if let Some(err) = usage.structural_error {
                progress.record_ai_failure();
                crate::metrics::record_ai_failure(provider.name());
                tracing::error!(error = %err, "job failed to parse LLM response, applying fallback");
                JobOutcome {
                    daily_analysis_ids,
                    metrics,
                    error: Some("analysis_failed".to_string()),
                }
            } else {
                JobOutcome {
                    daily_analysis_ids,
                    metrics,
                    error: None,
                }
            }
        }
        Err(LlmError::NotConfigured(reason)) if reason == "cancelled" => {
            cancelled_outcome(daily_analysis_ids, batch.units.len())
        }
        Err(e) => {
            progress.record_ai_failure();
            crate::metrics::record_ai_call(provider.name());
            crate::metrics::record_ai_failure(provider.name());
            tracing::error!(error = %e, "job failed after retries, applying fallback");
            JobOutcome {
                daily_analysis_ids,
                metrics: vec![AiMetrics::fallback(); batch.units.len()],
                error: Some("analysis_failed".to_string()),
            }
        }
    }
}

fn cancelled_outcome(daily_analysis_ids: Vec<i64>, len: usize) -> JobOutcome {
    JobOutcome {
        daily_analysis_ids,
        metrics: vec![AiMetrics::fallback(); len],
        error: Some("cancelled".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use powerpulse_core::batching::WorkUnit;
    use powerpulse_core::llm::Usage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFails;

    #[async_trait]
    impl LlmProvider for AlwaysFails {
        async fn analyze_daily_batch(
            &self,
            _units: &[WorkUnit],
        ) -> Result<(Vec<AiMetrics>, Usage), LlmError> {
            Err(LlmError::Http {
                status: 503,
                body: "unavailable".to_string(),
            })
        }

        fn name(&self) -> &str {
            "test"
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
        fail_until: usize,
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        async fn analyze_daily_batch(
            &self,
            units: &[WorkUnit],
        ) -> Result<(Vec<AiMetrics>, Usage), LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_until {
                Err(LlmError::Timeout(60))
            } else {
                Ok((vec![AiMetrics::fallback(); units.len()], Usage::default()))
            }
        }

        fn name(&self) -> &str {
            "test"
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    struct StructurallyBrokenProvider;

    #[async_trait]
    impl LlmProvider for StructurallyBrokenProvider {
        async fn analyze_daily_batch(
            &self,
            units: &[WorkUnit],
        ) -> Result<(Vec<AiMetrics>, Usage), LlmError> {
            Ok((
                vec![AiMetrics::fallback(); units.len()],
                Usage {
                    structural_error: Some("response array length mismatch".to_string()),
                    ..Usage::default()
                },
            ))
        }

        fn name(&self) -> &str {
            "test"
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    fn batch() -> Batch {
        Batch {
            units: vec![WorkUnit {
                daily_analysis_id: 1,
                chat_id: "C1".to_string(),
                analysis_date: NaiveDate::from_ymd_opt(2025, 8, 26).unwrap(),
                prompt_text: "hi".to_string(),
            }],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_retries_produces_fallback_with_error() {
        let provider: Arc<dyn LlmProvider> = Arc::new(AlwaysFails);
        let semaphore = Arc::new(Semaphore::new(1));
        let progress = Arc::new(UploadState::new("u1".to_string(), 1));
        let cancel = CancellationToken::new();

        let outcome = run_job(
            provider,
            semaphore,
            Duration::from_millis(0),
            batch(),
            cancel,
            progress.clone(),
        )
        .await;

        assert_eq!(outcome.error.as_deref(), Some("analysis_failed"));
        assert_eq!(outcome.metrics, vec![AiMetrics::fallback()]);
        assert_eq!(progress.snapshot().statistics.ai_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_one_transient_retry() {
        let provider: Arc<dyn LlmProvider> = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_until: 1,
        });
        let semaphore = Arc::new(Semaphore::new(1));
        let progress = Arc::new(UploadState::new("u1".to_string(), 1));
        let cancel = CancellationToken::new();

        let outcome = run_job(
            provider,
            semaphore,
            Duration::from_millis(0),
            batch(),
            cancel,
            progress,
        )
        .await;

        assert!(outcome.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn structural_parse_failure_marks_job_failed_despite_ok_response() {
        let provider: Arc<dyn LlmProvider> = Arc::new(StructurallyBrokenProvider);
        let semaphore = Arc::new(Semaphore::new(1));
        let progress = Arc::new(UploadState::new("u1".to_string(), 1));
        let cancel = CancellationToken::new();

        let outcome = run_job(
            provider,
            semaphore,
            Duration::from_millis(0),
            batch(),
            cancel,
            progress.clone(),
        )
        .await;

        assert_eq!(outcome.error.as_deref(), Some("analysis_failed"));
        assert_eq!(outcome.metrics, vec![AiMetrics::fallback()]);
        assert_eq!(progress.snapshot().statistics.ai_failures, 1);
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_marks_job_cancelled() {
        let provider: Arc<dyn LlmProvider> = Arc::new(AlwaysFails);
        let semaphore = Arc::new(Semaphore::new(1));
        let progress = Arc::new(UploadState::new("u1".to_string(), 1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run_job(
            provider,
            semaphore,
            Duration::from_millis(0),
            batch(),
            cancel,
            progress,
        )
        .await;

        assert_eq!(outcome.error.as_deref(), Some("cancelled"));
    }
}

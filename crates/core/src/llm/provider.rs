// crates/core/src/llm/provider.rs
//! The `LlmProvider` capability trait implemented by each vendor adapter.

use crate::batching::WorkUnit;
use crate::error::LlmError;
use crate::model::AiMetrics;
use async_trait::async_trait;

/// Token usage reported by the provider, if it supplies one (§4.5).
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub response_tokens: Option<u64>,
    /// Set when `parse_batch_response` couldn't make sense of the
    /// provider's reply (non-JSON, wrong length, out-of-range score) and
    /// fell back to placeholder metrics. The call still returns `Ok` with
    /// those fallback metrics — this is how the caller learns the batch
    /// needs to be marked `failed` rather than `completed` (§4.6).
    pub structural_error: Option<String>,
}

/// A vendor-agnostic scorer of a batch of DailyAnalysis work units.
///
/// Implementations: `GeminiAdapter`, `OpenAiCompatibleAdapter`. Selection
/// happens once at startup via `llm::factory::create_provider`, not per
/// call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Scores one batch in a single round trip. Returns one `AiMetrics`
    /// per unit, positionally aligned with `units` (§4.6 ordering
    /// guarantee). Never returns a length mismatch to the caller — a
    /// malformed provider response is resolved internally into fallback
    /// records per §4.5's parsing contract.
    async fn analyze_daily_batch(
        &self,
        units: &[WorkUnit],
    ) -> Result<(Vec<AiMetrics>, Usage), LlmError>;

    /// Provider name for logging/metrics labels (e.g. "gemini", "openai").
    fn name(&self) -> &str;

    /// Model identifier in use (e.g. "gemini-1.5-flash", "gpt-4o-mini").
    fn model(&self) -> &str;
}

// crates/core/src/llm/batch.rs
//! Prompt construction and strict response parsing shared by every
//! provider adapter (§4.5.1). Centralizing this here means a vendor
//! adapter only has to know how to round-trip a single HTTP call; the
//! scoring contract itself is vendor-independent.

use crate::batching::WorkUnit;
use crate::error::LlmError;
use crate::model::AiMetrics;
use serde::Deserialize;

/// Builds the single prompt sent for a batch. Each unit is embedded with
/// its ordinal index so the model's positional array answer can be
/// checked against the input order (§4.5).
pub fn build_batch_prompt(units: &[WorkUnit]) -> String {
    let mut prompt = String::from(
        "You will score a batch of customer-service conversation-days. \
         For each numbered unit below, return an object with exactly these \
         numeric fields: sentiment_score (0-10), sentiment_shift (-5 to 5), \
         resolution_achieved (0-10), fcr_score (0-10), ces (1-7, lower is \
         better). Respond with a single JSON array of length equal to the \
         number of units, in the same order, and nothing else.\n\n",
    );

    for (index, unit) in units.iter().enumerate() {
        prompt.push_str(&format!(
            "=== Unit {index} (chat {}, {}) ===\n{}\n\n",
            unit.chat_id, unit.analysis_date, unit.prompt_text
        ));
    }

    prompt
}

#[derive(Debug, Deserialize)]
struct RawScore {
    sentiment_score: f64,
    sentiment_shift: f64,
    resolution_achieved: f64,
    fcr_score: f64,
    ces: f64,
}

impl RawScore {
    fn in_range(&self) -> bool {
        (0.0..=10.0).contains(&self.sentiment_score)
            && (-5.0..=5.0).contains(&self.sentiment_shift)
            && (0.0..=10.0).contains(&self.resolution_achieved)
            && (0.0..=10.0).contains(&self.fcr_score)
            && (1.0..=7.0).contains(&self.ces)
    }
}

/// Parses a provider's raw text response against the strict contract in
/// §4.5. On any deviation — non-JSON, wrong length, missing keys,
/// out-of-range values — every unit in the batch falls back to
/// `AiMetrics::fallback()` and the error is surfaced to the caller so it
/// can mark the job `failed` with `error = "analysis_failed"` (§4.6)
/// while still returning usable (if generic) scores.
pub fn parse_batch_response(raw: &str, expected_len: usize) -> (Vec<AiMetrics>, Option<LlmError>) {
    let parsed: Result<Vec<RawScore>, _> = serde_json::from_str(raw);

    let scores = match parsed {
        Ok(scores) => scores,
        Err(e) => {
            return (
                vec![AiMetrics::fallback(); expected_len],
                Some(LlmError::InvalidJson(e.to_string())),
            );
        }
    };

    if scores.len() != expected_len {
        return (
            vec![AiMetrics::fallback(); expected_len],
            Some(LlmError::LengthMismatch {
                expected: expected_len,
                got: scores.len(),
            }),
        );
    }

    if let Some(bad) = scores.iter().position(|s| !s.in_range()) {
        return (
            vec![AiMetrics::fallback(); expected_len],
            Some(LlmError::SchemaViolation(format!(
                "unit {bad} had an out-of-range value"
            ))),
        );
    }

    let metrics = scores
        .into_iter()
        .map(|s| AiMetrics {
            sentiment_score: s.sentiment_score,
            sentiment_shift: s.sentiment_shift,
            resolution_achieved: s.resolution_achieved,
            fcr_score: s.fcr_score,
            ces: s.ces,
        })
        .collect();

    (metrics, None)
}

// crates/core/src/llm/gemini.rs
//! `GeminiAdapter` — calls a Gemini-compatible `generateContent` endpoint.

use super::batch::{build_batch_prompt, parse_batch_response};
use super::provider::{LlmProvider, Usage};
use crate::batching::WorkUnit;
use crate::error::LlmError;
use crate::model::AiMetrics;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct GeminiAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    per_attempt_timeout: Duration,
}

impl GeminiAdapter {
    pub fn new(
        api_key: String,
        model: String,
        endpoint: Option<String>,
        per_attempt_timeout: Duration,
    ) -> Self {
        let endpoint = endpoint.unwrap_or_else(|| {
            "https://generativelanguage.googleapis.com/v1beta/models".to_string()
        });
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            per_attempt_timeout,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }
}

#[async_trait]
impl LlmProvider for GeminiAdapter {
    async fn analyze_daily_batch(
        &self,
        units: &[WorkUnit],
    ) -> Result<(Vec<AiMetrics>, Usage), LlmError> {
        let prompt = build_batch_prompt(units);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" },
        });

        let response = tokio::time::timeout(
            self.per_attempt_timeout,
            self.client.post(self.url()).json(&body).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(self.per_attempt_timeout.as_secs()))??;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: serde_json::Value = response.json().await?;
        let text = envelope["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();

        let (metrics, parse_err) = parse_batch_response(text, units.len());
        if let Some(err) = &parse_err {
            tracing::warn!(provider = "gemini", error = %err, "batch response failed strict parsing, using fallback");
        }

        let usage = Usage {
            prompt_tokens: envelope["usageMetadata"]["promptTokenCount"].as_u64(),
            response_tokens: envelope["usageMetadata"]["candidatesTokenCount"].as_u64(),
            structural_error: parse_err.map(|e| e.to_string()),
        };

        Ok((metrics, usage))
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// crates/core/src/llm/openai_compatible.rs
//! `OpenAiCompatibleAdapter` — calls an OpenAI-compatible chat-completions
//! endpoint. Covers OpenAI itself and any self-hosted gateway speaking the
//! same wire protocol.

use super::batch::{build_batch_prompt, parse_batch_response};
use super::provider::{LlmProvider, Usage};
use crate::batching::WorkUnit;
use crate::error::LlmError;
use crate::model::AiMetrics;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct OpenAiCompatibleAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    per_attempt_timeout: Duration,
}

impl OpenAiCompatibleAdapter {
    pub fn new(
        api_key: String,
        model: String,
        endpoint: Option<String>,
        per_attempt_timeout: Duration,
    ) -> Self {
        let endpoint =
            endpoint.unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            per_attempt_timeout,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleAdapter {
    async fn analyze_daily_batch(
        &self,
        units: &[WorkUnit],
    ) -> Result<(Vec<AiMetrics>, Usage), LlmError> {
        let prompt = build_batch_prompt(units);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = tokio::time::timeout(
            self.per_attempt_timeout,
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send(),
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
        let text = envelope["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();

        let (metrics, parse_err) = parse_batch_response(text, units.len());
        if let Some(err) = &parse_err {
            tracing::warn!(provider = "openai", error = %err, "batch response failed strict parsing, using fallback");
        }

        let usage = Usage {
            prompt_tokens: envelope["usage"]["prompt_tokens"].as_u64(),
            response_tokens: envelope["usage"]["completion_tokens"].as_u64(),
            structural_error: parse_err.map(|e| e.to_string()),
        };

        Ok((metrics, usage))
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// crates/core/src/llm/factory.rs
//! Selects and constructs the configured `LlmProvider` (§9's "selection by
//! configuration, not dynamic dispatch at call sites").

use super::gemini::GeminiAdapter;
use super::openai_compatible::OpenAiCompatibleAdapter;
use super::provider::LlmProvider;
use crate::config::{AiService, Config};
use crate::error::LlmError;
use std::sync::Arc;

pub fn create_provider(config: &Config) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let api_key = config
        .llm_api_key
        .clone()
        .ok_or_else(|| LlmError::NotConfigured("LLM_API_KEY is not set".to_string()))?;

    Ok(match config.ai_service {
        AiService::Gemini => Arc::new(GeminiAdapter::new(
            api_key,
            config.llm_model.clone(),
            config.llm_endpoint.clone(),
            config.llm_per_attempt_timeout,
        )),
        AiService::OpenAi => Arc::new(OpenAiCompatibleAdapter::new(
            api_key,
            config.llm_model.clone(),
            config.llm_endpoint.clone(),
            config.llm_per_attempt_timeout,
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_when_api_key_missing() {
        let config = Config::default();
        let result = create_provider(&config);
        assert!(matches!(result, Err(LlmError::NotConfigured(_))));
    }

    #[test]
    fn builds_gemini_provider_by_default() {
        let mut config = Config::default();
        config.llm_api_key = Some("test-key".to_string());
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn builds_openai_provider_when_configured() {
        let mut config = Config::default();
        config.llm_api_key = Some("test-key".to_string());
        config.ai_service = AiService::OpenAi;
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}

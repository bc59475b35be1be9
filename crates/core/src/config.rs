// crates/core/src/config.rs
//! Startup configuration, read once from the environment (§6).
//!
//! Follows the teacher's `get_port()`/`get_static_dir()` pattern of reading
//! individual env vars with fallbacks, generalized into one typed struct
//! since PowerPulse has many more tunables than a single port number.

use std::time::Duration;

/// Which LLM vendor adapter to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiService {
    Gemini,
    OpenAi,
}

impl AiService {
    fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "openai" => AiService::OpenAi,
            _ => AiService::Gemini,
        }
    }
}

/// The exact auto-reply sentence filtered by the message validator (C1),
/// unless overridden by `AUTORESPONSE_SENTENCE`.
pub const DEFAULT_AUTORESPONSE_SENTENCE: &str = "Thank you for reaching out! Did you know that you can now dial *977# to report a power outage or get your last three tokens instantly?";

/// Process-wide configuration, read once at startup (§6).
#[derive(Debug, Clone)]
pub struct Config {
    pub ai_service: AiService,
    pub max_tokens_per_job: usize,
    pub batch_size: usize,
    pub ai_concurrency: usize,
    pub min_inter_call_delay: Duration,
    pub max_file_size: usize,
    pub autoresponse_sentence: String,
    /// §9 open question: substring-contains matching is a config toggle
    /// that defaults off. This spec adopts exact-match as the default.
    pub autoresponse_substring_match: bool,
    pub database_url: String,
    pub llm_api_key: Option<String>,
    pub llm_endpoint: Option<String>,
    pub llm_model: String,
    pub llm_per_attempt_timeout: Duration,
    pub upload_total_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_service: AiService::Gemini,
            max_tokens_per_job: 16_000,
            batch_size: 20,
            ai_concurrency: 2,
            min_inter_call_delay: Duration::from_secs(1),
            max_file_size: 52_428_800,
            autoresponse_sentence: DEFAULT_AUTORESPONSE_SENTENCE.to_string(),
            autoresponse_substring_match: false,
            database_url: "sqlite://powerpulse.db".to_string(),
            llm_api_key: None,
            llm_endpoint: None,
            llm_model: "gemini-1.5-flash".to_string(),
            llm_per_attempt_timeout: Duration::from_secs(60),
            upload_total_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl Config {
    /// Build configuration from the process environment, falling back to
    /// the documented defaults (§6) for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ai_service: std::env::var("AI_SERVICE")
                .map(|v| AiService::parse(&v))
                .unwrap_or(defaults.ai_service),
            max_tokens_per_job: env_usize("MAX_TOKENS_PER_JOB", defaults.max_tokens_per_job),
            batch_size: env_usize("BATCH_SIZE", defaults.batch_size),
            ai_concurrency: env_usize("AI_CONCURRENCY", defaults.ai_concurrency).max(1),
            min_inter_call_delay: Duration::from_millis(
                env_usize(
                    "MIN_INTER_CALL_DELAY_MS",
                    defaults.min_inter_call_delay.as_millis() as usize,
                ) as u64,
            ),
            max_file_size: env_usize("MAX_FILE_SIZE", defaults.max_file_size),
            autoresponse_sentence: std::env::var("AUTORESPONSE_SENTENCE")
                .unwrap_or(defaults.autoresponse_sentence),
            autoresponse_substring_match: std::env::var("AUTORESPONSE_SUBSTRING_MATCH")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.autoresponse_substring_match),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            llm_api_key: std::env::var("LLM_API_KEY").ok(),
            llm_endpoint: std::env::var("LLM_ENDPOINT").ok(),
            llm_model: std::env::var("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_per_attempt_timeout: defaults.llm_per_attempt_timeout,
            upload_total_timeout: defaults.upload_total_timeout,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let c = Config::default();
        assert_eq!(c.max_tokens_per_job, 16_000);
        assert_eq!(c.batch_size, 20);
        assert_eq!(c.ai_concurrency, 2);
        assert_eq!(c.min_inter_call_delay, Duration::from_secs(1));
        assert_eq!(c.max_file_size, 52_428_800);
        assert!(!c.autoresponse_substring_match);
    }

    #[test]
    fn ai_service_parse_defaults_to_gemini() {
        assert_eq!(AiService::parse("bogus"), AiService::Gemini);
        assert_eq!(AiService::parse("OpenAI"), AiService::OpenAi);
    }
}

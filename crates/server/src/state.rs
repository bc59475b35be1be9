// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use powerpulse_core::llm::LlmProvider;
use powerpulse_core::Config;
use powerpulse_db::Database;

use crate::progress::ProgressRegistry;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Persistence gateway (C3).
    pub db: Database,
    /// Process-wide configuration read at startup (§6).
    pub config: Config,
    /// The selected LLM vendor adapter (C5), chosen once at startup.
    pub provider: Arc<dyn LlmProvider>,
    /// Progress tracker registry (C9), process lifetime (§9 "Global
    /// progress store").
    pub progress: ProgressRegistry,
}

impl AppState {
    pub fn new(db: Database, config: Config, provider: Arc<dyn LlmProvider>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            config,
            provider,
            progress: ProgressRegistry::new(),
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerpulse_core::llm::factory::create_provider;
    use std::thread::sleep;
    use std::time::Duration;

    async fn test_state() -> Arc<AppState> {
        let db = Database::new_in_memory().await.expect("in-memory DB");
        let mut config = Config::default();
        config.llm_api_key = Some("test-key".to_string());
        let provider = create_provider(&config).expect("provider should build with a key set");
        AppState::new(db, config, provider)
    }

    #[tokio::test]
    async fn app_state_starts_with_near_zero_uptime() {
        let state = test_state().await;
        assert!(state.uptime_secs() < 1);
    }

    #[tokio::test]
    async fn app_state_uptime_advances() {
        let state = test_state().await;
        sleep(Duration::from_millis(100));
        assert!(state.uptime_secs() < 5);
    }

    #[tokio::test]
    async fn app_state_clone_shares_progress_registry() {
        let state = test_state().await;
        let cloned = (*state).clone();
        cloned.progress.register("u1".to_string(), 1);
        assert!(state.progress.get("u1").is_some());
    }
}

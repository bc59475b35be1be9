// crates/server/src/progress/types.rs
//! Types for the per-upload progress tracker (C9, §4.9).

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifier for one end-to-end upload session.
pub type UploadId = String;

/// Terminal and in-flight states of an upload (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    /// §7: the orchestrator never reports `completed` with zero processed
    /// conversations when the input was non-empty.
    CompletedWithFilters,
    Failed,
    Cancelled,
}

/// Pipeline stage, set at each transition (§4.9, §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Receiving,
    Validating,
    FilteringConversations,
    Persisting,
    Batching,
    AiAnalysis,
    Finalizing,
}

/// Running counters surfaced in the progress snapshot (§4.9).
#[derive(Debug, Default, Clone, Serialize)]
pub struct Statistics {
    pub filtered_autoresponses: u64,
    pub filtered_invalid: u64,
    pub ai_calls_made: u64,
    pub ai_failures: u64,
    pub tokens_used: u64,
}

/// A point-in-time view of one upload's progress, returned by
/// `GET /api/progress/{upload_id}` (§6, §4.9).
#[derive(Debug, Serialize)]
pub struct ProgressSnapshot {
    pub upload_id: UploadId,
    pub status: UploadStatus,
    pub current_stage: Stage,
    pub processed_conversations: u64,
    pub total_conversations: u64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub last_update: chrono::DateTime<chrono::Utc>,
    pub details: String,
    pub statistics: Statistics,
    pub errors: Vec<String>,
    pub progress_percentage: f64,
}

/// Cooperative cancellation signal threaded through every suspension point
/// in the job scheduler (§5, §9 "replace ambient coroutine cancellation
/// with an explicit per-upload cancellation token"). Cheap to clone; every
/// clone observes the same flag.
#[derive(Debug, Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

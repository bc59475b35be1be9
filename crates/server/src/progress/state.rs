// crates/server/src/progress/state.rs
//! Atomic per-upload progress state (C9, §4.9). Every field is either a
//! lock-free atomic or a small `RwLock` guard, so concurrent job workers
//! (§5) can update progress without blocking each other or the poller.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use super::types::{CancellationToken, ProgressSnapshot, Stage, Statistics, UploadId, UploadStatus};

/// Bound on the `errors` list returned to pollers (§4.9 "bounded list").
const MAX_ERRORS: usize = 50;

pub struct UploadState {
    upload_id: UploadId,
    status: AtomicU8,
    stage: AtomicU8,
    processed_conversations: AtomicU64,
    total_conversations: AtomicU64,
    completed_jobs: AtomicU64,
    total_jobs: AtomicU64,
    start_time: chrono::DateTime<Utc>,
    last_update: RwLock<chrono::DateTime<Utc>>,
    details: RwLock<String>,
    filtered_autoresponses: AtomicU64,
    filtered_invalid: AtomicU64,
    ai_calls_made: AtomicU64,
    ai_failures: AtomicU64,
    tokens_used: AtomicU64,
    errors: RwLock<Vec<String>>,
    cancel: CancellationToken,
}

fn status_to_u8(s: UploadStatus) -> u8 {
    match s {
        UploadStatus::Pending => 0,
        UploadStatus::Processing => 1,
        UploadStatus::Completed => 2,
        UploadStatus::CompletedWithFilters => 3,
        UploadStatus::Failed => 4,
        UploadStatus::Cancelled => 5,
    }
}

fn u8_to_status(v: u8) -> UploadStatus {
    match v {
        1 => UploadStatus::Processing,
        2 => UploadStatus::Completed,
        3 => UploadStatus::CompletedWithFilters,
        4 => UploadStatus::Failed,
        5 => UploadStatus::Cancelled,
        _ => UploadStatus::Pending,
    }
}

fn stage_to_u8(s: Stage) -> u8 {
    match s {
        Stage::Receiving => 0,
        Stage::Validating => 1,
        Stage::FilteringConversations => 2,
        Stage::Persisting => 3,
        Stage::Batching => 4,
        Stage::AiAnalysis => 5,
        Stage::Finalizing => 6,
    }
}

fn u8_to_stage(v: u8) -> Stage {
    match v {
        1 => Stage::Validating,
        2 => Stage::FilteringConversations,
        3 => Stage::Persisting,
        4 => Stage::Batching,
        5 => Stage::AiAnalysis,
        6 => Stage::Finalizing,
        _ => Stage::Receiving,
    }
}

impl UploadState {
    pub fn new(upload_id: UploadId, total_conversations: u64) -> Self {
        let now = Utc::now();
        Self {
            upload_id,
            status: AtomicU8::new(status_to_u8(UploadStatus::Pending)),
            stage: AtomicU8::new(stage_to_u8(Stage::Receiving)),
            processed_conversations: AtomicU64::new(0),
            total_conversations: AtomicU64::new(total_conversations),
            completed_jobs: AtomicU64::new(0),
            total_jobs: AtomicU64::new(0),
            start_time: now,
            last_update: RwLock::new(now),
            details: RwLock::new(String::new()),
            filtered_autoresponses: AtomicU64::new(0),
            filtered_invalid: AtomicU64::new(0),
            ai_calls_made: AtomicU64::new(0),
            ai_failures: AtomicU64::new(0),
            tokens_used: AtomicU64::new(0),
            errors: RwLock::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn touch(&self) {
        match self.last_update.write() {
            Ok(mut guard) => *guard = Utc::now(),
            Err(e) => tracing::error!("progress RwLock poisoned: {e}"),
        }
    }

    pub fn set_status(&self, status: UploadStatus) {
        self.status.store(status_to_u8(status), Ordering::Relaxed);
        self.touch();
    }

    pub fn set_stage(&self, stage: Stage, details: impl Into<String>) {
        self.stage.store(stage_to_u8(stage), Ordering::Relaxed);
        match self.details.write() {
            Ok(mut guard) => *guard = details.into(),
            Err(e) => tracing::error!("progress RwLock poisoned: {e}"),
        }
        self.touch();
    }

    pub fn set_total_conversations(&self, total: u64) {
        self.total_conversations.store(total, Ordering::Relaxed);
        self.touch();
    }

    pub fn increment_processed_conversations(&self) {
        self.processed_conversations.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn set_total_jobs(&self, total: u64) {
        self.total_jobs.store(total, Ordering::Relaxed);
        self.touch();
    }

    pub fn increment_completed_jobs(&self) {
        self.completed_jobs.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_filtered_autoresponse(&self) {
        self.filtered_autoresponses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered_invalid(&self) {
        self.filtered_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ai_call(&self, tokens: u64) {
        self.ai_calls_made.fetch_add(1, Ordering::Relaxed);
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn record_ai_failure(&self) {
        self.ai_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Appends an error, evicting the oldest entry once `MAX_ERRORS` is hit
    /// (§4.9 "bounded list").
    pub fn push_error(&self, message: impl Into<String>) {
        match self.errors.write() {
            Ok(mut guard) => {
                if guard.len() >= MAX_ERRORS {
                    guard.remove(0);
                }
                guard.push(message.into());
            }
            Err(e) => tracing::error!("progress RwLock poisoned: {e}"),
        }
        self.touch();
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// `progress_percentage` per §4.9: driven by completed/total jobs during
    /// `ai_analysis`, 0 before it starts, 100 only once genuinely complete.
    fn progress_percentage(&self, status: UploadStatus, stage: Stage) -> f64 {
        match status {
            UploadStatus::Completed => 100.0,
            // §8 scenario 1: an empty upload (`total_conversations = 0` from
            // the start) is `completed_with_filters` at 100%; a non-empty
            // upload where every chat was filtered reports 0% (§7).
            UploadStatus::CompletedWithFilters => {
                if self.total_conversations.load(Ordering::Relaxed) == 0 {
                    100.0
                } else {
                    0.0
                }
            }
            UploadStatus::Pending => 0.0,
            _ => {
                if stage as u8 >= Stage::AiAnalysis as u8 {
                    let total = self.total_jobs.load(Ordering::Relaxed);
                    if total == 0 {
                        0.0
                    } else {
                        let completed = self.completed_jobs.load(Ordering::Relaxed);
                        (completed as f64 / total as f64) * 100.0
                    }
                } else {
                    0.0
                }
            }
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let status = u8_to_status(self.status.load(Ordering::Relaxed));
        let stage = u8_to_stage(self.stage.load(Ordering::Relaxed));

        ProgressSnapshot {
            upload_id: self.upload_id.clone(),
            status,
            current_stage: stage,
            processed_conversations: self.processed_conversations.load(Ordering::Relaxed),
            total_conversations: self.total_conversations.load(Ordering::Relaxed),
            start_time: self.start_time,
            last_update: self.last_update.read().map(|g| *g).unwrap_or(self.start_time),
            details: self.details.read().map(|g| g.clone()).unwrap_or_default(),
            statistics: Statistics {
                filtered_autoresponses: self.filtered_autoresponses.load(Ordering::Relaxed),
                filtered_invalid: self.filtered_invalid.load(Ordering::Relaxed),
                ai_calls_made: self.ai_calls_made.load(Ordering::Relaxed),
                ai_failures: self.ai_failures.load(Ordering::Relaxed),
                tokens_used: self.tokens_used.load(Ordering::Relaxed),
            },
            errors: self.errors.read().map(|g| g.clone()).unwrap_or_default(),
            progress_percentage: self.progress_percentage(status, stage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_pending_at_zero_percent() {
        let s = UploadState::new("u1".to_string(), 3);
        let snap = s.snapshot();
        assert_eq!(snap.status, UploadStatus::Pending);
        assert_eq!(snap.progress_percentage, 0.0);
    }

    #[test]
    fn percentage_tracks_completed_over_total_jobs_during_ai_analysis() {
        let s = UploadState::new("u1".to_string(), 3);
        s.set_status(UploadStatus::Processing);
        s.set_stage(Stage::AiAnalysis, "scoring");
        s.set_total_jobs(4);
        s.increment_completed_jobs();
        assert_eq!(s.snapshot().progress_percentage, 25.0);
    }

    #[test]
    fn completed_status_always_reports_100() {
        let s = UploadState::new("u1".to_string(), 3);
        s.set_status(UploadStatus::Completed);
        assert_eq!(s.snapshot().progress_percentage, 100.0);
    }

    #[test]
    fn empty_upload_completed_with_filters_reports_100() {
        let s = UploadState::new("u1".to_string(), 0);
        s.set_status(UploadStatus::CompletedWithFilters);
        assert_eq!(s.snapshot().progress_percentage, 100.0);
    }

    #[test]
    fn all_chats_filtered_completed_with_filters_reports_0() {
        let s = UploadState::new("u1".to_string(), 2);
        s.set_status(UploadStatus::CompletedWithFilters);
        assert_eq!(s.snapshot().progress_percentage, 0.0);
    }

    #[test]
    fn error_list_is_bounded() {
        let s = UploadState::new("u1".to_string(), 1);
        for i in 0..60 {
            s.push_error(format!("error {i}"));
        }
        let snap = s.snapshot();
        assert_eq!(snap.errors.len(), MAX_ERRORS);
        assert_eq!(snap.errors[0], "error 10");
    }

    #[test]
    fn cancellation_token_reflects_cancel_call() {
        let s = UploadState::new("u1".to_string(), 1);
        let token = s.cancellation_token();
        assert!(!token.is_cancelled());
        s.cancel();
        assert!(token.is_cancelled());
    }
}

// crates/server/src/progress/mod.rs
//! Process-lifetime registry of upload progress (C9, §4.9). Mirrors the
//! shape of the teacher's job registry: a map of id -> shared state behind
//! a single `RwLock`, cheap to poll, cheap to register a new upload into.

mod state;
mod types;

pub use state::UploadState;
pub use types::{CancellationToken, ProgressSnapshot, Stage, Statistics, UploadId, UploadStatus};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Shared handle to all in-flight and recently-finished uploads.
#[derive(Clone, Default)]
pub struct ProgressRegistry {
    inner: Arc<RwLock<HashMap<UploadId, Arc<UploadState>>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new upload and returns its shared state for the
    /// orchestrator to drive.
    pub fn register(&self, upload_id: UploadId, total_conversations: u64) -> Arc<UploadState> {
        let state = Arc::new(UploadState::new(upload_id.clone(), total_conversations));
        match self.inner.write() {
            Ok(mut map) => {
                map.insert(upload_id, state.clone());
            }
            Err(e) => tracing::error!("progress registry RwLock poisoned: {e}"),
        }
        state
    }

    pub fn get(&self, upload_id: &str) -> Option<Arc<UploadState>> {
        self.inner.read().ok()?.get(upload_id).cloned()
    }

    pub fn snapshot(&self, upload_id: &str) -> Option<ProgressSnapshot> {
        self.get(upload_id).map(|s| s.snapshot())
    }
}

// crates/db/src/queries/mod.rs
//! The C3 persistence gateway operations (§4.3), one module per entity.

pub mod conversations;
pub mod daily_analysis;
pub mod jobs;
pub mod messages;
pub mod metrics;
pub mod processed_chats;

pub use conversations::{ConversationMetadata, UpsertedConversation};
pub use jobs::JobResultUpdate;

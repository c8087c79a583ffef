use async_trait::async_trait;

use crate::error::ApiError;

pub use client::HttpChatApi;
pub use record::{
    into_messages, into_participants, AttachmentRecord, MessageRecord, ParticipantRecord,
    ReactionRecord, SessionInfo, WireTime,
};

mod client;
mod record;

pub type ApiResult<T> = Result<T, ApiError>;

/// The remote chat server.
///
/// Timestamps passed to the `*_updated_*` calls are epoch millis.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_all_messages(&self) -> ApiResult<Vec<MessageRecord>>;

    /// Most recent page of messages (the server caps it at 25).
    async fn fetch_latest_messages(&self) -> ApiResult<Vec<MessageRecord>>;

    async fn fetch_older_messages(&self, ref_message_uuid: &str) -> ApiResult<Vec<MessageRecord>>;

    async fn fetch_updated_messages(&self, since: i64) -> ApiResult<Vec<MessageRecord>>;

    async fn send_message(&self, text: &str) -> ApiResult<MessageRecord>;

    async fn add_reaction(&self, message_uuid: &str, reaction: &str) -> ApiResult<()>;

    async fn fetch_participants(&self) -> ApiResult<Vec<ParticipantRecord>>;

    async fn fetch_updated_participants(&self, since: i64) -> ApiResult<Vec<ParticipantRecord>>;

    async fn fetch_session_info(&self) -> ApiResult<SessionInfo>;
}

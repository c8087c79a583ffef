use serde::{Deserialize, Serialize};

pub use grouping::{day_label, group_messages, group_messages_local, DisplayItem};
pub use message::{Attachment, AttachmentKind, Message, Reaction};
pub use reactions::{summarize, ReactionSummary};
pub use state::{ChatState, ReactionOutcome};
pub use store::{ChatStore, SyncReport, STORAGE_NAME};

mod grouping;
mod message;
mod reactions;
mod state;
mod store;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub uuid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Participant {
    /// Stand-in for an author missing from the participant map.
    pub fn unknown(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            name: "Unknown".to_string(),
            avatar_url: None,
            bio: None,
            job_title: None,
            email: None,
            created_at: None,
            updated_at: None,
        }
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub uuid: String,
    pub author_uuid: String,
    pub text: String,
    /// Epoch milliseconds.
    pub sent_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Weak reference, the target may not be loaded (or may not exist at all).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_uuid: Option<String>,
    #[serde(default)]
    pub edited: bool,
}

impl Message {
    pub fn has_reaction_from(&self, participant_uuid: &str, value: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.value == value && r.participant_uuid == participant_uuid)
    }

    pub fn images(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Image)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    #[serde(alias = "id")]
    pub uuid: String,
    pub value: String,
    pub participant_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl Reaction {
    pub fn count(&self) -> u32 {
        self.count.unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(alias = "id")]
    pub uuid: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    #[default]
    Image,
    #[serde(other)]
    Other,
}

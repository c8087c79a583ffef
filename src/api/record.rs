//! Wire records as the server sends them.
//!
//! The server is loose about field names (`id` vs `uuid`, `createdAt` vs
//! `sentAt`) and about timestamp encoding, so records are decoded leniently
//! and converted into the strict [`crate::chat`] types afterwards.

use serde::Deserialize;

use crate::chat::{Attachment, AttachmentKind, Message, Participant, Reaction};

pub const MISSING_TEXT: &str = "No content";

/// A timestamp that is either epoch millis or a date string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTime {
    Millis(i64),
    Float(f64),
    Text(String),
}

impl WireTime {
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            Self::Millis(ms) => Some(*ms),
            Self::Float(ms) if ms.is_finite() => Some(*ms as i64),
            Self::Float(_) => None,
            Self::Text(s) => {
                let s = s.trim();
                if let Ok(ms) = s.parse::<i64>() {
                    return Some(ms);
                }
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.timestamp_millis())
                    .ok()
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub author_uuid: Option<String>,
    #[serde(default)]
    pub created_at: Option<WireTime>,
    #[serde(default)]
    pub sent_at: Option<WireTime>,
    #[serde(default)]
    pub updated_at: Option<WireTime>,
    #[serde(default)]
    pub reactions: Option<Vec<ReactionRecord>>,
    #[serde(default)]
    pub attachments: Option<Vec<AttachmentRecord>>,
    #[serde(default)]
    pub reply_to_message_uuid: Option<String>,
}

impl MessageRecord {
    fn id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.uuid.as_deref())
            .filter(|id| !id.trim().is_empty())
    }

    fn sent_at(&self) -> Option<i64> {
        self.created_at
            .as_ref()
            .and_then(WireTime::as_millis)
            .or_else(|| self.sent_at.as_ref().and_then(WireTime::as_millis))
    }

    /// Converts into a [`Message`]. `fallback_sent_at` is used when the record
    /// carries no usable timestamp; without one such records are rejected.
    pub fn into_message(self, fallback_sent_at: Option<i64>) -> Option<Message> {
        let uuid = self.id()?.to_string();
        let sent_at = self.sent_at().or(fallback_sent_at)?;
        Some(self.build(uuid, sent_at))
    }

    /// Converts the server's reply to a send. Missing ids are replaced by a
    /// local one, missing timestamps by `now`.
    pub fn into_sent_message(self, now: i64) -> Message {
        let uuid = match self.id() {
            Some(id) => id.to_string(),
            None => {
                tracing::warn!("server did not assign a message id, using a local one");
                uuid::Uuid::new_v4().to_string()
            }
        };
        let sent_at = self.sent_at().unwrap_or(now);

        let mut message = self.build(uuid, sent_at);
        message.updated_at = message.updated_at.or(Some(now));
        message
    }

    fn build(self, uuid: String, sent_at: i64) -> Message {
        let text = self
            .text
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| MISSING_TEXT.to_string());

        let reactions = keep_valid(&uuid, "reaction", self.reactions, ReactionRecord::into_reaction);
        let attachments = keep_valid(
            &uuid,
            "attachment",
            self.attachments,
            AttachmentRecord::into_attachment,
        );

        Message {
            uuid,
            author_uuid: self.author_uuid.unwrap_or_default(),
            text,
            sent_at,
            updated_at: self.updated_at.as_ref().and_then(WireTime::as_millis),
            reactions,
            attachments,
            reply_to_message_uuid: self.reply_to_message_uuid,
            edited: false,
        }
    }
}

/// Converts the nested entries of one message, dropping the unusable ones.
fn keep_valid<R, T>(
    message_uuid: &str,
    kind: &'static str,
    records: Option<Vec<R>>,
    convert: fn(R) -> Option<T>,
) -> Vec<T> {
    let records = records.unwrap_or_default();
    let total = records.len();
    let kept: Vec<T> = records.into_iter().filter_map(convert).collect();

    if kept.len() != total {
        tracing::warn!(
            message_uuid,
            kind,
            dropped = total - kept.len(),
            "dropped malformed nested records"
        );
    }
    kept
}

fn non_blank(id: Option<String>) -> Option<String> {
    id.filter(|id| !id.trim().is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub participant_uuid: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
}

impl ReactionRecord {
    /// Needs an id, an emoji and the reacting participant.
    pub fn into_reaction(self) -> Option<Reaction> {
        Some(Reaction {
            uuid: non_blank(self.uuid.or(self.id))?,
            value: self.value.filter(|v| !v.is_empty())?,
            participant_uuid: non_blank(self.participant_uuid)?,
            count: self.count,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<AttachmentKind>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl AttachmentRecord {
    /// Needs an id and a url.
    pub fn into_attachment(self) -> Option<Attachment> {
        Some(Attachment {
            uuid: non_blank(self.uuid.or(self.id))?,
            url: non_blank(self.url)?,
            kind: self.kind.unwrap_or_default(),
            width: self.width,
            height: self.height,
        })
    }
}

/// Converts a fetched batch, dropping records without an id or timestamp.
pub fn into_messages(records: Vec<MessageRecord>) -> Vec<Message> {
    let total = records.len();
    let messages: Vec<Message> = records
        .into_iter()
        .filter_map(|record| record.into_message(None))
        .collect();

    if messages.len() != total {
        tracing::warn!(
            dropped = total - messages.len(),
            total,
            "dropped malformed message records"
        );
    }
    messages
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<WireTime>,
    #[serde(default)]
    pub updated_at: Option<WireTime>,
}

impl ParticipantRecord {
    /// `None` when the record carries no id.
    pub fn into_participant(self) -> Option<Participant> {
        Some(Participant {
            uuid: non_blank(self.uuid.or(self.id))?,
            name: self.name.unwrap_or_default(),
            avatar_url: self.avatar_url,
            bio: self.bio,
            job_title: self.job_title,
            email: self.email,
            created_at: self.created_at.as_ref().and_then(WireTime::as_millis),
            updated_at: self.updated_at.as_ref().and_then(WireTime::as_millis),
        })
    }
}

/// Converts a fetched participant list, dropping records without an id.
pub fn into_participants(records: Vec<ParticipantRecord>) -> Vec<Participant> {
    let total = records.len();
    let participants: Vec<Participant> = records
        .into_iter()
        .filter_map(ParticipantRecord::into_participant)
        .collect();

    if participants.len() != total {
        tracing::warn!(
            dropped = total - participants.len(),
            total,
            "dropped participant records without an id"
        );
    }
    participants
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_uuid: String,
    #[serde(default)]
    pub api_version: Option<serde_json::Value>,
}

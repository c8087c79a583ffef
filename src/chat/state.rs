use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{Message, Participant, Reaction};
use crate::error::{StoreError, StoreResult};

/// In-memory chat state and the synchronous actions that reconcile it.
///
/// The message list is kept sorted ascending by `sent_at` (stable for equal
/// timestamps) and holds at most one message per `uuid`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    participants: HashMap<String, Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_synced_at: Option<i64>,
    #[serde(skip)]
    replying_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReactionOutcome {
    Added(Reaction),
    /// The participant already reacted with this emoji, nothing changed.
    AlreadyReacted,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn participants(&self) -> &HashMap<String, Participant> {
        &self.participants
    }

    pub fn replying_to(&self) -> Option<&str> {
        self.replying_to.as_deref()
    }

    pub fn last_synced_at(&self) -> Option<i64> {
        self.last_synced_at
    }

    pub fn message(&self, uuid: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.uuid == uuid)
    }

    pub fn participant(&self, uuid: &str) -> Option<&Participant> {
        self.participants.get(uuid)
    }

    pub fn author_of(&self, message: &Message) -> Cow<'_, Participant> {
        match self.participants.get(&message.author_uuid) {
            Some(p) => Cow::Borrowed(p),
            None => Cow::Owned(Participant::unknown(&message.author_uuid)),
        }
    }

    /// The message `message` replies to, if it is loaded.
    pub fn replied_message(&self, message: &Message) -> Option<&Message> {
        message
            .reply_to_message_uuid
            .as_deref()
            .and_then(|uuid| self.message(uuid))
    }

    /// Full replace with a server batch.
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        let mut seen = HashSet::new();
        self.messages = messages
            .into_iter()
            .filter(|m| seen.insert(m.uuid.clone()))
            .collect();
        self.messages.sort_by_key(|m| m.sent_at);
    }

    /// Merges a page of older messages, skipping ids already present.
    /// Returns how many were added.
    pub fn merge_older(&mut self, older: Vec<Message>) -> usize {
        let mut seen: HashSet<String> = self.messages.iter().map(|m| m.uuid.clone()).collect();
        let before = self.messages.len();

        self.messages
            .extend(older.into_iter().filter(|m| seen.insert(m.uuid.clone())));
        self.messages.sort_by_key(|m| m.sent_at);

        self.messages.len() - before
    }

    /// Inserts at the `sent_at` position, after any messages with the same
    /// timestamp. A message with a known id replaces the existing one.
    pub fn insert_message(&mut self, message: Message) {
        if let Some(pos) = self.position(&message.uuid) {
            self.messages.remove(pos);
        }

        if self
            .messages
            .last()
            .map_or(true, |last| last.sent_at <= message.sent_at)
        {
            self.messages.push(message);
        } else {
            let pos = self
                .messages
                .partition_point(|existing| existing.sent_at <= message.sent_at);
            self.messages.insert(pos, message);
        }
    }

    /// Applies a batch of new or changed messages. Returns `(added, updated)`.
    pub fn upsert_messages(&mut self, messages: Vec<Message>) -> (usize, usize) {
        let (mut added, mut updated) = (0, 0);
        for message in messages {
            if self.position(&message.uuid).is_some() {
                updated += 1;
            } else {
                added += 1;
            }
            self.insert_message(message);
        }
        (added, updated)
    }

    pub fn set_replying_to(&mut self, uuid: Option<String>) {
        self.replying_to = uuid;
    }

    pub fn take_replying_to(&mut self) -> Option<String> {
        self.replying_to.take()
    }

    /// Adds `emoji` from `participant_uuid` unless that participant already
    /// reacted with it.
    pub fn add_reaction(
        &mut self,
        message_uuid: &str,
        emoji: &str,
        participant_uuid: &str,
    ) -> StoreResult<ReactionOutcome> {
        let message = self.message_mut(message_uuid)?;
        if message.has_reaction_from(participant_uuid, emoji) {
            return Ok(ReactionOutcome::AlreadyReacted);
        }

        let reaction = Reaction {
            uuid: uuid::Uuid::new_v4().to_string(),
            value: emoji.to_string(),
            participant_uuid: participant_uuid.to_string(),
            count: None,
        };
        message.reactions.push(reaction.clone());
        Ok(ReactionOutcome::Added(reaction))
    }

    /// Drops a reaction by id. Returns whether one was removed.
    pub fn remove_reaction(&mut self, message_uuid: &str, reaction_uuid: &str) -> bool {
        let Ok(message) = self.message_mut(message_uuid) else {
            return false;
        };
        let before = message.reactions.len();
        message.reactions.retain(|r| r.uuid != reaction_uuid);
        message.reactions.len() != before
    }

    pub fn edit_message(&mut self, uuid: &str, text: &str, now: i64) -> StoreResult<()> {
        let message = self.message_mut(uuid)?;
        message.text = text.to_string();
        message.edited = true;
        message.updated_at = Some(now);
        Ok(())
    }

    pub fn replace_participants(&mut self, participants: impl IntoIterator<Item = Participant>) {
        self.participants = participants
            .into_iter()
            .map(|p| (p.uuid.clone(), p))
            .collect();
    }

    /// Incoming participants win over existing entries with the same id.
    pub fn merge_participants(&mut self, participants: impl IntoIterator<Item = Participant>) {
        self.participants
            .extend(participants.into_iter().map(|p| (p.uuid.clone(), p)));
    }

    pub fn set_last_synced_at(&mut self, at: i64) {
        self.last_synced_at = Some(at);
    }

    fn position(&self, uuid: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.uuid == uuid)
    }

    fn message_mut(&mut self, uuid: &str) -> StoreResult<&mut Message> {
        self.messages
            .iter_mut()
            .find(|m| m.uuid == uuid)
            .ok_or_else(|| StoreError::MessageNotFound(uuid.to_string()))
    }
}

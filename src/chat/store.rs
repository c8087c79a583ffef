use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{ChatState, Message, Participant, ReactionOutcome};
use crate::api::{into_messages, into_participants, ApiResult, ChatApi, SessionInfo};
use crate::error::StoreResult;
use crate::storage::KeyValueStore;

/// Name of the persisted snapshot blob.
pub const STORAGE_NAME: &str = "chat-storage";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    state: &'a ChatState,
}

#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    version: u32,
    state: ChatState,
}

/// What a [`ChatStore::sync_updates`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub messages_added: usize,
    pub messages_updated: usize,
    pub participants_updated: usize,
}

/// The chat state bound to a server and a snapshot store.
///
/// Every remote call is logged and returned as an error on failure; the
/// state is only changed once the server has answered (reactions excepted,
/// which are applied first and rolled back if the server rejects them).
pub struct ChatStore<A, S> {
    api: A,
    storage: S,
    state: ChatState,
    me: String,
}

impl<A: ChatApi, S: KeyValueStore> ChatStore<A, S> {
    /// Opens the store, restoring the last persisted snapshot if any.
    pub async fn open(api: A, storage: S, local_participant_uuid: &str) -> StoreResult<Self> {
        let state = match storage.get_item(STORAGE_NAME).await? {
            Some(blob) => match serde_json::from_str::<Snapshot>(&blob) {
                Ok(Snapshot { version, state }) => {
                    tracing::debug!(
                        version,
                        messages = state.messages().len(),
                        participants = state.participants().len(),
                        "restored chat snapshot"
                    );
                    state
                }
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring unreadable chat snapshot");
                    ChatState::new()
                }
            },
            None => ChatState::new(),
        };

        Ok(Self {
            api,
            storage,
            state,
            me: local_participant_uuid.to_string(),
        })
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.state.messages()
    }

    pub fn participants(&self) -> &HashMap<String, Participant> {
        self.state.participants()
    }

    pub fn replying_to(&self) -> Option<&str> {
        self.state.replying_to()
    }

    pub fn local_participant_uuid(&self) -> &str {
        &self.me
    }

    pub fn set_replying_to(&mut self, message_uuid: Option<String>) {
        self.state.set_replying_to(message_uuid);
    }

    /// Replaces the message list with everything the server has.
    pub async fn load_messages(&mut self) -> StoreResult<usize> {
        let records = logged("load all messages", self.api.fetch_all_messages().await)?;
        self.replace_messages(into_messages(records)).await
    }

    /// Replaces the message list with the server's most recent page.
    pub async fn load_latest_messages(&mut self) -> StoreResult<usize> {
        let records = logged("load latest messages", self.api.fetch_latest_messages().await)?;
        self.replace_messages(into_messages(records)).await
    }

    async fn replace_messages(&mut self, messages: Vec<Message>) -> StoreResult<usize> {
        self.state.replace_messages(messages);
        let count = self.state.messages().len();
        tracing::info!(count, "loaded messages");
        self.persist().await?;
        Ok(count)
    }

    /// Merges the page before `ref_message_uuid`. Returns how many messages
    /// were new.
    pub async fn load_older_messages(&mut self, ref_message_uuid: &str) -> StoreResult<usize> {
        let records = logged(
            "load older messages",
            self.api.fetch_older_messages(ref_message_uuid).await,
        )?;

        let added = self.state.merge_older(into_messages(records));
        tracing::info!(added, reference = ref_message_uuid, "loaded older messages");
        if added > 0 {
            self.persist().await?;
        }
        Ok(added)
    }

    /// Sends `text`, then inserts the server's message (replying to the
    /// pending reply target, which is cleared).
    pub async fn add_message(&mut self, text: &str) -> StoreResult<Message> {
        let record = logged("send message", self.api.send_message(text).await)?;

        let mut message = record.into_sent_message(now_millis());
        if message.author_uuid.is_empty() {
            message.author_uuid = self.me.clone();
        }
        message.reply_to_message_uuid = self
            .state
            .take_replying_to()
            .or(message.reply_to_message_uuid);

        tracing::info!(uuid = %message.uuid, reply_to = ?message.reply_to_message_uuid, "sent message");
        self.state.insert_message(message.clone());
        self.persist().await?;
        Ok(message)
    }

    /// Reacts to a message as the local participant. Reacting twice with the
    /// same emoji does nothing.
    pub async fn add_reaction_to_message(
        &mut self,
        message_uuid: &str,
        emoji: &str,
    ) -> StoreResult<ReactionOutcome> {
        let ReactionOutcome::Added(reaction) =
            self.state.add_reaction(message_uuid, emoji, &self.me)?
        else {
            tracing::debug!(message_uuid, emoji, "already reacted");
            return Ok(ReactionOutcome::AlreadyReacted);
        };

        if let Err(err) = logged("add reaction", self.api.add_reaction(message_uuid, emoji).await) {
            self.state.remove_reaction(message_uuid, &reaction.uuid);
            return Err(err);
        }

        self.persist().await?;
        Ok(ReactionOutcome::Added(reaction))
    }

    /// Local-only edit.
    pub async fn edit_message(&mut self, message_uuid: &str, text: &str) -> StoreResult<()> {
        self.state.edit_message(message_uuid, text, now_millis())?;
        self.persist().await
    }

    /// Replaces the participant map with the server's list.
    pub async fn fetch_participants(&mut self) -> StoreResult<usize> {
        let records = logged("fetch participants", self.api.fetch_participants().await)?;
        self.state.replace_participants(into_participants(records));
        self.persist().await?;
        Ok(self.state.participants().len())
    }

    /// Merges the server's participant list into the existing map.
    pub async fn refresh_users(&mut self) -> StoreResult<usize> {
        let records = logged("refresh participants", self.api.fetch_participants().await)?;
        let participants = into_participants(records);
        let count = participants.len();
        self.state.merge_participants(participants);
        self.persist().await?;
        Ok(count)
    }

    /// Pulls messages and participants changed since the last sync.
    pub async fn sync_updates(&mut self) -> StoreResult<SyncReport> {
        let since = self.state.last_synced_at().unwrap_or(0);
        let started = now_millis();

        let (messages, participants) = tokio::try_join!(
            self.api.fetch_updated_messages(since),
            self.api.fetch_updated_participants(since),
        )
        .map_err(|err| {
            tracing::warn!(error = %err, since, "cannot fetch updates");
            err
        })?;

        let participants = into_participants(participants);
        let participants_updated = participants.len();
        let (messages_added, messages_updated) =
            self.state.upsert_messages(into_messages(messages));
        self.state.merge_participants(participants);
        self.state.set_last_synced_at(started);

        let report = SyncReport {
            messages_added,
            messages_updated,
            participants_updated,
        };
        tracing::info!(?report, since, "synced updates");
        self.persist().await?;
        Ok(report)
    }

    pub async fn session_info(&self) -> StoreResult<SessionInfo> {
        logged("fetch session info", self.api.fetch_session_info().await)
    }

    /// Drops all local state, including the persisted snapshot.
    pub async fn reset(&mut self) -> StoreResult<()> {
        self.state = ChatState::new();
        self.storage.remove_item(STORAGE_NAME).await?;
        Ok(())
    }

    async fn persist(&self) -> StoreResult<()> {
        let blob = serde_json::to_string(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            state: &self.state,
        })
        .map_err(crate::error::StorageError::from)?;

        self.storage
            .set_item(STORAGE_NAME, &blob)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "cannot persist chat snapshot");
                err.into()
            })
    }
}

fn logged<T>(action: &str, result: ApiResult<T>) -> StoreResult<T> {
    result.map_err(|err| {
        tracing::warn!(error = %err, "cannot {action}");
        err.into()
    })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::api::{MessageRecord, ParticipantRecord};
    use crate::error::{ApiError, StoreError};
    use crate::storage::MemoryStore;

    #[derive(Default)]
    struct FakeApi {
        all: Vec<serde_json::Value>,
        older: Vec<serde_json::Value>,
        updated: Vec<serde_json::Value>,
        participants: Mutex<Vec<serde_json::Value>>,
        reject_reactions: bool,
        offline: bool,
        sent: Mutex<Vec<String>>,
        reactions: Mutex<Vec<(String, String)>>,
        update_cursors: Mutex<Vec<i64>>,
    }

    impl FakeApi {
        fn reply<T: serde::de::DeserializeOwned>(&self, value: serde_json::Value) -> ApiResult<T> {
            if self.offline {
                return Err(unavailable());
            }
            Ok(serde_json::from_value(value).unwrap())
        }
    }

    fn unavailable() -> ApiError {
        ApiError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            url: "http://fake".into(),
        }
    }

    #[async_trait]
    impl ChatApi for FakeApi {
        async fn fetch_all_messages(&self) -> ApiResult<Vec<MessageRecord>> {
            self.reply(json!(self.all))
        }

        async fn fetch_latest_messages(&self) -> ApiResult<Vec<MessageRecord>> {
            let start = self.all.len().saturating_sub(1);
            self.reply(json!(self.all[start..]))
        }

        async fn fetch_older_messages(&self, _reference: &str) -> ApiResult<Vec<MessageRecord>> {
            self.reply(json!(self.older))
        }

        async fn fetch_updated_messages(&self, since: i64) -> ApiResult<Vec<MessageRecord>> {
            self.update_cursors.lock().unwrap().push(since);
            self.reply(json!(self.updated))
        }

        async fn send_message(&self, text: &str) -> ApiResult<MessageRecord> {
            self.sent.lock().unwrap().push(text.to_string());
            let n = self.sent.lock().unwrap().len();
            self.reply(json!({"id": format!("sent-{n}"), "text": text, "createdAt": 10_000 + n as i64}))
        }

        async fn add_reaction(&self, message_uuid: &str, reaction: &str) -> ApiResult<()> {
            if self.reject_reactions || self.offline {
                return Err(unavailable());
            }
            self.reactions
                .lock()
                .unwrap()
                .push((message_uuid.to_string(), reaction.to_string()));
            Ok(())
        }

        async fn fetch_participants(&self) -> ApiResult<Vec<ParticipantRecord>> {
            let participants = self.participants.lock().unwrap().clone();
            self.reply(json!(participants))
        }

        async fn fetch_updated_participants(&self, _since: i64) -> ApiResult<Vec<ParticipantRecord>> {
            self.reply(json!([{"uuid": "u9", "name": "Newcomer"}]))
        }

        async fn fetch_session_info(&self) -> ApiResult<SessionInfo> {
            self.reply(json!({"sessionUuid": "s-1", "apiVersion": "1.0"}))
        }
    }

    fn history() -> Vec<serde_json::Value> {
        vec![
            json!({"uuid": "b", "text": "second", "authorUuid": "u2", "sentAt": 2000}),
            json!({"uuid": "a", "text": "first", "authorUuid": "u1", "sentAt": 1000}),
            json!({"uuid": "c", "text": "third", "authorUuid": "u1", "sentAt": 3000}),
        ]
    }

    async fn open(api: FakeApi) -> ChatStore<FakeApi, Arc<MemoryStore>> {
        ChatStore::open(api, Arc::new(MemoryStore::new()), "you")
            .await
            .unwrap()
    }

    async fn loaded(api: FakeApi) -> ChatStore<FakeApi, Arc<MemoryStore>> {
        let mut store = open(FakeApi {
            all: history(),
            ..api
        })
        .await;
        store.load_messages().await.unwrap();
        store
    }

    fn ids<A: ChatApi, S: KeyValueStore>(store: &ChatStore<A, S>) -> Vec<&str> {
        store.messages().iter().map(|m| m.uuid.as_str()).collect()
    }

    #[tokio::test]
    async fn load_messages_sorts_ascending() {
        let store = loaded(FakeApi::default()).await;
        assert_eq!(ids(&store), ["a", "b", "c"]);
        assert!(store
            .messages()
            .iter()
            .all(|m| !m.uuid.is_empty() && m.sent_at > 0));
    }

    #[tokio::test]
    async fn load_latest_replaces_everything() {
        let mut store = loaded(FakeApi::default()).await;
        store.load_latest_messages().await.unwrap();
        assert_eq!(ids(&store), ["c"]);
    }

    #[tokio::test]
    async fn older_messages_are_deduplicated() {
        let mut store = loaded(FakeApi {
            older: vec![
                json!({"uuid": "a", "sentAt": 1000}),
                json!({"uuid": "z", "authorUuid": "u3", "sentAt": 500}),
            ],
            ..FakeApi::default()
        })
        .await;

        assert_eq!(store.load_older_messages("a").await.unwrap(), 1);
        assert_eq!(store.load_older_messages("z").await.unwrap(), 0);
        assert_eq!(ids(&store), ["z", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn send_carries_reply_target_and_clears_it() {
        let mut store = loaded(FakeApi::default()).await;
        store.set_replying_to(Some("a".into()));

        let sent = store.add_message("hi").await.unwrap();

        assert_eq!(sent.reply_to_message_uuid.as_deref(), Some("a"));
        assert_eq!(sent.author_uuid, "you");
        assert!(sent.updated_at.is_some());
        assert_eq!(store.replying_to(), None);
        assert_eq!(store.messages().last().unwrap().uuid, sent.uuid);
        assert_eq!(
            store.state().replied_message(&sent).map(|m| m.text.as_str()),
            Some("first")
        );
    }

    #[tokio::test]
    async fn sent_message_lands_at_its_timestamp() {
        let mut store = open(FakeApi {
            all: vec![
                json!({"uuid": "old", "sentAt": 5_000}),
                json!({"uuid": "new", "sentAt": 50_000}),
            ],
            ..FakeApi::default()
        })
        .await;
        store.load_messages().await.unwrap();

        store.add_message("between").await.unwrap();
        assert_eq!(ids(&store), ["old", "sent-1", "new"]);
    }

    #[tokio::test]
    async fn failed_send_keeps_reply_target() {
        let mut store = open(FakeApi {
            offline: true,
            ..FakeApi::default()
        })
        .await;
        store.set_replying_to(Some("a".into()));

        let err = store.add_message("hi").await.unwrap_err();
        assert!(matches!(err, StoreError::Api(_)));
        assert_eq!(store.replying_to(), Some("a"));
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn reaction_is_posted_once() {
        let mut store = loaded(FakeApi::default()).await;

        let first = store.add_reaction_to_message("b", "👍").await.unwrap();
        let second = store.add_reaction_to_message("b", "👍").await.unwrap();

        assert!(matches!(first, ReactionOutcome::Added(ref r) if r.participant_uuid == "you"));
        assert_eq!(second, ReactionOutcome::AlreadyReacted);
        assert_eq!(store.state().message("b").unwrap().reactions.len(), 1);
        assert_eq!(
            *store.api.reactions.lock().unwrap(),
            [("b".to_string(), "👍".to_string())]
        );
    }

    #[tokio::test]
    async fn rejected_reaction_is_rolled_back() {
        let mut store = loaded(FakeApi {
            reject_reactions: true,
            ..FakeApi::default()
        })
        .await;

        let err = store.add_reaction_to_message("b", "👍").await.unwrap_err();
        assert!(matches!(err, StoreError::Api(_)));
        assert!(store.state().message("b").unwrap().reactions.is_empty());
    }

    #[tokio::test]
    async fn reaction_on_missing_message() {
        let mut store = loaded(FakeApi::default()).await;
        let err = store.add_reaction_to_message("nope", "👍").await.unwrap_err();
        assert!(matches!(err, StoreError::MessageNotFound(_)));
    }

    #[tokio::test]
    async fn fetch_replaces_and_refresh_merges_participants() {
        let api = FakeApi::default();
        *api.participants.lock().unwrap() = vec![
            json!({"uuid": "u1", "name": "Ada"}),
            json!({"uuid": "u2", "name": "Bob"}),
        ];
        let mut store = open(api).await;
        assert_eq!(store.fetch_participants().await.unwrap(), 2);

        *store.api.participants.lock().unwrap() = vec![json!({"uuid": "u2", "name": "Bobby"})];
        store.refresh_users().await.unwrap();
        assert_eq!(store.participants().len(), 2);
        assert_eq!(store.participants()["u2"].name, "Bobby");

        store.fetch_participants().await.unwrap();
        assert_eq!(store.participants().len(), 1);
        assert!(!store.participants().contains_key("u1"));
    }

    #[tokio::test]
    async fn malformed_nested_records_keep_the_rest_of_the_batch() {
        let api = FakeApi {
            all: vec![
                json!({"uuid": "a", "sentAt": 1000,
                       "reactions": [{"uuid": "r", "value": "x"}],
                       "attachments": [{"url": "http://x/y.png"}]}),
                json!({"uuid": "b", "sentAt": 2000}),
            ],
            ..FakeApi::default()
        };
        *api.participants.lock().unwrap() = vec![
            json!({"name": "nobody"}),
            json!({"uuid": "u2", "name": "Bob"}),
        ];
        let mut store = open(api).await;

        store.load_messages().await.unwrap();
        assert_eq!(ids(&store), ["a", "b"]);
        assert!(store.messages()[0].reactions.is_empty());
        assert!(store.messages()[0].attachments.is_empty());

        assert_eq!(store.fetch_participants().await.unwrap(), 1);
        assert_eq!(store.participants()["u2"].name, "Bob");
    }

    #[tokio::test]
    async fn failures_leave_state_untouched() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = ChatStore::open(
            FakeApi {
                all: history(),
                ..FakeApi::default()
            },
            Arc::clone(&storage),
            "you",
        )
        .await
        .unwrap();
        store.load_messages().await.unwrap();

        let mut offline = ChatStore::open(
            FakeApi {
                offline: true,
                ..FakeApi::default()
            },
            storage,
            "you",
        )
        .await
        .unwrap();

        assert!(offline.load_messages().await.is_err());
        assert!(offline.refresh_users().await.is_err());
        assert!(offline.sync_updates().await.is_err());
        assert_eq!(ids(&offline), ["a", "b", "c"]);
        assert_eq!(offline.state().last_synced_at(), None);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = ChatStore::open(
            FakeApi {
                all: history(),
                ..FakeApi::default()
            },
            Arc::clone(&storage),
            "you",
        )
        .await
        .unwrap();
        store.load_messages().await.unwrap();
        store.edit_message("a", "changed").await.unwrap();
        store.set_replying_to(Some("c".into()));

        let reopened = ChatStore::open(FakeApi::default(), Arc::clone(&storage), "you")
            .await
            .unwrap();
        assert_eq!(reopened.messages(), store.messages());
        assert!(reopened.state().message("a").unwrap().edited);
        assert_eq!(reopened.replying_to(), None);
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_empty() {
        let storage = Arc::new(MemoryStore::new());
        storage.set_item(STORAGE_NAME, "{not json").await.unwrap();

        let store = ChatStore::open(FakeApi::default(), storage, "you")
            .await
            .unwrap();
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn sync_upserts_and_advances_cursor() {
        let mut store = loaded(FakeApi {
            updated: vec![
                json!({"uuid": "b", "text": "second (edited)", "authorUuid": "u2", "sentAt": 2000}),
                json!({"uuid": "d", "text": "fourth", "authorUuid": "u2", "sentAt": 4000}),
            ],
            ..FakeApi::default()
        })
        .await;

        let report = store.sync_updates().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                messages_added: 1,
                messages_updated: 1,
                participants_updated: 1,
            }
        );
        assert_eq!(ids(&store), ["a", "b", "c", "d"]);
        assert_eq!(store.state().message("b").unwrap().text, "second (edited)");
        assert_eq!(store.participants()["u9"].name, "Newcomer");

        store.sync_updates().await.unwrap();
        let cursors = store.api.update_cursors.lock().unwrap().clone();
        assert_eq!(cursors[0], 0);
        assert!(cursors[1] > 0);
    }

    #[tokio::test]
    async fn reset_clears_snapshot() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = ChatStore::open(
            FakeApi {
                all: history(),
                ..FakeApi::default()
            },
            Arc::clone(&storage),
            "you",
        )
        .await
        .unwrap();
        store.load_messages().await.unwrap();
        assert!(storage.get_item(STORAGE_NAME).await.unwrap().is_some());

        store.reset().await.unwrap();
        assert!(store.messages().is_empty());
        assert!(storage.get_item(STORAGE_NAME).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_info_passes_through() {
        let store = open(FakeApi::default()).await;
        assert_eq!(store.session_info().await.unwrap().session_uuid, "s-1");
    }
}

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use super::{ApiResult, ChatApi, MessageRecord, ParticipantRecord, SessionInfo};
use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    pub const DEFAULT_BASE_URL: &'static str = "http://dummy-chat-server.tribechat.pro/api";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
    const USER_AGENT: &'static str = concat!("tribechat/", env!("CARGO_PKG_VERSION"));

    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(Self::USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = self.client.get(&url).send().await;
        Self::read_json(url, response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let response = self.client.post(&url).json(body).send().await;
        Self::read_json(url, response).await
    }

    fn check(
        url: &str,
        response: reqwest::Result<reqwest::Response>,
    ) -> ApiResult<reqwest::Response> {
        let response = response.map_err(|err| {
            tracing::warn!(%url, error = %err, "request failed");
            ApiError::Transport(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%url, %status, "request rejected");
            return Err(ApiError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(
        url: String,
        response: reqwest::Result<reqwest::Response>,
    ) -> ApiResult<T> {
        let response = Self::check(&url, response)?;
        response.json().await.map_err(|err| {
            tracing::warn!(%url, error = %err, "cannot decode response body");
            ApiError::Transport(err)
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_all_messages(&self) -> ApiResult<Vec<MessageRecord>> {
        self.get_json("messages/all").await
    }

    async fn fetch_latest_messages(&self) -> ApiResult<Vec<MessageRecord>> {
        self.get_json("messages/latest").await
    }

    async fn fetch_older_messages(&self, ref_message_uuid: &str) -> ApiResult<Vec<MessageRecord>> {
        self.get_json(&format!("messages/older/{ref_message_uuid}"))
            .await
    }

    async fn fetch_updated_messages(&self, since: i64) -> ApiResult<Vec<MessageRecord>> {
        self.get_json(&format!("messages/updates/{since}")).await
    }

    async fn send_message(&self, text: &str) -> ApiResult<MessageRecord> {
        #[derive(Serialize)]
        struct Body<'a> {
            text: &'a str,
        }
        self.post_json("messages/new", &Body { text }).await
    }

    async fn add_reaction(&self, message_uuid: &str, reaction: &str) -> ApiResult<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            reaction: &'a str,
        }

        let url = self.url(&format!("messages/{message_uuid}/reactions"));
        tracing::debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .json(&Body { reaction })
            .send()
            .await;
        Self::check(&url, response).map(drop)
    }

    async fn fetch_participants(&self) -> ApiResult<Vec<ParticipantRecord>> {
        self.get_json("participants/all").await
    }

    async fn fetch_updated_participants(&self, since: i64) -> ApiResult<Vec<ParticipantRecord>> {
        self.get_json(&format!("participants/updates/{since}"))
            .await
    }

    async fn fetch_session_info(&self) -> ApiResult<SessionInfo> {
        self.get_json("info").await
    }
}

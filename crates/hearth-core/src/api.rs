//! REST surface of the backend, behind an injectable trait.
//!
//! The backend itself is an external collaborator; only the shapes the sync
//! core consumes are modeled here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::models::{RemoteMessage, Thread};

/// Payload of `GET /threads`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadListPayload {
    pub threads: Vec<Thread>,
    pub household_id: String,
    pub user_id: String,
}

/// Payload of `GET /messages?thread_id=…`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesPayload {
    pub messages: Vec<RemoteMessage>,
    pub thread_id: String,
    pub household_id: String,
    pub user_id: String,
    /// Id of the oldest message the user has not read, when the server knows.
    #[serde(default)]
    pub first_unread_id: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
}

impl MessagesPayload {
    /// The well-formed empty result served when no thread is selected.
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            thread_id: String::new(),
            household_id: String::new(),
            user_id: String::new(),
            first_unread_id: None,
            unread_count: 0,
        }
    }
}

/// REST reads and writes the sync core performs.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_threads(&self) -> Result<ThreadListPayload, SyncError>;
    async fn fetch_messages(&self, thread_id: &str) -> Result<MessagesPayload, SyncError>;
    async fn send_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<RemoteMessage, SyncError>;
    async fn mark_read(&self, message_id: &str) -> Result<(), SyncError>;
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    content: &'a str,
    thread_id: &'a str,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    message: RemoteMessage,
}

#[derive(Serialize)]
struct MarkReadBody<'a> {
    message_id: &'a str,
}

/// `ChatApi` over plain HTTP.
pub struct HttpChatApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(SyncError::Api {
            status: Some(status),
            message,
        })
    }
}

fn http_error(err: reqwest::Error) -> SyncError {
    SyncError::Api {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_threads(&self) -> Result<ThreadListPayload, SyncError> {
        let url = format!("{}/threads", self.base_url);
        let response = self.client.get(&url).send().await.map_err(http_error)?;
        Self::check(response).await?.json().await.map_err(http_error)
    }

    async fn fetch_messages(&self, thread_id: &str) -> Result<MessagesPayload, SyncError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("thread_id", thread_id)])
            .send()
            .await
            .map_err(http_error)?;
        Self::check(response).await?.json().await.map_err(http_error)
    }

    async fn send_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<RemoteMessage, SyncError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SendMessageBody { content, thread_id })
            .send()
            .await
            .map_err(http_error)?;
        let body: SendMessageResponse =
            Self::check(response).await?.json().await.map_err(http_error)?;
        Ok(body.message)
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), SyncError> {
        let url = format!("{}/mark-read", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&MarkReadBody { message_id })
            .send()
            .await
            .map_err(http_error)?;
        Self::check(response).await?;
        Ok(())
    }
}

//! Slack Web API client.
//!
//! Wraps the endpoints the publish stages need with bot token auth:
//! `auth.test`, paginated `users.list`, `usergroups.list`, the external
//! upload flow (`files.getUploadURLExternal` + `files.completeUploadExternal`)
//! and `chat.postMessage`. HTTP 429 responses surface as
//! [`NotifyError::RateLimited`] carrying the `Retry-After` advisory.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::NotifyError;
use crate::mentions::{DirectoryGroup, DirectoryUser};
use crate::traits::ChatService;
use crate::types::DeliveryReceipt;

const API_BASE: &str = "https://slack.com/api";
const USERS_PAGE_LIMIT: u32 = 200;

/// Slack Web API client with bot token auth.
#[derive(Clone)]
pub struct SlackApiClient {
    client: reqwest::Client,
    token: String,
}

/// Response from `auth.test`.
#[derive(Debug, Deserialize)]
pub struct AuthTestResponse {
    pub ok: bool,
    pub team: Option<String>,
    pub user: Option<String>,
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersListResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    members: Vec<SlackUser>,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    name: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    profile: SlackUserProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackUserProfile {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    real_name: String,
}

#[derive(Debug, Deserialize)]
struct UserGroupsResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    usergroups: Vec<SlackUserGroup>,
}

#[derive(Debug, Deserialize)]
struct SlackUserGroup {
    id: String,
    name: String,
    handle: String,
    /// Non-zero when the group was deactivated.
    #[serde(default)]
    date_delete: u64,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    ok: bool,
    error: Option<String>,
    upload_url: Option<String>,
    file_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompleteUploadResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    files: Vec<CompletedFile>,
}

#[derive(Debug, Deserialize)]
struct CompletedFile {
    #[allow(dead_code)]
    id: String,
    permalink: Option<String>,
}

impl From<SlackUser> for DirectoryUser {
    fn from(user: SlackUser) -> Self {
        Self {
            id: user.id,
            handle: user.name,
            display_name: user.profile.display_name,
            real_name: user.profile.real_name,
            deleted: user.deleted,
        }
    }
}

impl From<SlackUserGroup> for DirectoryGroup {
    fn from(group: SlackUserGroup) -> Self {
        Self {
            id: group.id,
            name: group.name,
            handle: group.handle,
            deleted: group.date_delete != 0,
        }
    }
}

impl SlackApiClient {
    pub fn new(token: &str) -> Result<Self, NotifyError> {
        if token.is_empty() {
            return Err(NotifyError::Config("auth token cannot be empty".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
        })
    }

    /// Verify the token and report workspace/bot identity.
    pub async fn auth_test(&self) -> Result<AuthTestResponse, NotifyError> {
        let resp = self
            .client
            .post(format!("{}/auth.test", API_BASE))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| NotifyError::Connection(format!("auth.test failed: {}", e)))?;
        let resp = Self::check_rate_limit(resp)?;

        let auth: AuthTestResponse = resp
            .json()
            .await
            .map_err(|e| NotifyError::ParseError(format!("auth.test parse: {}", e)))?;

        if !auth.ok {
            return Err(NotifyError::Auth(format!(
                "auth.test rejected: {}",
                auth.error.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(auth)
    }

    /// Full user listing, following `next_cursor` pagination.
    pub async fn users_list(&self) -> Result<Vec<DirectoryUser>, NotifyError> {
        let mut users = Vec::new();
        let mut cursor = String::new();
        loop {
            let limit = USERS_PAGE_LIMIT.to_string();
            let mut query = vec![("limit", limit.as_str())];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let resp = self
                .client
                .get(format!("{}/users.list", API_BASE))
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await
                .map_err(|e| NotifyError::Connection(format!("users.list failed: {}", e)))?;
            let resp = Self::check_rate_limit(resp)?;

            let page: UsersListResponse = resp
                .json()
                .await
                .map_err(|e| NotifyError::ParseError(format!("users.list parse: {}", e)))?;
            if !page.ok {
                return Err(NotifyError::Api(format!(
                    "users.list rejected: {}",
                    page.error.as_deref().unwrap_or("unknown")
                )));
            }

            users.extend(page.members.into_iter().map(DirectoryUser::from));
            cursor = page
                .response_metadata
                .map(|meta| meta.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                break;
            }
        }
        Ok(users)
    }

    /// User-group listing; a single page on this endpoint.
    pub async fn usergroups_list(&self) -> Result<Vec<DirectoryGroup>, NotifyError> {
        let resp = self
            .client
            .get(format!("{}/usergroups.list", API_BASE))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| NotifyError::Connection(format!("usergroups.list failed: {}", e)))?;
        let resp = Self::check_rate_limit(resp)?;

        let page: UserGroupsResponse = resp
            .json()
            .await
            .map_err(|e| NotifyError::ParseError(format!("usergroups.list parse: {}", e)))?;
        if !page.ok {
            return Err(NotifyError::Api(format!(
                "usergroups.list rejected: {}",
                page.error.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(page.usergroups.into_iter().map(DirectoryGroup::from).collect())
    }

    /// Upload a file via the external upload flow and return its permalink.
    pub async fn upload_file(&self, path: &Path) -> Result<String, NotifyError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| NotifyError::Upload(format!("read {}: {}", path.display(), e)))?;

        let length = bytes.len().to_string();
        let resp = self
            .client
            .get(format!("{}/files.getUploadURLExternal", API_BASE))
            .bearer_auth(&self.token)
            .query(&[("filename", filename.as_str()), ("length", length.as_str())])
            .send()
            .await
            .map_err(|e| NotifyError::Connection(format!("upload ticket failed: {}", e)))?;
        let resp = Self::check_rate_limit(resp)?;

        let ticket: UploadUrlResponse = resp
            .json()
            .await
            .map_err(|e| NotifyError::ParseError(format!("upload ticket parse: {}", e)))?;
        if !ticket.ok {
            return Err(NotifyError::Upload(format!(
                "files.getUploadURLExternal rejected: {}",
                ticket.error.as_deref().unwrap_or("unknown")
            )));
        }
        let (upload_url, file_id) = ticket
            .upload_url
            .zip(ticket.file_id)
            .ok_or_else(|| NotifyError::ParseError("upload ticket missing url or id".to_string()))?;

        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(bytes).file_name(filename.clone()),
        );
        let resp = self
            .client
            .post(&upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| NotifyError::Upload(format!("file body upload failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(NotifyError::Upload(format!(
                "file body upload failed: {}",
                resp.status()
            )));
        }

        let payload = serde_json::json!({
            "files": [{"id": file_id, "title": filename}]
        });
        let resp = self
            .client
            .post(format!("{}/files.completeUploadExternal", API_BASE))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Connection(format!("upload completion failed: {}", e)))?;
        let resp = Self::check_rate_limit(resp)?;

        let done: CompleteUploadResponse = resp
            .json()
            .await
            .map_err(|e| NotifyError::ParseError(format!("upload completion parse: {}", e)))?;
        if !done.ok {
            return Err(NotifyError::Upload(format!(
                "files.completeUploadExternal rejected: {}",
                done.error.as_deref().unwrap_or("unknown")
            )));
        }

        done.files
            .into_iter()
            .next()
            .and_then(|file| file.permalink)
            .ok_or_else(|| NotifyError::ParseError("completed upload missing permalink".to_string()))
    }

    /// Send a message via `chat.postMessage`.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let payload = serde_json::json!({
            "channel": channel,
            "text": text,
        });
        let resp = self
            .client
            .post(format!("{}/chat.postMessage", API_BASE))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::SendFailed(format!("chat.postMessage failed: {}", e)))?;
        let resp = Self::check_rate_limit(resp)?;

        let post: PostMessageResponse = resp
            .json()
            .await
            .map_err(|e| NotifyError::ParseError(format!("chat.postMessage parse: {}", e)))?;
        if !post.ok {
            return Err(NotifyError::SendFailed(
                post.error.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        Ok(DeliveryReceipt {
            channel: post.channel.unwrap_or_else(|| channel.to_string()),
            message_ts: post.ts,
            delivered_at: chrono::Utc::now(),
            success: true,
            error: None,
        })
    }

    fn check_rate_limit(resp: reqwest::Response) -> Result<reqwest::Response, NotifyError> {
        if resp.status().as_u16() == 429 {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(NotifyError::RateLimited { retry_after_secs });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatService for SlackApiClient {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, NotifyError> {
        SlackApiClient::users_list(self).await
    }

    async fn list_groups(&self) -> Result<Vec<DirectoryGroup>, NotifyError> {
        SlackApiClient::usergroups_list(self).await
    }

    async fn upload_file(&self, path: &Path) -> Result<String, NotifyError> {
        SlackApiClient::upload_file(self, path).await
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        SlackApiClient::post_message(self, channel, text).await
    }
}

//! `@mention` resolution against the workspace directory.
//!
//! Scans a message for `@name` tokens not already in native mention syntax
//! (quoted forms included), looks each up as an active user first and an
//! active group second, and rewrites hits to `<@ID>` / `<!subteam^ID>`.
//! Unmatched tokens stay untouched. The directory is fetched in full before
//! matching; rate limits back off for the advised duration under a bounded
//! retry policy, and any other failure degrades to an empty directory.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::traits::ChatService;

/// A workspace member as the directory reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub deleted: bool,
}

/// A user group as the directory reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryGroup {
    pub id: String,
    pub name: String,
    pub handle: String,
    #[serde(default)]
    pub deleted: bool,
}

/// Users and groups pulled once per publish run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentionDirectory {
    pub users: Vec<DirectoryUser>,
    pub groups: Vec<DirectoryGroup>,
}

/// Bounds for the directory-fetch backoff loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_delay_secs: 60,
        }
    }
}

impl MentionDirectory {
    /// Case-insensitive user lookup by handle, display name or real name.
    pub fn user_id(&self, name: &str) -> Option<&str> {
        let needle = name.to_lowercase();
        self.users
            .iter()
            .filter(|user| !user.deleted)
            .find(|user| {
                user.handle.to_lowercase() == needle
                    || user.display_name.to_lowercase() == needle
                    || user.real_name.to_lowercase() == needle
            })
            .map(|user| user.id.as_str())
    }

    /// Case-insensitive group lookup by name or handle.
    pub fn group_id(&self, name: &str) -> Option<&str> {
        let needle = name.to_lowercase();
        self.groups
            .iter()
            .filter(|group| !group.deleted)
            .find(|group| {
                group.name.to_lowercase() == needle || group.handle.to_lowercase() == needle
            })
            .map(|group| group.id.as_str())
    }

    /// Pull the full directory, backing off on rate limits.
    ///
    /// Exhausted attempts or any non-rate-limit failure return an empty
    /// directory so the publish run keeps going without mentions.
    pub async fn fetch(service: &dyn ChatService, policy: &RetryPolicy) -> Self {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::fetch_once(service).await {
                Ok(directory) => {
                    tracing::debug!(
                        users = directory.users.len(),
                        groups = directory.groups.len(),
                        "directory fetched"
                    );
                    return directory;
                }
                Err(NotifyError::RateLimited { retry_after_secs })
                    if attempt < policy.max_attempts =>
                {
                    let wait = retry_after_secs.min(policy.max_delay_secs);
                    tracing::info!(wait_secs = wait, attempt, "rate limit hit, sleeping");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot pull user info, mentions won't work");
                    return Self::default();
                }
            }
        }
    }

    async fn fetch_once(service: &dyn ChatService) -> Result<Self, NotifyError> {
        let users = service.list_users().await?;
        let groups = service.list_groups().await?;
        Ok(Self { users, groups })
    }
}

fn bare_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@\S+").unwrap())
}

fn quoted_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"['"](@[^'"]+)"#).unwrap())
}

/// Rewrite all resolvable `@name` tokens to native mention syntax.
pub fn resolve_mentions(message: &str, directory: &MentionDirectory) -> String {
    let tokens = mention_tokens(message);
    if tokens.is_empty() {
        return message.to_string();
    }

    let mut out = message.to_string();
    for token in tokens {
        let name = token.trim_start_matches('@');
        let mention = directory
            .user_id(name)
            .map(|id| format!("<@{}>", id))
            .or_else(|| directory.group_id(name).map(|id| format!("<!subteam^{}>", id)));
        if let Some(mention) = mention {
            out = out.replace(&token, &mention);
        }
    }
    out
}

/// Collect `@name` tokens, skipping ones already in native `<...>` syntax.
fn mention_tokens(message: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for m in bare_mention_re().find_iter(message) {
        if not_preceded_by_lt(message, m.start()) {
            tokens.push(m.as_str().to_string());
        }
    }
    for caps in quoted_mention_re().captures_iter(message) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        if not_preceded_by_lt(message, start) {
            tokens.push(caps[1].to_string());
        }
    }
    tokens
}

fn not_preceded_by_lt(message: &str, idx: usize) -> bool {
    idx == 0 || message.as_bytes()[idx - 1] != b'<'
}

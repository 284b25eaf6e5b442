//! Notification settings as exported from the project settings store.
//!
//! Older exports used `families`/`tasks`/`subsets` filter keys; those are
//! accepted as aliases and resolved to the current names while loading, so
//! the rest of the crate only ever sees the canonical fields.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Top-level Slack notification settings for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackSettings {
    /// Master switch; disabled settings turn the collector into a no-op.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Bot token (xoxb-...) used for every outbound call.
    #[serde(default)]
    pub token: String,
    /// Ordered profiles; the first full match wins.
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// One routing profile: filter criteria plus the messages to send.
///
/// Empty filter lists match anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, alias = "families")]
    pub product_types: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub task_types: Vec<String>,
    #[serde(default, alias = "tasks")]
    pub task_names: Vec<String>,
    #[serde(default, alias = "subsets", alias = "subset_names")]
    pub product_names: Vec<String>,
    /// Maximum review file size to upload, in megabytes.
    #[serde(default = "default_review_upload_limit")]
    pub review_upload_limit: f64,
    #[serde(default)]
    pub channel_messages: Vec<ChannelMessage>,
}

/// Target channels and the message template sent to each of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_true")]
    pub upload_thumbnail: bool,
    #[serde(default = "default_true")]
    pub upload_review: bool,
    /// Template with `{placeholder}` tokens filled from instance metadata.
    #[serde(default)]
    pub message: String,
}

fn default_enabled() -> bool {
    true
}

fn default_review_upload_limit() -> f64 {
    50.0
}

fn default_true() -> bool {
    true
}

impl SlackSettings {
    /// Parse settings from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, NotifyError> {
        serde_json::from_str(raw).map_err(|e| NotifyError::Config(format!("settings parse: {}", e)))
    }

    /// Read and parse settings from a file.
    pub fn from_path(path: &Path) -> Result<Self, NotifyError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| NotifyError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            token: String::new(),
            profiles: Vec::new(),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            product_types: Vec::new(),
            hosts: Vec::new(),
            task_types: Vec::new(),
            task_names: Vec::new(),
            product_names: Vec::new(),
            review_upload_limit: default_review_upload_limit(),
            channel_messages: Vec::new(),
        }
    }
}

impl Default for ChannelMessage {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            upload_thumbnail: true,
            upload_review: true,
            message: String::new(),
        }
    }
}

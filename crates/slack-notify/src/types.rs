use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::mentions::MentionDirectory;

/// One unit of pipeline output passing through the publish run.
///
/// Carries the metadata the matcher routes on and the anatomy payload the
/// templating step fills placeholders from. The collector attaches a
/// [`NotificationPlan`]; the dispatcher records [`DeliveryReceipt`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishInstance {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub product_type: String,
    pub product_name: String,
    /// Structured project/task/product naming context, as nested JSON.
    #[serde(default)]
    pub anatomy_data: Value,
    #[serde(default)]
    pub representations: Vec<Representation>,
    /// Instance is handed off to remote/farm processing; dispatch must no-op.
    #[serde(default)]
    pub farm: bool,
    #[serde(default)]
    pub families: Vec<String>,
    /// Operator-supplied text prepended to every rendered message.
    #[serde(default)]
    pub additional_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deliveries: Vec<DeliveryReceipt>,
}

impl PublishInstance {
    pub fn task_name(&self) -> Option<&str> {
        self.anatomy_data.get("task")?.get("name")?.as_str()
    }

    pub fn task_type(&self) -> Option<&str> {
        self.anatomy_data.get("task")?.get("type")?.as_str()
    }
}

/// A published file of an instance, with routing tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Representation {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thumbnail: bool,
    #[serde(default)]
    pub review: bool,
    #[serde(default)]
    pub published_path: Option<PathBuf>,
}

/// Shared state for one publish run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishContext {
    #[serde(default)]
    pub host_name: String,
    /// Root path mapping exposed to templates under the `root` key.
    #[serde(default)]
    pub anatomy_roots: Value,
    /// Directory cache; populated at most once per run, on first `@` token.
    #[serde(skip)]
    pub mention_cache: Option<MentionDirectory>,
}

/// What the collector decided to send, consumed by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPlan {
    pub token: String,
    pub messages: Vec<PlanMessage>,
    pub additional_message: Option<String>,
}

/// One channel message with its profile-level upload limit resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMessage {
    pub channels: Vec<String>,
    pub message: String,
    pub upload_thumbnail: bool,
    pub upload_review: bool,
    pub review_upload_limit: f64,
}

/// Outcome of one channel send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub channel: String,
    pub message_ts: Option<String>,
    pub delivered_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

/// Serialized form of a publish run handed to the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishManifest {
    #[serde(default)]
    pub context: PublishContext,
    pub instances: Vec<PublishInstance>,
}

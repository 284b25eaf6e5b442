//! Integrator stage: render, attach and send the planned messages.
//!
//! Consumes the plan the collector attached. Each channel message renders
//! its template, gathers thumbnail/review attachments (review size-checked
//! against the profile limit), resolves `@mentions` through the per-run
//! directory cache, uploads attachments for shareable permalinks and posts
//! one message per channel. A failed channel never blocks the others.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::error::NotifyError;
use crate::mentions::{self, MentionDirectory, RetryPolicy};
use crate::slack::api::SlackApiClient;
use crate::template;
use crate::traits::{ChatService, PublishStage, StageOrder};
use crate::types::{DeliveryReceipt, PublishContext, PublishInstance};

const SIZE_OMIT_NOTE: &str = "\nReview upload omitted because of file size.";

pub struct IntegrateSlackMessages {
    service_override: Option<Arc<dyn ChatService>>,
    retry: RetryPolicy,
}

impl IntegrateSlackMessages {
    pub fn new() -> Self {
        Self {
            service_override: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Use the given transport instead of building a client from the plan
    /// token. Tests inject recording services through this.
    pub fn with_service(service: Arc<dyn ChatService>) -> Self {
        Self {
            service_override: Some(service),
            retry: RetryPolicy::default(),
        }
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn service_for(&self, token: &str) -> Result<Arc<dyn ChatService>, NotifyError> {
        match &self.service_override {
            Some(service) => Ok(service.clone()),
            None => Ok(Arc::new(SlackApiClient::new(token)?)),
        }
    }
}

impl Default for IntegrateSlackMessages {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublishStage for IntegrateSlackMessages {
    fn label(&self) -> &'static str {
        "Integrate Slack messages"
    }

    fn order(&self) -> StageOrder {
        StageOrder::Integrate
    }

    async fn process(
        &self,
        ctx: &mut PublishContext,
        instance: &mut PublishInstance,
    ) -> Result<(), NotifyError> {
        let Some(plan) = instance.notification.clone() else {
            tracing::debug!(product = %instance.product_name, "no notification plan, skipping");
            return Ok(());
        };
        if instance.farm {
            tracing::debug!(
                product = %instance.product_name,
                "instance is marked to be processed on farm, skipping"
            );
            return Ok(());
        }

        let service = self.service_for(&plan.token)?;
        let thumbnail_path = thumbnail_path(instance);
        let review_path = review_path(instance);

        let mut receipts = Vec::new();
        for plan_message in &plan.messages {
            let fill = fill_data(instance, ctx, review_path.as_deref());

            let mut message = plan_message.message.clone();
            if let Some(extra) = &plan.additional_message {
                message = format!("{} \n {}", extra, message);
            }
            let mut message = template::render(&message, &fill);
            if message.trim().is_empty() {
                tracing::debug!("rendered message is empty, skipping channel message");
                continue;
            }

            let mut publish_files: Vec<PathBuf> = Vec::new();
            if plan_message.upload_thumbnail {
                if let Some(path) = &thumbnail_path {
                    publish_files.push(path.clone());
                }
            }
            if plan_message.upload_review {
                if let Some(path) = &review_path {
                    message = handle_review_upload(
                        message,
                        path,
                        plan_message.review_upload_limit,
                        &mut publish_files,
                    )
                    .await;
                }
            }

            for channel_template in &plan_message.channels {
                let channel = template::render(channel_template, &fill);

                let mut channel_text = message.clone();
                if channel_text.contains('@') {
                    if ctx.mention_cache.is_none() {
                        ctx.mention_cache =
                            Some(MentionDirectory::fetch(service.as_ref(), &self.retry).await);
                    }
                    if let Some(directory) = &ctx.mention_cache {
                        channel_text = mentions::resolve_mentions(&channel_text, directory);
                    }
                }

                match send_to_channel(service.as_ref(), &channel, channel_text, &publish_files)
                    .await
                {
                    Ok(receipt) => {
                        tracing::info!(
                            channel = %channel,
                            ts = receipt.message_ts.as_deref().unwrap_or(""),
                            "message delivered"
                        );
                        receipts.push(receipt);
                    }
                    Err(e) => {
                        let enriched = enrich_send_error(&e.to_string(), &channel);
                        tracing::warn!(channel = %channel, error = %enriched, "message delivery failed");
                        receipts.push(DeliveryReceipt {
                            channel: channel.clone(),
                            message_ts: None,
                            delivered_at: Utc::now(),
                            success: false,
                            error: Some(enriched),
                        });
                    }
                }
            }
        }

        instance.deliveries = receipts;
        Ok(())
    }
}

/// Upload attachments, append their invisible-link tokens, then post.
async fn send_to_channel(
    service: &dyn ChatService,
    channel: &str,
    mut message: String,
    publish_files: &[PathBuf],
) -> Result<DeliveryReceipt, NotifyError> {
    for path in publish_files {
        let permalink = service.upload_file(path).await?;
        // format matters: "<url| >" renders the preview with no visible link text
        message.push_str(&format!("<{}| >", permalink));
    }
    service.post_message(channel, &message).await
}

/// Attach the review only when it fits the profile limit; otherwise append
/// the omission note (and the location, unless the path is already in the
/// message via `{review_filepath}`).
async fn handle_review_upload(
    mut message: String,
    review_path: &Path,
    limit_mb: f64,
    publish_files: &mut Vec<PathBuf>,
) -> String {
    let size_mb = match tokio::fs::metadata(review_path).await {
        Ok(meta) => meta.len() as f64 / 1024.0 / 1024.0,
        Err(e) => {
            tracing::warn!(path = %review_path.display(), error = %e, "cannot stat review file");
            return message;
        }
    };

    if size_mb > limit_mb {
        message.push_str(SIZE_OMIT_NOTE);
        let located = review_path.display().to_string();
        if !message.contains(&located) {
            message.push_str(&format!("\nFile located at: {}", located));
        }
    } else if !publish_files.contains(&review_path.to_path_buf()) {
        publish_files.push(review_path.to_path_buf());
    }
    message
}

fn fill_data(instance: &PublishInstance, ctx: &PublishContext, review_path: Option<&Path>) -> Value {
    let mut fill = instance
        .anatomy_data
        .as_object()
        .cloned()
        .unwrap_or_default();
    if !ctx.anatomy_roots.is_null() {
        fill.insert("root".to_string(), ctx.anatomy_roots.clone());
    }
    if let Some(path) = review_path {
        fill.insert(
            "review_filepath".to_string(),
            Value::String(path.display().to_string()),
        );
    }
    Value::Object(fill)
}

/// First representation flagged or tagged as thumbnail, if its file exists.
fn thumbnail_path(instance: &PublishInstance) -> Option<PathBuf> {
    for repre in &instance.representations {
        if repre.thumbnail || repre.tags.iter().any(|tag| tag == "thumbnail") {
            return repre.published_path.clone().filter(|path| path.exists());
        }
    }
    None
}

/// Review representation path; a `burnin` tag wins over plain `review`.
fn review_path(instance: &PublishInstance) -> Option<PathBuf> {
    let mut review = None;
    for repre in &instance.representations {
        let burnin = repre.tags.iter().any(|tag| tag == "burnin");
        if repre.review || burnin || repre.tags.iter().any(|tag| tag == "review") {
            if let Some(path) = repre.published_path.clone().filter(|path| path.exists()) {
                review = Some(path);
            }
            if burnin {
                break;
            }
        }
    }
    review
}

fn enrich_send_error(error: &str, channel: &str) -> String {
    if error.contains("not_in_channel") {
        // no public-write scope, the app must be invited into the channel
        format!(
            "{} - app must be added to channel '{}'. Ask a Slack admin.",
            error, channel
        )
    } else {
        error.to_string()
    }
}

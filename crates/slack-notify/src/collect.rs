//! Collector stage: decide which instances notify which channels.
//!
//! Runs early in the publish run. Matches instance facts against the
//! configured profiles and, on a hit, attaches the notification plan the
//! dispatcher consumes later. A miss is informational, never an error.

use async_trait::async_trait;

use crate::config::SlackSettings;
use crate::error::NotifyError;
use crate::profiles::{filter_profiles, InstanceFacts};
use crate::traits::{PublishStage, StageOrder};
use crate::types::{NotificationPlan, PlanMessage, PublishContext, PublishInstance};

/// Family marker appended to instances selected for notification.
pub const SLACK_FAMILY: &str = "slack";

pub struct CollectNotifyProfiles {
    settings: SlackSettings,
}

impl CollectNotifyProfiles {
    pub fn new(settings: SlackSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PublishStage for CollectNotifyProfiles {
    fn label(&self) -> &'static str {
        "Collect Slack notification profiles"
    }

    fn order(&self) -> StageOrder {
        StageOrder::Collect
    }

    async fn process(
        &self,
        ctx: &mut PublishContext,
        instance: &mut PublishInstance,
    ) -> Result<(), NotifyError> {
        if !self.settings.enabled {
            tracing::debug!("slack notifications disabled in settings");
            return Ok(());
        }

        let facts = InstanceFacts::from_instance(instance, ctx);
        let Some(profile) = filter_profiles(&self.settings.profiles, &facts) else {
            tracing::info!(
                product = %instance.product_name,
                "no profile found, notification won't be sent"
            );
            return Ok(());
        };

        tracing::info!(
            product = %instance.product_name,
            channel_messages = profile.channel_messages.len(),
            "found matching notification profile"
        );

        if !instance.families.iter().any(|family| family == SLACK_FAMILY) {
            instance.families.push(SLACK_FAMILY.to_string());
        }

        let messages = profile
            .channel_messages
            .iter()
            .map(|cm| PlanMessage {
                channels: cm.channels.clone(),
                message: cm.message.clone(),
                upload_thumbnail: cm.upload_thumbnail,
                upload_review: cm.upload_review,
                review_upload_limit: profile.review_upload_limit,
            })
            .collect();

        instance.notification = Some(NotificationPlan {
            token: self.settings.token.clone(),
            messages,
            additional_message: instance.additional_message.clone(),
        });
        Ok(())
    }
}

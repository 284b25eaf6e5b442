use std::path::Path;

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::mentions::{DirectoryGroup, DirectoryUser};
use crate::types::{DeliveryReceipt, PublishContext, PublishInstance};

/// Outbound chat operations the dispatcher needs.
///
/// Implemented by [`crate::slack::api::SlackApiClient`]; tests substitute
/// recording or failing implementations.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Full user listing (paginated transports must accumulate all pages).
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, NotifyError>;

    /// Full user-group listing.
    async fn list_groups(&self) -> Result<Vec<DirectoryGroup>, NotifyError>;

    /// Upload a file and return its shareable permalink.
    async fn upload_file(&self, path: &Path) -> Result<String, NotifyError>;

    /// Send a message to one channel.
    async fn post_message(&self, channel: &str, text: &str)
        -> Result<DeliveryReceipt, NotifyError>;
}

/// Where a stage runs within the publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageOrder {
    Collect,
    Integrate,
}

/// One step of the publish pipeline, invoked per instance.
///
/// Stages receive explicit configuration at construction; there is no
/// ambient registration. A stage error is confined to the current instance.
#[async_trait]
pub trait PublishStage: Send + Sync {
    fn label(&self) -> &'static str;

    fn order(&self) -> StageOrder;

    async fn process(
        &self,
        ctx: &mut PublishContext,
        instance: &mut PublishInstance,
    ) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct EchoService;

    #[async_trait]
    impl ChatService for EchoService {
        async fn list_users(&self) -> Result<Vec<DirectoryUser>, NotifyError> {
            Ok(vec![DirectoryUser {
                id: "U1".to_string(),
                handle: "alice".to_string(),
                ..DirectoryUser::default()
            }])
        }

        async fn list_groups(&self) -> Result<Vec<DirectoryGroup>, NotifyError> {
            Ok(Vec::new())
        }

        async fn upload_file(&self, path: &Path) -> Result<String, NotifyError> {
            Ok(format!("https://files.example/{}", path.display()))
        }

        async fn post_message(
            &self,
            channel: &str,
            _text: &str,
        ) -> Result<DeliveryReceipt, NotifyError> {
            Ok(DeliveryReceipt {
                channel: channel.to_string(),
                message_ts: Some("1234567890.123456".to_string()),
                delivered_at: Utc::now(),
                success: true,
                error: None,
            })
        }
    }

    #[test]
    fn chat_service_object_safety() {
        let service: Box<dyn ChatService> = Box::new(EchoService);
        let receipt = tokio_test::block_on(service.post_message("#anim", "hi")).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.channel, "#anim");
    }

    #[test]
    fn stage_order_sorts_collect_first() {
        let mut orders = vec![StageOrder::Integrate, StageOrder::Collect];
        orders.sort();
        assert_eq!(orders, vec![StageOrder::Collect, StageOrder::Integrate]);
    }
}

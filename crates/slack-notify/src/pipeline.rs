//! Sequential publish-run driver.
//!
//! Mirrors the host pipeline's execution model: stages run in order, each
//! visiting every instance exactly once, one at a time. A stage failure is
//! logged and confined to the instance it happened on.

use crate::traits::PublishStage;
use crate::types::{PublishContext, PublishInstance};

/// Run all stages over all instances, collectors before integrators.
pub async fn run_publish(
    mut stages: Vec<Box<dyn PublishStage>>,
    ctx: &mut PublishContext,
    instances: &mut [PublishInstance],
) {
    stages.sort_by_key(|stage| stage.order());

    for stage in &stages {
        tracing::debug!(stage = stage.label(), instances = instances.len(), "running stage");
        for instance in instances.iter_mut() {
            if let Err(e) = stage.process(ctx, instance).await {
                tracing::warn!(
                    stage = stage.label(),
                    instance = %instance.id,
                    error = %e,
                    "publish stage failed, skipping instance"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::traits::StageOrder;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct MarkerStage {
        name: &'static str,
        order: StageOrder,
        seen: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl PublishStage for MarkerStage {
        fn label(&self) -> &'static str {
            self.name
        }

        fn order(&self) -> StageOrder {
            self.order
        }

        async fn process(
            &self,
            _ctx: &mut PublishContext,
            _instance: &mut PublishInstance,
        ) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(self.name);
            if self.fail {
                return Err(NotifyError::Internal("stage broke".to_string()));
            }
            Ok(())
        }
    }

    fn instance() -> PublishInstance {
        serde_json::from_value(json!({
            "product_type": "render",
            "product_name": "renderMain"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn stages_run_in_order_regardless_of_registration() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Box<dyn PublishStage>> = vec![
            Box::new(MarkerStage {
                name: "integrate",
                order: StageOrder::Integrate,
                seen: seen.clone(),
                fail: false,
            }),
            Box::new(MarkerStage {
                name: "collect",
                order: StageOrder::Collect,
                seen: seen.clone(),
                fail: false,
            }),
        ];

        let mut ctx = PublishContext::default();
        let mut instances = vec![instance()];
        run_publish(stages, &mut ctx, &mut instances).await;

        assert_eq!(*seen.lock().unwrap(), vec!["collect", "integrate"]);
    }

    #[tokio::test]
    async fn failing_stage_does_not_stop_the_run() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Box<dyn PublishStage>> = vec![
            Box::new(MarkerStage {
                name: "collect",
                order: StageOrder::Collect,
                seen: seen.clone(),
                fail: true,
            }),
            Box::new(MarkerStage {
                name: "integrate",
                order: StageOrder::Integrate,
                seen: seen.clone(),
                fail: false,
            }),
        ];

        let mut ctx = PublishContext::default();
        let mut instances = vec![instance(), instance()];
        run_publish(stages, &mut ctx, &mut instances).await;

        // collect fails on both instances, integrate still visits both
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["collect", "collect", "integrate", "integrate"]
        );
    }
}

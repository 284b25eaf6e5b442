//! End-to-end publish flow: collect profiles, then dispatch to a recording
//! chat service.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use callsheet_slack::{
    ChannelMessage, ChatService, CollectNotifyProfiles, DeliveryReceipt, DirectoryGroup,
    DirectoryUser, IntegrateSlackMessages, NotifyError, Profile, PublishManifest, PublishStage,
    SlackSettings, SLACK_FAMILY,
};

#[derive(Default)]
struct RecordingService {
    posts: Mutex<Vec<(String, String)>>,
    uploads: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl ChatService for RecordingService {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, NotifyError> {
        Ok(Vec::new())
    }

    async fn list_groups(&self) -> Result<Vec<DirectoryGroup>, NotifyError> {
        Ok(Vec::new())
    }

    async fn upload_file(&self, path: &Path) -> Result<String, NotifyError> {
        self.uploads.lock().unwrap().push(path.to_path_buf());
        Ok("https://acme.slack.com/files/F123".to_string())
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(DeliveryReceipt {
            channel: channel.to_string(),
            message_ts: Some("1234567890.123456".to_string()),
            delivered_at: Utc::now(),
            success: true,
            error: None,
        })
    }
}

fn settings() -> SlackSettings {
    SlackSettings {
        enabled: true,
        token: "xoxb-test".to_string(),
        profiles: vec![Profile {
            task_types: vec!["Animation".to_string()],
            review_upload_limit: 10.0,
            channel_messages: vec![ChannelMessage {
                channels: vec!["#anim".to_string()],
                upload_thumbnail: false,
                upload_review: true,
                message: "{task} done".to_string(),
            }],
            ..Profile::default()
        }],
    }
}

fn manifest(review_path: &Path) -> PublishManifest {
    let raw = serde_json::json!({
        "context": {"host_name": "maya"},
        "instances": [
            {
                "product_type": "render",
                "product_name": "renderMain",
                "anatomy_data": {"task": {"name": "lighting01", "type": "Animation"}},
                "representations": [
                    {"name": "review", "tags": ["review"], "published_path": review_path}
                ]
            },
            {
                "product_type": "workfile",
                "product_name": "workfileMain",
                "anatomy_data": {"task": {"name": "lighting01", "type": "Compositing"}}
            }
        ]
    });
    serde_json::from_value(raw).unwrap()
}

#[tokio::test]
async fn matched_instance_notifies_with_review_attached() {
    let dir = tempfile::tempdir().unwrap();
    let review = dir.path().join("review.mp4");
    std::fs::File::create(&review)
        .unwrap()
        .write_all(&vec![0u8; 5 * 1024]) // well under the 10 MB limit
        .unwrap();

    let service = Arc::new(RecordingService::default());
    let stages: Vec<Box<dyn PublishStage>> = vec![
        Box::new(CollectNotifyProfiles::new(settings())),
        Box::new(IntegrateSlackMessages::with_service(service.clone())),
    ];

    let mut manifest = manifest(&review);
    let mut instances = std::mem::take(&mut manifest.instances);
    callsheet_slack::run_publish(stages, &mut manifest.context, &mut instances).await;

    // the Animation instance matched, the Compositing one did not
    assert!(instances[0].families.iter().any(|f| f == SLACK_FAMILY));
    assert!(instances[1].families.is_empty());
    assert!(instances[1].deliveries.is_empty());

    let uploads = service.uploads.lock().unwrap();
    assert_eq!(uploads.as_slice(), &[review]);

    let posts = service.posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    let (channel, text) = &posts[0];
    assert_eq!(channel, "#anim");
    assert_eq!(text, "lighting01 done<https://acme.slack.com/files/F123| >");

    let receipt = &instances[0].deliveries[0];
    assert!(receipt.success);
    assert_eq!(receipt.channel, "#anim");
}

#[tokio::test]
async fn oversized_review_links_instead_of_uploading() {
    let dir = tempfile::tempdir().unwrap();
    let review = dir.path().join("review.mp4");
    std::fs::File::create(&review)
        .unwrap()
        .write_all(&vec![0u8; 64 * 1024])
        .unwrap();

    let mut settings = settings();
    settings.profiles[0].review_upload_limit = 0.01; // ~10 KB

    let service = Arc::new(RecordingService::default());
    let stages: Vec<Box<dyn PublishStage>> = vec![
        Box::new(CollectNotifyProfiles::new(settings)),
        Box::new(IntegrateSlackMessages::with_service(service.clone())),
    ];

    let mut manifest = manifest(&review);
    let mut instances = std::mem::take(&mut manifest.instances);
    callsheet_slack::run_publish(stages, &mut manifest.context, &mut instances).await;

    assert!(service.uploads.lock().unwrap().is_empty());
    let posts = service.posts.lock().unwrap();
    let expected = format!(
        "lighting01 done\nReview upload omitted because of file size.\nFile located at: {}",
        review.display()
    );
    assert_eq!(posts[0].1, expected);
}

//! Slack notifications for publish pipelines.
//!
//! During a publish run, instances are matched against per-project profiles
//! and the selected channel messages are rendered, decorated with thumbnail
//! and review attachments, and posted to Slack.
//!
//! Two stages cooperate:
//! - [`CollectNotifyProfiles`] picks the profile for each instance and
//!   attaches the notification plan.
//! - [`IntegrateSlackMessages`] renders templates, resolves `@mentions`,
//!   uploads attachments and dispatches one message per channel.
//!
//! No failure in this crate aborts the enclosing publish run: profile
//! misses, directory hiccups and per-channel send errors all resolve to
//! "skip and log" at the finest granularity available.

pub mod collect;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mentions;
pub mod pipeline;
pub mod profiles;
pub mod slack;
pub mod template;
pub mod traits;
pub mod types;

pub use collect::{CollectNotifyProfiles, SLACK_FAMILY};
pub use config::{ChannelMessage, Profile, SlackSettings};
pub use dispatch::IntegrateSlackMessages;
pub use error::NotifyError;
pub use mentions::{DirectoryGroup, DirectoryUser, MentionDirectory, RetryPolicy};
pub use pipeline::run_publish;
pub use profiles::{filter_profiles, InstanceFacts};
pub use slack::api::SlackApiClient;
pub use traits::{ChatService, PublishStage, StageOrder};
pub use types::{
    DeliveryReceipt, NotificationPlan, PlanMessage, PublishContext, PublishInstance,
    PublishManifest, Representation,
};

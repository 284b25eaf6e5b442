//! Profile selection for publish instances.
//!
//! Profiles are evaluated in configuration order; the first one whose every
//! non-empty filter list contains the matching instance fact wins. An empty
//! filter list is a wildcard. No match means "no notification", not an error.

use crate::config::Profile;
use crate::types::{PublishContext, PublishInstance};

/// Read-only snapshot of the facts a profile filters on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFacts {
    pub product_type: String,
    pub product_name: String,
    pub task_name: Option<String>,
    pub task_type: Option<String>,
    pub host: String,
}

impl InstanceFacts {
    pub fn from_instance(instance: &PublishInstance, ctx: &PublishContext) -> Self {
        Self {
            product_type: instance.product_type.clone(),
            product_name: instance.product_name.clone(),
            task_name: instance.task_name().map(str::to_string),
            task_type: instance.task_type().map(str::to_string),
            host: ctx.host_name.clone(),
        }
    }
}

/// Select the first profile fully matching the given facts.
pub fn filter_profiles<'a>(profiles: &'a [Profile], facts: &InstanceFacts) -> Option<&'a Profile> {
    let selected = profiles.iter().find(|p| profile_matches(p, facts));
    if let Some(profile) = selected {
        tracing::debug!(
            product_type = %facts.product_type,
            host = %facts.host,
            channel_messages = profile.channel_messages.len(),
            "profile matched"
        );
    }
    selected
}

fn profile_matches(profile: &Profile, facts: &InstanceFacts) -> bool {
    filter_matches(&profile.product_types, Some(&facts.product_type))
        && filter_matches(&profile.hosts, Some(&facts.host))
        && filter_matches(&profile.task_types, facts.task_type.as_deref())
        && filter_matches(&profile.task_names, facts.task_name.as_deref())
        && filter_matches(&profile.product_names, Some(&facts.product_name))
}

fn filter_matches(filter: &[String], fact: Option<&str>) -> bool {
    if filter.is_empty() {
        return true;
    }
    match fact {
        Some(value) => filter.iter().any(|allowed| allowed == value),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> InstanceFacts {
        InstanceFacts {
            product_type: "render".to_string(),
            product_name: "renderMain".to_string(),
            task_name: Some("lighting01".to_string()),
            task_type: Some("Animation".to_string()),
            host: "maya".to_string(),
        }
    }

    fn profile(task_types: &[&str]) -> Profile {
        Profile {
            task_types: task_types.iter().map(|s| s.to_string()).collect(),
            ..Profile::default()
        }
    }

    #[test]
    fn empty_filters_match_anything() {
        let profiles = vec![Profile::default()];
        assert!(filter_profiles(&profiles, &facts()).is_some());
    }

    #[test]
    fn first_matching_profile_wins() {
        let profiles = vec![
            profile(&["Compositing"]),
            profile(&["Animation"]),
            Profile::default(),
        ];
        let selected = filter_profiles(&profiles, &facts()).unwrap();
        assert_eq!(selected.task_types, vec!["Animation"]);
    }

    #[test]
    fn no_profile_qualifies() {
        let profiles = vec![profile(&["Compositing"]), profile(&["Layout"])];
        assert!(filter_profiles(&profiles, &facts()).is_none());
    }

    #[test]
    fn all_defined_filters_must_hold() {
        let mut p = profile(&["Animation"]);
        p.hosts = vec!["nuke".to_string()];
        assert!(filter_profiles(&[p], &facts()).is_none());

        let mut p = profile(&["Animation"]);
        p.hosts = vec!["maya".to_string()];
        p.product_names = vec!["renderMain".to_string()];
        assert!(filter_profiles(&[p], &facts()).is_some());
    }

    #[test]
    fn missing_fact_fails_non_empty_filter() {
        let mut without_task = facts();
        without_task.task_type = None;
        assert!(filter_profiles(&[profile(&["Animation"])], &without_task).is_none());
        // ...but a wildcard profile still matches the same facts
        assert!(filter_profiles(&[Profile::default()], &without_task).is_some());
    }

    #[test]
    fn legacy_keyed_profile_matches_like_canonical() {
        let legacy: Profile =
            serde_json::from_str(r#"{"families": ["render"], "tasks": ["lighting01"]}"#).unwrap();
        let canonical: Profile = serde_json::from_str(
            r#"{"product_types": ["render"], "task_names": ["lighting01"]}"#,
        )
        .unwrap();
        assert!(filter_profiles(std::slice::from_ref(&legacy), &facts()).is_some());
        assert!(filter_profiles(std::slice::from_ref(&canonical), &facts()).is_some());
    }
}

//! Webhook DTOs
//!
//! Push event payload as sent by GitHub. Only the fields the trigger needs
//! are modelled; everything else in the payload is ignored.

use serde::{Deserialize, Serialize};

use crate::domain::trigger::TriggerEvent;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// GitHub push event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    /// Full ref name (e.g. `refs/heads/main`)
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Commit the ref points to after the push
    pub after: String,
    pub repository: PushRepository,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRepository {
    pub name: String,
    pub owner: PushOwner,
}

/// Repository owner; GitHub sends `login` or `name` depending on the hook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOwner {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl PushEvent {
    /// Converts the push into a trigger event
    ///
    /// Returns `None` for tag pushes and branch deletions.
    pub fn into_trigger(self) -> Option<TriggerEvent> {
        if self.deleted {
            return None;
        }

        let branch = self.git_ref.strip_prefix(BRANCH_REF_PREFIX)?.to_string();
        let owner = self
            .repository
            .owner
            .login
            .or(self.repository.owner.name)?;

        Some(TriggerEvent {
            owner,
            repo: self.repository.name,
            branch,
            commit_ref: self.after,
        })
    }
}

/// Reply for events that did not start a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookIgnored {
    pub ignored: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(git_ref: &str) -> serde_json::Value {
        serde_json::json!({
            "ref": git_ref,
            "before": "0000000",
            "after": "4f2a9c1",
            "repository": {
                "name": "service",
                "full_name": "acme/service",
                "owner": { "login": "acme", "id": 1 }
            },
            "pusher": { "name": "dev" }
        })
    }

    #[test]
    fn test_branch_push() {
        let event: PushEvent = serde_json::from_value(payload("refs/heads/main")).unwrap();
        let trigger = event.into_trigger().unwrap();
        assert_eq!(trigger.owner, "acme");
        assert_eq!(trigger.repo, "service");
        assert_eq!(trigger.branch, "main");
        assert_eq!(trigger.commit_ref, "4f2a9c1");
    }

    #[test]
    fn test_tag_push_is_ignored() {
        let event: PushEvent = serde_json::from_value(payload("refs/tags/v1.0.0")).unwrap();
        assert!(event.into_trigger().is_none());
    }

    #[test]
    fn test_branch_deletion_is_ignored() {
        let mut json = payload("refs/heads/main");
        json["deleted"] = serde_json::json!(true);
        let event: PushEvent = serde_json::from_value(json).unwrap();
        assert!(event.into_trigger().is_none());
    }

    #[test]
    fn test_owner_name_fallback() {
        let mut json = payload("refs/heads/main");
        json["repository"]["owner"] = serde_json::json!({ "name": "acme" });
        let event: PushEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.into_trigger().unwrap().owner, "acme");
    }
}

//! Source trigger domain types

use serde::{Deserialize, Serialize};

/// An inbound source-control event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Commit the event refers to
    pub commit_ref: String,
}

/// Repository coordinates a pipeline listens to
///
/// Two triggers with the same coordinates are the same subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceTrigger {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl SourceTrigger {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    /// Whether an event activates this trigger
    ///
    /// Owner and repository compare case-insensitively, the branch exactly.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        self.owner.eq_ignore_ascii_case(&event.owner)
            && self.repo.eq_ignore_ascii_case(&event.repo)
            && self.branch == event.branch
    }

    /// Builds an event for this trigger at the given commit
    pub fn event(&self, commit_ref: impl Into<String>) -> TriggerEvent {
        TriggerEvent {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            branch: self.branch.clone(),
            commit_ref: commit_ref.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_event() {
        let trigger = SourceTrigger::new("acme", "service", "main");
        assert!(trigger.matches(&trigger.event("abc123")));

        let mut event = trigger.event("abc123");
        event.owner = "ACME".to_string();
        assert!(trigger.matches(&event));
    }

    #[test]
    fn test_branch_mismatch() {
        let trigger = SourceTrigger::new("acme", "service", "main");
        let mut event = trigger.event("abc123");
        event.branch = "feature/x".to_string();
        assert!(!trigger.matches(&event));

        event.branch = "Main".to_string();
        assert!(!trigger.matches(&event));
    }

    #[test]
    fn test_repo_mismatch() {
        let trigger = SourceTrigger::new("acme", "service", "main");
        let mut event = trigger.event("abc123");
        event.repo = "other".to_string();
        assert!(!trigger.matches(&event));
    }
}

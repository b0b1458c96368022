//! Webhook subscriptions
//!
//! A pipeline subscribes to push events of one repository branch.
//! Registration is idempotent: registering the same pipeline and trigger
//! again returns the existing subscription.

use keel_core::domain::trigger::{SourceTrigger, TriggerEvent};
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub pipeline: String,
    pub trigger: SourceTrigger,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default)]
pub struct WebhookRegistry {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `pipeline` to `trigger`
    ///
    /// Returns the subscription and whether it was newly created.
    pub fn register(&self, pipeline: &str, trigger: &SourceTrigger) -> (Subscription, bool) {
        let mut subscriptions = self.write();

        if let Some(existing) = subscriptions
            .iter()
            .find(|s| s.pipeline == pipeline && same_trigger(&s.trigger, trigger))
        {
            debug!(
                "Pipeline {} is already subscribed to {}/{}@{}",
                pipeline, trigger.owner, trigger.repo, trigger.branch
            );
            return (existing.clone(), false);
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            pipeline: pipeline.to_string(),
            trigger: trigger.clone(),
            created_at: chrono::Utc::now(),
        };

        info!(
            "Subscribed pipeline {} to {}/{}@{} ({})",
            pipeline, trigger.owner, trigger.repo, trigger.branch, subscription.id
        );
        subscriptions.push(subscription.clone());
        (subscription, true)
    }

    /// Subscriptions activated by `event`
    pub fn matching(&self, event: &TriggerEvent) -> Vec<Subscription> {
        self.read()
            .iter()
            .filter(|s| s.trigger.matches(event))
            .cloned()
            .collect()
    }

    pub fn list(&self) -> Vec<Subscription> {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Subscription>> {
        self.subscriptions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Subscription>> {
        self.subscriptions.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Same coordinates under the matching rules (owner and repo ignore case)
fn same_trigger(a: &SourceTrigger, b: &SourceTrigger) -> bool {
    a.owner.eq_ignore_ascii_case(&b.owner)
        && a.repo.eq_ignore_ascii_case(&b.repo)
        && a.branch == b.branch
}

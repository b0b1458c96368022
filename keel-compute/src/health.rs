//! Health checking
//!
//! A target starts in `Initial` and becomes `Healthy` after
//! `healthy_threshold` consecutive successful probes, or `Unhealthy` after
//! `unhealthy_threshold` consecutive failures. A result that breaks a streak
//! resets the opposite counter.

use async_trait::async_trait;
use keel_core::domain::compute::{Endpoint, HealthCheckPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Initial,
    Healthy,
    Unhealthy,
}

/// Consecutive-result threshold state machine
#[derive(Debug, Clone)]
pub struct HealthTracker {
    healthy_threshold: u32,
    unhealthy_threshold: u32,
    state: HealthState,
    successes: u32,
    failures: u32,
}

impl HealthTracker {
    pub fn new(policy: &HealthCheckPolicy) -> Self {
        Self {
            healthy_threshold: policy.healthy_threshold.max(1),
            unhealthy_threshold: policy.unhealthy_threshold.max(1),
            state: HealthState::Initial,
            successes: 0,
            failures: 0,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Records a probe result; returns the new state on a transition
    pub fn observe(&mut self, ok: bool) -> Option<HealthState> {
        if ok {
            self.successes += 1;
            self.failures = 0;
            if self.successes >= self.healthy_threshold && self.state != HealthState::Healthy {
                self.state = HealthState::Healthy;
                return Some(self.state);
            }
        } else {
            self.failures += 1;
            self.successes = 0;
            if self.failures >= self.unhealthy_threshold && self.state != HealthState::Unhealthy {
                self.state = HealthState::Unhealthy;
                return Some(self.state);
            }
        }
        None
    }
}

/// Performs one health check request
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, url: &str, timeout: Duration) -> bool;
}

/// HTTP GET probe; any 2xx within the timeout is a success
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self, url: &str, timeout: Duration) -> bool {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                debug!("Health check {} -> {}", url, response.status());
                ok
            }
            Err(e) => {
                debug!("Health check {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Polls an endpoint until its health state settles
pub struct HealthMonitor<P: HealthProbe> {
    probe: P,
    policy: HealthCheckPolicy,
    interval: Duration,
}

impl<P: HealthProbe> HealthMonitor<P> {
    /// Creates a monitor polling at the policy's interval
    pub fn new(probe: P, policy: HealthCheckPolicy) -> Self {
        let interval = Duration::from_secs(u64::from(policy.interval_seconds));
        Self {
            probe,
            policy,
            interval,
        }
    }

    /// Overrides the polling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Probes until the first transition or `max_checks` probes
    ///
    /// Returns the state reached; `Initial` if neither threshold was met.
    pub async fn wait_until_settled(&self, endpoint: &Endpoint, max_checks: u32) -> HealthState {
        let url = endpoint.url(&self.policy.path);
        let timeout = Duration::from_secs(u64::from(self.policy.timeout_seconds));
        let mut tracker = HealthTracker::new(&self.policy);

        info!(
            "Waiting for {} to settle (healthy after {}, unhealthy after {})",
            url, self.policy.healthy_threshold, self.policy.unhealthy_threshold
        );

        for check in 0..max_checks {
            if check > 0 {
                tokio::time::sleep(self.interval).await;
            }

            let ok = self.probe.check(&url, timeout).await;
            if let Some(state) = tracker.observe(ok) {
                match state {
                    HealthState::Healthy => info!("{} is healthy", url),
                    _ => warn!("{} is unhealthy", url),
                }
                return state;
            }
        }

        tracker.state()
    }
}

//! Provisioner trait and dry-run implementation

use async_trait::async_trait;
use keel_core::domain::compute::{ClusterSpec, Endpoint, RunningService};
use keel_core::error::ProvisioningError;
use std::collections::BTreeMap;
use tracing::info;

use crate::plan::{BACKEND_URL_OUTPUT, ResourcePlan};

/// Materializes a `ClusterSpec`
///
/// Failures are fatal to stack creation and never retried here.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, spec: &ClusterSpec) -> Result<RunningService, ProvisioningError>;
}

/// Validates the cluster spec and renders the plan without creating anything
///
/// The returned service carries a synthesized endpoint under `domain`.
#[derive(Debug, Clone)]
pub struct DryRunProvisioner {
    domain: String,
}

impl DryRunProvisioner {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    /// Validates the cluster spec and returns its resource plan
    pub fn plan(&self, spec: &ClusterSpec) -> Result<ResourcePlan, ProvisioningError> {
        spec.validate()?;
        Ok(ResourcePlan::render(spec))
    }
}

impl Default for DryRunProvisioner {
    fn default() -> Self {
        Self::new("keel.local")
    }
}

#[async_trait]
impl Provisioner for DryRunProvisioner {
    async fn provision(&self, spec: &ClusterSpec) -> Result<RunningService, ProvisioningError> {
        let plan = self.plan(spec)?;
        info!(
            "Dry run for {}: {} resource(s) planned",
            spec.name,
            plan.resources.len()
        );

        let endpoint = Endpoint {
            protocol: spec.health_check.protocol,
            host: format!("{}-lb.{}", spec.name, self.domain),
            port: spec.listener_port,
        };

        let outputs = BTreeMap::from([(BACKEND_URL_OUTPUT.to_string(), endpoint.host.clone())]);

        Ok(RunningService {
            name: spec.name.clone(),
            target: format!("{}-targets", spec.name),
            replicas: spec.replicas,
            endpoint,
            outputs,
        })
    }
}

//! Compute domain types
//!
//! Declarative description of the running service: instance capacity, the
//! container, the replicated service, the public listener and the health
//! check the listener applies to targets.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProvisioningError;

/// Upper bound on service replicas
pub const MAX_REPLICAS: u32 = 10;

/// Instance capacity bounds for the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSizing {
    pub instance_type: String,
    pub min: u32,
    pub max: u32,
    pub desired: u32,
}

/// How service tasks are placed on instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Let the scheduler decide
    #[default]
    Default,
    /// One task per instance where possible
    SpreadAcrossInstances,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// The service container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    /// Image reference (e.g. `docker.io/acme/service:latest`)
    pub image: String,
    pub port: u16,
    pub memory_limit_mib: u32,
}

/// Health check the load balancer applies to every target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckPolicy {
    pub path: String,
    pub protocol: Protocol,
    pub timeout_seconds: u32,
    pub interval_seconds: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            protocol: Protocol::Http,
            timeout_seconds: 10,
            interval_seconds: 60,
            healthy_threshold: 5,
            unhealthy_threshold: 5,
        }
    }
}

/// Full description of the service to provision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Service name, also used to derive resource names
    pub name: String,
    pub instances: InstanceSizing,
    /// Number of service replicas kept running
    pub replicas: u32,
    pub placement: PlacementStrategy,
    pub container: ContainerSpec,
    /// Public listener port
    pub listener_port: u16,
    pub health_check: HealthCheckPolicy,
}

impl ClusterSpec {
    /// Single-zone preset: two instances, one replica
    pub fn standard(name: impl Into<String>, image: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            instances: InstanceSizing {
                instance_type: "t2.micro".to_string(),
                min: 1,
                max: 5,
                desired: 2,
            },
            replicas: 1,
            placement: PlacementStrategy::Default,
            container: ContainerSpec {
                name: format!("{}-container", name),
                image: image.into(),
                port: 80,
                memory_limit_mib: 256,
            },
            listener_port: 80,
            health_check: HealthCheckPolicy::default(),
            name,
        }
    }

    /// Multi-instance preset: two replicas spread across instances
    pub fn spread(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            replicas: 2,
            placement: PlacementStrategy::SpreadAcrossInstances,
            ..Self::standard(name, image)
        }
    }

    /// Checks bounds and consistency
    pub fn validate(&self) -> Result<(), ProvisioningError> {
        let invalid = |msg: String| Err(ProvisioningError::InvalidSpec(msg));

        if self.name.trim().is_empty() {
            return invalid("service name cannot be empty".to_string());
        }
        if self.container.image.trim().is_empty() {
            return invalid("container image cannot be empty".to_string());
        }

        let sizing = &self.instances;
        if sizing.min > sizing.max {
            return invalid(format!(
                "instance min ({}) exceeds max ({})",
                sizing.min, sizing.max
            ));
        }
        if sizing.desired < sizing.min || sizing.desired > sizing.max {
            return invalid(format!(
                "desired instances ({}) outside [{}, {}]",
                sizing.desired, sizing.min, sizing.max
            ));
        }

        if self.replicas == 0 || self.replicas > MAX_REPLICAS {
            return invalid(format!(
                "replicas must be between 1 and {} (got {})",
                MAX_REPLICAS, self.replicas
            ));
        }

        if self.container.port == 0 || self.listener_port == 0 {
            return invalid("ports must be non-zero".to_string());
        }
        if self.container.memory_limit_mib == 0 {
            return invalid("memory limit must be greater than 0".to_string());
        }

        let hc = &self.health_check;
        if !hc.path.starts_with('/') {
            return invalid(format!("health check path must start with '/' (got '{}')", hc.path));
        }
        if hc.timeout_seconds == 0 || hc.timeout_seconds >= hc.interval_seconds {
            return invalid(format!(
                "health check timeout ({}s) must be positive and shorter than the interval ({}s)",
                hc.timeout_seconds, hc.interval_seconds
            ));
        }
        if !(2..=10).contains(&hc.healthy_threshold) || !(2..=10).contains(&hc.unhealthy_threshold)
        {
            return invalid("health check thresholds must be between 2 and 10".to_string());
        }

        Ok(())
    }
}

/// Externally reachable address of the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub protocol: Protocol,
    /// DNS-style host name
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// URL for a path on this endpoint
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let default_port = match self.protocol {
            Protocol::Http => 80,
            Protocol::Https => 443,
        };
        if self.port == default_port {
            write!(f, "{}://{}", self.protocol, self.host)
        } else {
            write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
        }
    }
}

/// A provisioned service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningService {
    pub name: String,
    /// Public entry point; without a load balancer it reaches only the
    /// first replica
    pub endpoint: Endpoint,
    /// Backend reference the listener routes to (opaque to the orchestrator).
    /// The podman provisioner lists every replica with its own endpoint.
    pub target: String,
    pub replicas: u32,
    /// Named outputs (e.g. `BackendURL`)
    pub outputs: std::collections::BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        let standard = ClusterSpec::standard("service", "docker.io/acme/service:latest");
        assert!(standard.validate().is_ok());
        assert_eq!(standard.replicas, 1);
        assert_eq!(standard.health_check.path, "/health");
        assert_eq!(standard.health_check.interval_seconds, 60);

        let spread = ClusterSpec::spread("service", "docker.io/acme/service:latest");
        assert!(spread.validate().is_ok());
        assert_eq!(spread.replicas, 2);
        assert_eq!(spread.placement, PlacementStrategy::SpreadAcrossInstances);
    }

    #[test]
    fn test_invalid_sizing() {
        let mut spec = ClusterSpec::standard("service", "img");
        spec.instances.desired = 9;
        assert!(matches!(
            spec.validate(),
            Err(ProvisioningError::InvalidSpec(_))
        ));

        let mut spec = ClusterSpec::standard("service", "img");
        spec.replicas = MAX_REPLICAS + 1;
        assert!(spec.validate().is_err());

        let mut spec = ClusterSpec::standard("service", "img");
        spec.replicas = 0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_invalid_health_check() {
        let mut spec = ClusterSpec::standard("service", "img");
        spec.health_check.timeout_seconds = 60;
        assert!(spec.validate().is_err());

        let mut spec = ClusterSpec::standard("service", "img");
        spec.health_check.healthy_threshold = 1;
        assert!(spec.validate().is_err());

        let mut spec = ClusterSpec::standard("service", "img");
        spec.health_check.path = "health".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint {
            protocol: Protocol::Http,
            host: "service-lb.example.com".to_string(),
            port: 80,
        };
        assert_eq!(endpoint.to_string(), "http://service-lb.example.com");
        assert_eq!(endpoint.url("/health"), "http://service-lb.example.com/health");

        let endpoint = Endpoint {
            port: 8080,
            ..endpoint
        };
        assert_eq!(endpoint.to_string(), "http://service-lb.example.com:8080");
    }
}

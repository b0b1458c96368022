//! Podman provisioner
//!
//! Runs the service locally with podman:
//! - One network per service
//! - One container per replica, replica `i` published on `listener_port + i`
//! - Container health check mirroring the cluster's health policy
//!
//! There is no load balancer in front of the replicas. The service endpoint
//! is replica 0's port, so it reaches replica 0 only; the other replicas are
//! reachable on their own ports, listed in the service's `target`.

use async_trait::async_trait;
use keel_core::domain::compute::{ClusterSpec, Endpoint, PlacementStrategy, RunningService};
use keel_core::error::ProvisioningError;
use std::collections::BTreeMap;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::plan::BACKEND_URL_OUTPUT;
use crate::provisioner::Provisioner;

/// Provisioner backed by the local podman engine
#[derive(Debug, Clone)]
pub struct PodmanProvisioner {
    /// Host name used for the published endpoint
    host: String,
}

impl PodmanProvisioner {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Checks if podman is installed and available
    pub async fn check_available(&self) -> Result<(), ProvisioningError> {
        let version = podman(&["--version".to_string()]).await.map_err(|e| {
            ProvisioningError::Backend(format!("podman is not available: {}", e))
        })?;
        info!("Podman is available: {}", version.trim());
        Ok(())
    }

    /// Stops and removes every replica and the network of a service
    pub async fn teardown(&self, spec: &ClusterSpec) -> Result<(), ProvisioningError> {
        info!("Tearing down service {}", spec.name);
        for replica in 0..spec.replicas {
            remove_container(&replica_name(spec, replica)).await;
        }
        podman(&[
            "network".to_string(),
            "rm".to_string(),
            "-f".to_string(),
            network_name(spec),
        ])
        .await?;
        Ok(())
    }

    async fn ensure_network(&self, spec: &ClusterSpec) -> Result<(), ProvisioningError> {
        let network = network_name(spec);
        let exists = Command::new("podman")
            .args(["network", "exists", &network])
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);

        if exists {
            debug!("Network {} already exists", network);
            return Ok(());
        }

        podman(&["network".to_string(), "create".to_string(), network]).await?;
        Ok(())
    }
}

#[async_trait]
impl Provisioner for PodmanProvisioner {
    async fn provision(&self, spec: &ClusterSpec) -> Result<RunningService, ProvisioningError> {
        spec.validate()?;
        self.check_available().await?;

        if spec.placement == PlacementStrategy::SpreadAcrossInstances {
            debug!("Single host: spread placement has no effect for {}", spec.name);
        }

        self.ensure_network(spec).await?;

        let mut started: Vec<String> = Vec::new();
        for replica in 0..spec.replicas {
            let name = replica_name(spec, replica);
            info!(
                "Starting replica {}/{} ({}) from {}",
                replica + 1,
                spec.replicas,
                name,
                spec.container.image
            );

            if let Err(e) = podman(&run_args(spec, replica)).await {
                error!("Failed to start replica {}: {}", name, e);
                for container in &started {
                    remove_container(container).await;
                }
                return Err(e);
            }
            started.push(name);
        }

        let endpoint = replica_endpoint(spec, &self.host, 0);

        info!("Service {} is reachable at {}", spec.name, endpoint);
        if spec.replicas > 1 {
            warn!(
                "{} replica(s) of {} are only reachable on their own ports",
                spec.replicas - 1,
                spec.name
            );
        }

        let outputs = BTreeMap::from([(BACKEND_URL_OUTPUT.to_string(), endpoint.to_string())]);

        Ok(RunningService {
            name: spec.name.clone(),
            target: replica_targets(spec, &self.host),
            replicas: spec.replicas,
            endpoint,
            outputs,
        })
    }
}

fn network_name(spec: &ClusterSpec) -> String {
    format!("keel-{}", spec.name)
}

fn replica_name(spec: &ClusterSpec, replica: u32) -> String {
    format!("keel-{}-{}", spec.name, replica)
}

/// Where one replica is published
fn replica_endpoint(spec: &ClusterSpec, host: &str, replica: u32) -> Endpoint {
    Endpoint {
        protocol: spec.health_check.protocol,
        host: host.to_string(),
        port: spec.listener_port.saturating_add(replica as u16),
    }
}

/// Every replica with its own endpoint, `name=url` joined by commas
fn replica_targets(spec: &ClusterSpec, host: &str) -> String {
    (0..spec.replicas)
        .map(|replica| {
            format!(
                "{}={}",
                replica_name(spec, replica),
                replica_endpoint(spec, host, replica)
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Arguments for `podman run` of one replica
fn run_args(spec: &ClusterSpec, replica: u32) -> Vec<String> {
    let hc = &spec.health_check;
    let host_port = u32::from(spec.listener_port) + replica;
    let probe = format!(
        "wget -q -O /dev/null http://127.0.0.1:{}{} || exit 1",
        spec.container.port, hc.path
    );

    vec![
        "run".to_string(),
        "-d".to_string(),
        "--replace".to_string(),
        "--name".to_string(),
        replica_name(spec, replica),
        "--network".to_string(),
        network_name(spec),
        "--label".to_string(),
        format!("keel.service={}", spec.name),
        "-p".to_string(),
        format!("{}:{}", host_port, spec.container.port),
        "--memory".to_string(),
        format!("{}m", spec.container.memory_limit_mib),
        "--health-cmd".to_string(),
        probe,
        "--health-interval".to_string(),
        format!("{}s", hc.interval_seconds),
        "--health-timeout".to_string(),
        format!("{}s", hc.timeout_seconds),
        "--health-retries".to_string(),
        hc.unhealthy_threshold.to_string(),
        spec.container.image.clone(),
    ]
}

/// Runs podman and returns stdout, failing on non-zero exit
async fn podman(args: &[String]) -> Result<String, ProvisioningError> {
    let output = Command::new("podman")
        .args(args)
        .output()
        .await
        .map_err(|e| ProvisioningError::Backend(format!("failed to execute podman: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !stdout.trim().is_empty() {
        debug!("podman stdout: {}", stdout.trim());
    }
    if !stderr.trim().is_empty() {
        debug!("podman stderr: {}", stderr.trim());
    }

    if !output.status.success() {
        return Err(ProvisioningError::Backend(format!(
            "podman {} failed: exit_code={}, stderr='{}'",
            args.first().map(String::as_str).unwrap_or_default(),
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    Ok(stdout)
}

async fn remove_container(name: &str) {
    match podman(&["rm".to_string(), "-f".to_string(), name.to_string()]).await {
        Ok(_) => debug!("Container {} removed", name),
        Err(e) => warn!("Failed to remove container {}: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_for_replica() {
        let spec = ClusterSpec::spread("service", "docker.io/acme/service:latest");
        let args = run_args(&spec, 1);

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("--name") + 1], "keel-service-1");
        assert_eq!(args[pos("-p") + 1], "81:80");
        assert_eq!(args[pos("--memory") + 1], "256m");
        assert_eq!(args[pos("--health-interval") + 1], "60s");
        assert_eq!(args[pos("--health-timeout") + 1], "10s");
        assert_eq!(args[pos("--health-retries") + 1], "5");
        assert!(args[pos("--health-cmd") + 1].contains("http://127.0.0.1:80/health"));
        assert_eq!(args.last().unwrap(), "docker.io/acme/service:latest");
    }

    #[test]
    fn test_names() {
        let spec = ClusterSpec::standard("service", "img");
        assert_eq!(network_name(&spec), "keel-service");
        assert_eq!(replica_name(&spec, 0), "keel-service-0");
    }

    #[test]
    fn test_each_replica_has_its_own_endpoint() {
        let spec = ClusterSpec::spread("service", "img");
        assert_eq!(spec.replicas, 2);

        let primary = replica_endpoint(&spec, "localhost", 0);
        assert_eq!(primary.port, spec.listener_port);
        assert_eq!(replica_endpoint(&spec, "localhost", 1).port, spec.listener_port + 1);

        let targets = replica_targets(&spec, "localhost");
        let entries: Vec<&str> = targets.split(',').collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], format!("keel-service-0={}", primary));
        assert!(entries[1].starts_with("keel-service-1="));
        assert!(entries[1].contains(":81"));
    }
}

//! Keel Compute
//!
//! Compute provisioner for the service the pipeline deploys into.
//!
//! Provisioning is an explicit function from a `ClusterSpec` to a
//! `RunningService`:
//! - `DryRunProvisioner`: validates and renders the resource plan only
//! - `PodmanProvisioner`: runs the service replicas with podman
//!
//! The `health` module turns periodic probe results into healthy/unhealthy
//! transitions using the policy's thresholds.

pub mod health;
pub mod plan;
pub mod podman;
pub mod provisioner;

pub use health::{HealthMonitor, HealthProbe, HealthState, HealthTracker, HttpProbe};
pub use plan::{Resource, ResourcePlan};
pub use podman::PodmanProvisioner;
pub use provisioner::{DryRunProvisioner, Provisioner};

//! Resource plan
//!
//! The declarative resource graph for a `ClusterSpec`, as a value. Rendering
//! a plan has no side effects.

use keel_core::domain::compute::{ClusterSpec, PlacementStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the output holding the public endpoint
pub const BACKEND_URL_OUTPUT: &str = "BackendURL";

/// One declared resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,
    pub name: String,
    pub properties: BTreeMap<String, String>,
    /// Names of resources this one references
    pub depends_on: Vec<String>,
}

impl Resource {
    fn new(kind: &str, name: String) -> Self {
        Self {
            kind: kind.to_string(),
            name,
            properties: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    fn prop(mut self, key: &str, value: impl ToString) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    fn depends(mut self, name: &str) -> Self {
        self.depends_on.push(name.to_string());
        self
    }
}

/// Ordered resource list; every resource appears after its dependencies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePlan {
    pub resources: Vec<Resource>,
    /// Output name to the resource attribute it exposes
    pub outputs: BTreeMap<String, String>,
}

impl ResourcePlan {
    /// Renders the plan for a cluster spec
    ///
    /// Callers validate the `ClusterSpec` first.
    pub fn render(spec: &ClusterSpec) -> Self {
        let cluster = format!("{}-cluster", spec.name);
        let capacity = format!("{}-capacity", spec.name);
        let task = format!("{}-task", spec.name);
        let service = format!("{}-service", spec.name);
        let lb = format!("{}-lb", spec.name);
        let listener = format!("{}-listener", spec.name);
        let targets = format!("{}-targets", spec.name);
        let hc = &spec.health_check;

        let placement = match spec.placement {
            PlacementStrategy::Default => "default",
            PlacementStrategy::SpreadAcrossInstances => "spread_across_instances",
        };

        let resources = vec![
            Resource::new("cluster", cluster.clone()),
            Resource::new("capacity", capacity.clone())
                .prop("instance_type", &spec.instances.instance_type)
                .prop("min", spec.instances.min)
                .prop("max", spec.instances.max)
                .prop("desired", spec.instances.desired)
                .depends(&cluster),
            Resource::new("task_definition", task.clone())
                .prop("container", &spec.container.name)
                .prop("image", &spec.container.image)
                .prop("memory_limit_mib", spec.container.memory_limit_mib)
                .prop("container_port", spec.container.port),
            Resource::new("service", service.clone())
                .prop("replicas", spec.replicas)
                .prop("placement", placement)
                .depends(&cluster)
                .depends(&task),
            Resource::new("load_balancer", lb.clone()).prop("internet_facing", true),
            Resource::new("listener", listener.clone())
                .prop("port", spec.listener_port)
                .prop("open", true)
                .depends(&lb),
            Resource::new("target_group", targets)
                .prop("protocol", hc.protocol)
                .prop("health_check_path", &hc.path)
                .prop("health_check_timeout_seconds", hc.timeout_seconds)
                .prop("health_check_interval_seconds", hc.interval_seconds)
                .prop("healthy_threshold", hc.healthy_threshold)
                .prop("unhealthy_threshold", hc.unhealthy_threshold)
                .depends(&listener)
                .depends(&service),
        ];

        let outputs = BTreeMap::from([(BACKEND_URL_OUTPUT.to_string(), format!("{}.dns_name", lb))]);

        Self { resources, outputs }
    }

    pub fn find(&self, kind: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_standard_plan() {
        let spec = ClusterSpec::standard("service", "docker.io/acme/service:latest");
        let plan = ResourcePlan::render(&spec);

        let kinds: Vec<_> = plan.resources.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "cluster",
                "capacity",
                "task_definition",
                "service",
                "load_balancer",
                "listener",
                "target_group"
            ]
        );

        let targets = plan.find("target_group").unwrap();
        assert_eq!(targets.properties["health_check_path"], "/health");
        assert_eq!(targets.properties["protocol"], "http");
        assert_eq!(plan.outputs[BACKEND_URL_OUTPUT], "service-lb.dns_name");
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let plan = ResourcePlan::render(&ClusterSpec::spread("service", "img"));
        for (idx, resource) in plan.resources.iter().enumerate() {
            for dep in &resource.depends_on {
                let dep_idx = plan.resources.iter().position(|r| &r.name == dep).unwrap();
                assert!(dep_idx < idx, "{} must come before {}", dep, resource.name);
            }
        }
        assert_eq!(
            plan.find("service").unwrap().properties["placement"],
            "spread_across_instances"
        );
    }
}

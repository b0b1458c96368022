//! Environment profiles
//!
//! Non-secret pipeline parameters for an environment. Profiles come from a
//! JSON catalog keyed by environment name, or from plain keys in the secret
//! snapshot when no catalog entry exists.

use keel_core::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::secrets::SecretSnapshot;

/// Snapshot key for the deploy command
pub const DEPLOY_COMMAND: &str = "DEPLOY_COMMAND";
pub const REPO_OWNER: &str = "REPO_OWNER";
pub const REPO_NAME: &str = "REPO_NAME";
pub const BRANCH: &str = "BRANCH";
pub const TAG: &str = "TAG";

/// Non-secret parameters of one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    pub deploy_command: String,
    pub repo_owner: String,
    pub repo_name: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl EnvironmentProfile {
    /// Reads a profile from plain snapshot keys
    ///
    /// Returns `None` when the snapshot has no `DEPLOY_COMMAND`.
    pub fn from_snapshot(snapshot: &SecretSnapshot) -> Option<Self> {
        let deploy_command = snapshot.get(DEPLOY_COMMAND)?.to_string();
        Some(Self {
            deploy_command,
            repo_owner: snapshot.get(REPO_OWNER).unwrap_or_default().to_string(),
            repo_name: snapshot.get(REPO_NAME).unwrap_or_default().to_string(),
            branch: snapshot
                .get(BRANCH)
                .map(str::to_string)
                .unwrap_or_else(default_branch),
            tag: snapshot.get(TAG).map(str::to_string),
        })
    }

    /// Tag to apply, derived from the repository when not set
    pub fn tag_for(&self, environment: &str) -> String {
        self.tag.clone().unwrap_or_else(|| {
            format!("{}-{}-pipeline", self.repo_name, environment.to_lowercase())
        })
    }
}

/// Profiles keyed by environment name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, EnvironmentProfile>,
}

impl ProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalog: the `Production` environment
    pub fn builtin() -> Self {
        Self::new().with_profile(
            "Production",
            EnvironmentProfile {
                deploy_command: "npm run cdk:prod:build".to_string(),
                repo_owner: "mcgigglepop".to_string(),
                repo_name: "cicd-resilience-hub".to_string(),
                branch: default_branch(),
                tag: Some("infrastructure-production-pipeline".to_string()),
            },
        )
    }

    pub fn with_profile(mut self, environment: impl Into<String>, profile: EnvironmentProfile) -> Self {
        self.profiles.insert(environment.into(), profile);
        self
    }

    /// Loads a catalog from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::Source(format!("cannot read {}: {}", path.display(), e))
        })?;

        Self::from_json(&content).map_err(|e| match e {
            ConfigurationError::Invalid(msg) => {
                ConfigurationError::Invalid(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(content).map_err(|e| ConfigurationError::Invalid(e.to_string()))
    }

    /// Looks up a profile, falling back to a case-insensitive match
    pub fn get(&self, environment: &str) -> Option<&EnvironmentProfile> {
        self.profiles.get(environment).or_else(|| {
            self.profiles
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(environment))
                .map(|(_, profile)| profile)
        })
    }

    pub fn environments(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_catalog_from_json() {
        let catalog = ProfileCatalog::from_json(
            r#"{
                "Production": {
                    "deploy_command": "npm run deploy:prod",
                    "repo_owner": "acme",
                    "repo_name": "service",
                    "tag": "service-production-pipeline"
                }
            }"#,
        )
        .unwrap();

        let profile = catalog.get("Production").unwrap();
        assert_eq!(profile.branch, "main");
        assert_eq!(profile.tag_for("Production"), "service-production-pipeline");
        assert!(catalog.get("production").is_some());
        assert!(catalog.get("Staging").is_none());
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = ProfileCatalog::builtin();
        assert_eq!(catalog.environments().collect::<Vec<_>>(), vec!["Production"]);

        let profile = catalog.get("Production").unwrap();
        assert_eq!(profile.branch, "main");
        assert_eq!(profile.tag_for("Production"), "infrastructure-production-pipeline");
    }

    #[test]
    fn test_catalog_rejects_bad_json() {
        let err = ProfileCatalog::from_json(r#"{ "Production": { "repo_owner": "acme" } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid(_)));
    }

    #[test]
    fn test_profile_from_snapshot() {
        let snapshot = SecretSnapshot::new(HashMap::from([
            (DEPLOY_COMMAND.to_string(), "make deploy".to_string()),
            (REPO_OWNER.to_string(), "acme".to_string()),
            (REPO_NAME.to_string(), "service".to_string()),
        ]));

        let profile = EnvironmentProfile::from_snapshot(&snapshot).unwrap();
        assert_eq!(profile.deploy_command, "make deploy");
        assert_eq!(profile.branch, "main");
        assert_eq!(profile.tag_for("Staging"), "service-staging-pipeline");

        assert!(EnvironmentProfile::from_snapshot(&SecretSnapshot::default()).is_none());
    }
}

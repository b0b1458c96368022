//! Environment configuration domain types
//!
//! An `EnvironmentConfig` is everything a pipeline run needs to know about a
//! named deployment environment. It is produced once by the configuration
//! provider and handed to the orchestrator read-only.

use std::fmt;

/// A secret value that never shows up in logs or debug output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the underlying value
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

/// Container registry credentials
///
/// Only present when both a username and a password were resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: Secret,
}

/// Resolved configuration for one deployment environment
///
/// Immutable once resolved. All fields are non-empty except the registry
/// credentials, which may be absent (the build then skips registry login).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Environment name (e.g., "Production")
    pub environment: String,

    /// Shell command executed verbatim to deploy
    pub deploy_command: String,

    /// Source repository owner
    pub repo_owner: String,

    /// Source repository name
    pub repo_name: String,

    /// Branch whose pushes trigger the pipeline
    pub branch: String,

    /// Tag applied to the pipeline resources
    pub tag: String,

    /// Token used to fetch source
    pub source_token: Secret,

    pub registry_username: Option<String>,
    pub registry_password: Option<Secret>,
}

impl EnvironmentConfig {
    /// Returns registry credentials when both username and password are set
    pub fn registry_credentials(&self) -> Option<RegistryCredentials> {
        match (&self.registry_username, &self.registry_password) {
            (Some(username), Some(password)) if !username.trim().is_empty() && !password.is_empty() => {
                Some(RegistryCredentials {
                    username: username.clone(),
                    password: password.clone(),
                })
            }
            _ => None,
        }
    }

    /// Lists the names of required fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let required = [
            ("deploy_command", self.deploy_command.as_str()),
            ("repo_owner", self.repo_owner.as_str()),
            ("repo_name", self.repo_name.as_str()),
            ("branch", self.branch.as_str()),
            ("tag", self.tag.as_str()),
            ("source_token", self.source_token.expose()),
        ];

        required
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EnvironmentConfig {
        EnvironmentConfig {
            environment: "Production".to_string(),
            deploy_command: "npm run deploy".to_string(),
            repo_owner: "acme".to_string(),
            repo_name: "service".to_string(),
            branch: "main".to_string(),
            tag: "service-production-pipeline".to_string(),
            source_token: Secret::new("ghp_token"),
            registry_username: Some("acme-bot".to_string()),
            registry_password: Some(Secret::new("hunter2")),
        }
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(secret.expose(), "hunter2");

        let debug = format!("{:?}", config());
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("ghp_token"));
    }

    #[test]
    fn test_registry_credentials_require_both_values() {
        assert!(config().registry_credentials().is_some());

        let mut no_password = config();
        no_password.registry_password = None;
        assert!(no_password.registry_credentials().is_none());

        let mut empty_user = config();
        empty_user.registry_username = Some("  ".to_string());
        assert!(empty_user.registry_credentials().is_none());
    }

    #[test]
    fn test_missing_fields() {
        assert!(config().missing_fields().is_empty());

        let mut broken = config();
        broken.branch = String::new();
        broken.source_token = Secret::new("");
        assert_eq!(broken.missing_fields(), vec!["branch", "source_token"]);
    }
}

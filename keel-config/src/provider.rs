//! Configuration provider
//!
//! Combines a profile catalog with a secret source into a validated
//! `EnvironmentConfig`.

use keel_core::domain::environment::{EnvironmentConfig, Secret};
use keel_core::error::ConfigurationError;
use tracing::{debug, info, warn};

use crate::profile::{EnvironmentProfile, ProfileCatalog};
use crate::secrets::{DOCKERHUB_PASSWORD, DOCKERHUB_USERNAME, GITHUB_TOKEN, SecretSource};

/// Resolves environment configuration
pub struct ConfigurationProvider {
    profiles: ProfileCatalog,
    secrets: Box<dyn SecretSource>,
}

impl ConfigurationProvider {
    pub fn new(profiles: ProfileCatalog, secrets: Box<dyn SecretSource>) -> Self {
        Self { profiles, secrets }
    }

    /// Resolves the configuration for an environment
    ///
    /// Reads one snapshot from the secret source. Fails if the source token
    /// is missing or any required field is empty. Registry credentials are
    /// optional.
    pub fn resolve(&self, environment: &str) -> Result<EnvironmentConfig, ConfigurationError> {
        if environment.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "environment name cannot be empty".to_string(),
            ));
        }

        let snapshot = self.secrets.snapshot(environment)?;
        debug!(
            "Read {} value(s) from secret source for {}",
            snapshot.len(),
            environment
        );

        let profile = match self.profiles.get(environment) {
            Some(profile) => profile.clone(),
            None => EnvironmentProfile::from_snapshot(&snapshot)
                .ok_or_else(|| ConfigurationError::UnknownEnvironment(environment.to_string()))?,
        };

        let source_token =
            snapshot
                .get(GITHUB_TOKEN)
                .ok_or_else(|| ConfigurationError::MissingSecret {
                    environment: environment.to_string(),
                    key: GITHUB_TOKEN.to_string(),
                })?;

        let registry_username = snapshot.get(DOCKERHUB_USERNAME).map(str::to_string);
        let registry_password = snapshot.get(DOCKERHUB_PASSWORD).map(Secret::new);

        if registry_username.is_some() != registry_password.is_some() {
            warn!(
                "Only one of {} / {} is set for {}; registry login will be skipped",
                DOCKERHUB_USERNAME, DOCKERHUB_PASSWORD, environment
            );
        }

        let config = EnvironmentConfig {
            environment: environment.to_string(),
            deploy_command: profile.deploy_command.clone(),
            repo_owner: profile.repo_owner.clone(),
            repo_name: profile.repo_name.clone(),
            branch: profile.branch.clone(),
            tag: profile.tag_for(environment),
            source_token: Secret::new(source_token),
            registry_username,
            registry_password,
        };

        if let Some(field) = config.missing_fields().first() {
            return Err(ConfigurationError::EmptyField {
                environment: environment.to_string(),
                field: field.to_string(),
            });
        }

        info!(
            "Resolved configuration for {} ({}/{}@{}, registry login: {})",
            environment,
            config.repo_owner,
            config.repo_name,
            config.branch,
            config.registry_credentials().is_some()
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{DEPLOY_COMMAND, REPO_NAME, REPO_OWNER};
    use crate::secrets::StaticSource;

    fn catalog() -> ProfileCatalog {
        ProfileCatalog::new().with_profile(
            "Production",
            EnvironmentProfile {
                deploy_command: "npm run deploy:prod".to_string(),
                repo_owner: "acme".to_string(),
                repo_name: "service".to_string(),
                branch: "main".to_string(),
                tag: Some("service-production-pipeline".to_string()),
            },
        )
    }

    fn secrets() -> StaticSource {
        StaticSource::new()
            .with_value("Production", GITHUB_TOKEN, "ghp_abc")
            .with_value("Production", DOCKERHUB_USERNAME, "acme-bot")
            .with_value("Production", DOCKERHUB_PASSWORD, "hunter2")
    }

    #[test]
    fn test_resolve_production() {
        let provider = ConfigurationProvider::new(catalog(), Box::new(secrets()));
        let config = provider.resolve("Production").unwrap();

        assert_eq!(config.deploy_command, "npm run deploy:prod");
        assert_eq!(config.branch, "main");
        assert_eq!(config.tag, "service-production-pipeline");
        assert_eq!(config.source_token.expose(), "ghp_abc");
        let creds = config.registry_credentials().unwrap();
        assert_eq!(creds.username, "acme-bot");
    }

    #[test]
    fn test_missing_github_token() {
        let secrets = StaticSource::new().with_value("Production", DOCKERHUB_USERNAME, "acme-bot");
        let provider = ConfigurationProvider::new(catalog(), Box::new(secrets));

        let err = provider.resolve("Production").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingSecret { ref key, .. } if key == GITHUB_TOKEN
        ));
    }

    #[test]
    fn test_registry_credentials_optional() {
        let secrets = StaticSource::new()
            .with_value("Production", GITHUB_TOKEN, "ghp_abc")
            .with_value("Production", DOCKERHUB_USERNAME, "acme-bot");
        let provider = ConfigurationProvider::new(catalog(), Box::new(secrets));

        let config = provider.resolve("Production").unwrap();
        assert!(config.registry_password.is_none());
        assert!(config.registry_credentials().is_none());
    }

    #[test]
    fn test_unknown_environment() {
        let provider = ConfigurationProvider::new(catalog(), Box::new(secrets()));
        let err = provider.resolve("Staging").unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownEnvironment(_)));
    }

    #[test]
    fn test_profile_from_secret_source() {
        let secrets = StaticSource::new()
            .with_value("Staging", GITHUB_TOKEN, "ghp_abc")
            .with_value("Staging", DEPLOY_COMMAND, "make deploy")
            .with_value("Staging", REPO_OWNER, "acme");
        let provider = ConfigurationProvider::new(ProfileCatalog::new(), Box::new(secrets.clone()));

        // repo name missing
        let err = provider.resolve("Staging").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::EmptyField { ref field, .. } if field == "repo_name"
        ));

        let secrets = secrets.with_value("Staging", REPO_NAME, "service");
        let provider = ConfigurationProvider::new(ProfileCatalog::new(), Box::new(secrets));
        let config = provider.resolve("Staging").unwrap();
        assert_eq!(config.tag, "service-staging-pipeline");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let provider = ConfigurationProvider::new(catalog(), Box::new(secrets()));
        assert_eq!(
            provider.resolve("Production").unwrap(),
            provider.resolve("Production").unwrap()
        );
    }
}

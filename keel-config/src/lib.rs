//! Keel Config
//!
//! Environment configuration provider.
//!
//! Resolves the `EnvironmentConfig` for a named deployment environment from
//! two inputs:
//! - Profiles: non-secret parameters (deploy command, repository, branch, tag)
//! - Secret sources: source token and registry credentials
//!
//! A resolution reads exactly one snapshot from the secret source, so every
//! field of the result comes from the same state of the source.

pub mod profile;
pub mod provider;
pub mod secrets;

pub use profile::{EnvironmentProfile, ProfileCatalog};
pub use provider::ConfigurationProvider;
pub use secrets::{DotenvFileSource, ProcessEnvSource, SecretSnapshot, SecretSource, StaticSource};

//! Secret sources
//!
//! A secret source returns a snapshot of key/value pairs scoped to one
//! environment. Sources are read-only.

use keel_core::error::ConfigurationError;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Token used to fetch source
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
/// Container registry username
pub const DOCKERHUB_USERNAME: &str = "DOCKERHUB_USERNAME";
/// Container registry password
pub const DOCKERHUB_PASSWORD: &str = "DOCKERHUB_PASSWORD";

/// Values read from a secret source at one point in time
#[derive(Debug, Clone, Default)]
pub struct SecretSnapshot {
    values: HashMap<String, String>,
}

impl SecretSnapshot {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Returns a value if present and non-blank
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Read-only source of environment-scoped secrets
pub trait SecretSource: Send + Sync {
    /// Reads every value for `environment` in one pass
    fn snapshot(&self, environment: &str) -> Result<SecretSnapshot, ConfigurationError>;
}

/// Reads `.env.<environment>` files from a directory
///
/// The environment name is lower-cased, so "Production" reads
/// `.env.production`.
#[derive(Debug, Clone)]
pub struct DotenvFileSource {
    dir: PathBuf,
}

impl DotenvFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file for an environment
    pub fn path_for(&self, environment: &str) -> PathBuf {
        self.dir
            .join(format!(".env.{}", environment.to_lowercase()))
    }
}

impl SecretSource for DotenvFileSource {
    fn snapshot(&self, environment: &str) -> Result<SecretSnapshot, ConfigurationError> {
        let path = self.path_for(environment);
        debug!("Reading secrets from {}", path.display());

        let source_error = |e: dotenvy::Error| {
            ConfigurationError::Source(format!("{}: {}", path.display(), e))
        };

        let values = dotenvy::from_path_iter(&path)
            .map_err(source_error)?
            .collect::<Result<HashMap<String, String>, _>>()
            .map_err(source_error)?;

        Ok(SecretSnapshot::new(values))
    }
}

/// Reads the process environment
///
/// A key `KEY` is looked up as `<ENVIRONMENT>_KEY` first (upper-cased
/// environment name) and then as plain `KEY`.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnvSource;

impl SecretSource for ProcessEnvSource {
    fn snapshot(&self, environment: &str) -> Result<SecretSnapshot, ConfigurationError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Ok(scope_vars(vars, environment))
    }
}

/// Applies `<ENVIRONMENT>_` scoping to a set of variables
fn scope_vars(vars: HashMap<String, String>, environment: &str) -> SecretSnapshot {
    let prefix = format!("{}_", environment.to_uppercase());
    let mut values = HashMap::new();

    for (key, value) in &vars {
        if !key.starts_with(&prefix) {
            values.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    // Scoped values win over unscoped ones
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(&prefix) {
            values.insert(stripped.to_string(), value);
        }
    }

    SecretSnapshot::new(values)
}

/// Fixed in-memory values per environment
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    environments: HashMap<String, HashMap<String, String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(
        mut self,
        environment: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.environments
            .entry(environment.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }
}

impl SecretSource for StaticSource {
    fn snapshot(&self, environment: &str) -> Result<SecretSnapshot, ConfigurationError> {
        Ok(SecretSnapshot::new(
            self.environments.get(environment).cloned().unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_env(dir: &std::path::Path, content: &str) -> DotenvFileSource {
        std::fs::write(dir.join(".env.production"), content).unwrap();
        DotenvFileSource::new(dir)
    }

    #[test]
    fn test_dotenv_values() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_env(
            dir.path(),
            r#"
# registry credentials
GITHUB_TOKEN=ghp_abc
export DOCKERHUB_USERNAME=acme-bot
DOCKERHUB_PASSWORD="p@ss # not a comment"
QUOTED="a\"b"
SINGLE='raw\nvalue'
TRAILING=value # comment
EMPTY=
"#,
        );

        let snapshot = source.snapshot("Production").unwrap();
        assert_eq!(snapshot.get(GITHUB_TOKEN), Some("ghp_abc"));
        assert_eq!(snapshot.get(DOCKERHUB_USERNAME), Some("acme-bot"));
        assert_eq!(snapshot.get(DOCKERHUB_PASSWORD), Some("p@ss # not a comment"));
        assert_eq!(snapshot.get("QUOTED"), Some("a\"b"));
        assert_eq!(snapshot.get("SINGLE"), Some("raw\\nvalue"));
        assert_eq!(snapshot.get("TRAILING"), Some("value"));
        assert_eq!(snapshot.get("EMPTY"), None);
    }

    #[test]
    fn test_dotenv_syntax_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_env(dir.path(), "A=1\nnot a pair\n");

        let err = source.snapshot("Production").unwrap_err();
        assert!(matches!(err, ConfigurationError::Source(ref msg) if msg.contains(".env.production")));
    }

    #[test]
    fn test_snapshot_ignores_blank_values() {
        let snapshot = SecretSnapshot::new(HashMap::from([
            ("A".to_string(), "1".to_string()),
            ("B".to_string(), "   ".to_string()),
        ]));
        assert_eq!(snapshot.get("A"), Some("1"));
        assert_eq!(snapshot.get("B"), None);
        assert_eq!(snapshot.get("C"), None);
    }

    #[test]
    fn test_dotenv_file_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env.production"), "GITHUB_TOKEN=ghp_abc\n").unwrap();

        let source = DotenvFileSource::new(dir.path());
        let snapshot = source.snapshot("Production").unwrap();
        assert_eq!(snapshot.get(GITHUB_TOKEN), Some("ghp_abc"));

        let err = source.snapshot("Staging").unwrap_err();
        assert!(matches!(err, ConfigurationError::Source(_)));
    }

    #[test]
    fn test_scoped_vars_win() {
        let vars = HashMap::from([
            ("GITHUB_TOKEN".to_string(), "global".to_string()),
            ("PRODUCTION_GITHUB_TOKEN".to_string(), "scoped".to_string()),
            ("STAGING_GITHUB_TOKEN".to_string(), "other".to_string()),
        ]);

        let snapshot = scope_vars(vars, "Production");
        assert_eq!(snapshot.get(GITHUB_TOKEN), Some("scoped"));
        assert_eq!(snapshot.get("STAGING_GITHUB_TOKEN"), Some("other"));
    }

    #[test]
    fn test_static_source() {
        let source = StaticSource::new().with_value("Production", GITHUB_TOKEN, "t");
        assert_eq!(source.snapshot("Production").unwrap().get(GITHUB_TOKEN), Some("t"));
        assert!(source.snapshot("Staging").unwrap().is_empty());
    }
}

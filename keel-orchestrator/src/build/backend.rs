//! Execution backends
//!
//! An execution backend opens one isolated execution context per build.
//! The context is a shell session rooted at the run's artifact:
//! - `LocalShellBackend`: a local `sh` in the artifact directory
//! - `PodmanBackend`: a container from the build image with the artifact
//!   mounted at `/workspace`, and a shell attached through `podman exec`
//!
//! Contexts are never shared between runs.

use async_trait::async_trait;
use keel_core::domain::build::BuildEnvironment;
use keel_core::error::BuildError;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::build::session::ShellSession;
use crate::run_log::RunLog;

/// What a backend needs to open a context
#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub run_id: Uuid,
    /// Directory holding the fetched source tree
    pub workspace: PathBuf,
    pub environment: BuildEnvironment,
}

/// A live shell for one build
#[async_trait]
pub trait ExecutionContext: Send {
    /// Exports a variable without logging its value
    async fn export(&mut self, name: &str, value: &str) -> Result<(), BuildError>;

    /// Runs a command, streaming its output into `log`; returns the exit code
    async fn run(&mut self, command: &str, log: &RunLog) -> Result<i32, BuildError>;

    /// Reads a variable exported by earlier commands
    async fn read_var(&mut self, name: &str) -> Result<Option<String>, BuildError>;

    /// Ends the context and releases its resources
    async fn close(&mut self);
}

/// Opens execution contexts
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn open(&self, request: &ContextRequest) -> Result<Box<dyn ExecutionContext>, BuildError>;
}

#[async_trait]
impl ExecutionContext for ShellSession {
    async fn export(&mut self, name: &str, value: &str) -> Result<(), BuildError> {
        self.set_var(name, value).await
    }

    async fn run(&mut self, command: &str, log: &RunLog) -> Result<i32, BuildError> {
        self.execute(command, |line| log.info(line)).await
    }

    async fn read_var(&mut self, name: &str) -> Result<Option<String>, BuildError> {
        self.get_var(name).await
    }

    async fn close(&mut self) {
        self.shutdown().await;
    }
}

// =============================================================================
// Local shell
// =============================================================================

/// Runs builds in a local `sh`
///
/// The build image and compute type do not apply; privileged mode is implied.
#[derive(Debug, Clone, Default)]
pub struct LocalShellBackend;

impl LocalShellBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionBackend for LocalShellBackend {
    async fn open(&self, request: &ContextRequest) -> Result<Box<dyn ExecutionContext>, BuildError> {
        debug!(
            "Opening local shell for run {} in {}",
            request.run_id,
            request.workspace.display()
        );
        let session = ShellSession::local(&request.workspace).await?;
        Ok(Box::new(session))
    }
}

// =============================================================================
// Podman
// =============================================================================

/// Runs builds inside a podman container from the build image
#[derive(Debug, Clone, Default)]
pub struct PodmanBackend;

impl PodmanBackend {
    pub fn new() -> Self {
        Self
    }

    /// Checks if podman is installed and available
    pub async fn check_available(&self) -> Result<(), BuildError> {
        let output = Command::new("podman")
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                BuildError::Environment(format!(
                    "failed to execute 'podman --version'. Is podman installed? ({})",
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(BuildError::Environment(
                "podman is not working correctly".to_string(),
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("Podman is available: {}", version.trim());
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for PodmanBackend {
    async fn open(&self, request: &ContextRequest) -> Result<Box<dyn ExecutionContext>, BuildError> {
        self.check_available().await?;

        let container = container_name(request.run_id);
        info!(
            "Creating build container {} from {}",
            container, request.environment.image
        );

        let output = Command::new("podman")
            .args(container_args(&container, request))
            .output()
            .await
            .map_err(|e| BuildError::Environment(format!("failed to execute podman run: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!("podman run stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("podman run stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            let message = format!(
                "failed to start build container from {}: exit_code={}, stderr='{}'",
                request.environment.image,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
            error!("{}", message);
            return Err(BuildError::Environment(message));
        }

        let mut exec = Command::new("podman");
        exec.args(["exec", "-i", "-w", "/workspace", &container, "/bin/sh"]);

        let session = match ShellSession::start(exec).await {
            Ok(session) => session,
            Err(e) => {
                remove_container(&container).await;
                return Err(e);
            }
        };

        Ok(Box::new(PodmanContext {
            container,
            session,
            removed: false,
        }))
    }
}

/// Shell session attached to a build container
///
/// The container is removed on `close`, or on drop if `close` never ran.
struct PodmanContext {
    container: String,
    session: ShellSession,
    removed: bool,
}

#[async_trait]
impl ExecutionContext for PodmanContext {
    async fn export(&mut self, name: &str, value: &str) -> Result<(), BuildError> {
        self.session.set_var(name, value).await
    }

    async fn run(&mut self, command: &str, log: &RunLog) -> Result<i32, BuildError> {
        self.session.execute(command, |line| log.info(line)).await
    }

    async fn read_var(&mut self, name: &str) -> Result<Option<String>, BuildError> {
        self.session.get_var(name).await
    }

    async fn close(&mut self) {
        self.session.shutdown().await;
        remove_container(&self.container).await;
        self.removed = true;
    }
}

impl Drop for PodmanContext {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        warn!("Build container {} was not closed, removing it", self.container);
        let _ = std::process::Command::new("podman")
            .args(["rm", "-f", &self.container])
            .output();
    }
}

fn container_name(run_id: Uuid) -> String {
    format!("keel-build-{}", run_id)
}

/// Arguments for `podman run` of the build container
fn container_args(container: &str, request: &ContextRequest) -> Vec<String> {
    let (cpus, memory_mib) = request.environment.compute_type.limits();

    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        container.to_string(),
        "--label".to_string(),
        format!("keel.run={}", request.run_id),
    ];

    if request.environment.privileged {
        args.push("--privileged".to_string());
    }

    args.extend([
        "--cpus".to_string(),
        cpus.to_string(),
        "--memory".to_string(),
        format!("{}m", memory_mib),
        // Override any image entrypoint
        "--entrypoint".to_string(),
        "/bin/sh".to_string(),
        "-v".to_string(),
        format!("{}:/workspace", request.workspace.display()),
        "-w".to_string(),
        "/workspace".to_string(),
        request.environment.image.clone(),
        "-c".to_string(),
        "sleep infinity".to_string(),
    ]);

    args
}

async fn remove_container(name: &str) {
    let result = Command::new("podman")
        .args(["rm", "-f", name])
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => debug!("Container {} removed", name),
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Failed to remove container {}: {}", name, stderr.trim());
        }
        Err(e) => warn!("Failed to remove container {}: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::domain::build::ComputeType;

    fn request(privileged: bool) -> ContextRequest {
        ContextRequest {
            run_id: Uuid::nil(),
            workspace: PathBuf::from("/tmp/keel/run"),
            environment: BuildEnvironment {
                image: "docker.io/library/node:16".to_string(),
                privileged,
                compute_type: ComputeType::Medium,
            },
        }
    }

    #[test]
    fn test_container_args() {
        let name = container_name(Uuid::nil());
        let args = container_args(&name, &request(true));

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("--name") + 1], name);
        assert!(args.contains(&"--privileged".to_string()));
        assert_eq!(args[pos("-v") + 1], "/tmp/keel/run:/workspace");
        assert_eq!(args[pos("--cpus") + 1], "4");
        assert_eq!(args[pos("--memory") + 1], "7168m");
        assert_eq!(args[args.len() - 3], "docker.io/library/node:16");
        assert_eq!(args.last().unwrap(), "sleep infinity");
    }

    #[test]
    fn test_unprivileged_container() {
        let args = container_args("c", &request(false));
        assert!(!args.contains(&"--privileged".to_string()));
    }

    #[tokio::test]
    async fn test_local_backend_runs_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();

        let mut req = request(false);
        req.workspace = dir.path().to_path_buf();

        let mut context = LocalShellBackend::new().open(&req).await.unwrap();
        let log = RunLog::new(req.run_id);
        assert_eq!(context.run("ls", &log).await.unwrap(), 0);
        assert!(log.contains("package.json"));
        context.close().await;
    }
}

//! Build stage
//!
//! - `session`: a persistent shell that keeps directory and variables
//!   between commands
//! - `backend`: where the shell runs (local process or podman container)
//! - `runner`: walks the four phases and applies each phase's failure policy

pub mod backend;
pub mod runner;
pub mod session;

pub use backend::{ContextRequest, ExecutionBackend, ExecutionContext, LocalShellBackend, PodmanBackend};
pub use runner::{BuildReport, BuildRunner, CommandFailure, PhaseOutcome, PhaseReport};
pub use session::ShellSession;

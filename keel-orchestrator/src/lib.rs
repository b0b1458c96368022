//! Keel Orchestrator
//!
//! The deployment pipeline orchestrator.
//!
//! Architecture:
//! - Definition: builds and validates the fixed [Fetch, Build, (Assess)?] stage list
//! - Trigger: webhook subscriptions and event matching
//! - Fetch: retrieves the source tree into the run's artifact
//! - Build: runs the four build phases in one execution context
//! - Assess: starts the external assessment process (accept, don't await)
//! - Orchestrator: drives each run through its stages
//! - API: HTTP endpoints for webhooks and run inspection
//!
//! Runs are independent: every trigger gets its own run, artifact, workspace
//! and execution context.

pub mod api;
pub mod assess;
pub mod build;
pub mod definition;
pub mod fetch;
pub mod orchestrator;
pub mod run_log;
pub mod store;
pub mod trigger;

pub use orchestrator::Orchestrator;

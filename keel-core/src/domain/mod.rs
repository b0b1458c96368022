//! Core domain types
//!
//! This module contains the core domain structures used across Keel components.
//! These types are shared between the configuration provider (produces
//! `EnvironmentConfig`), the orchestrator (defines and executes pipelines) and
//! the compute provisioner (declares the running service).

pub mod assessment;
pub mod build;
pub mod compute;
pub mod environment;
pub mod log;
pub mod pipeline;
pub mod run;
pub mod trigger;

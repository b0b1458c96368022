//! Keel Core
//!
//! Core types and abstractions for the Keel deployment system.
//!
//! This crate contains:
//! - Domain types: Core business entities (EnvironmentConfig, Stage, PipelineRun, etc.)
//! - DTOs: Data transfer objects for the webhook and run APIs
//! - Errors: The failure taxonomy shared by every component

pub mod domain;
pub mod dto;
pub mod error;

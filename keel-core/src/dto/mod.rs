//! Data Transfer Objects
//!
//! DTOs used on the orchestrator HTTP API: inbound webhook payloads and
//! outbound run summaries.

pub mod run;
pub mod webhook;

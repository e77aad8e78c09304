//! cctdi engine library
//!
//! Adaptive, multi-round conversational assessment of critical-thinking
//! disposition along the seven CCTDI dimensions. Used by the `cctdi` binary
//! and by the integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and observability
pub mod telemetry;

/// LLM provider abstraction layer
pub mod llm;

/// Interview core: director, agents, retry policy, batch runner
pub mod interview;

/// Report sinks
pub mod report;

/// Database persistence module
pub mod db;

/// Virtual subject personas
pub mod personas;

/// Interactive subject at the keyboard
pub mod console;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

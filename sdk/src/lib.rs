//! CCTDI SDK
//!
//! Shared data model and error taxonomy for the assessment engine.
//! This crate is deliberately free of async and I/O dependencies.

/// Error types and handling
pub mod errors;

/// Dimensions, turns, transcripts and reports
pub mod types;

// Re-export commonly used types
pub use errors::{AssessmentError, AssessmentErrorExt};
pub use types::{
    Completeness, Dimension, DimensionResult, Facet, InteractionMode, Report, ScoreLevel,
    Transcript, Turn, TurnOutcome, TurnRecord, DIMENSION_COUNT, MAX_SCORE, MIN_SCORE,
};

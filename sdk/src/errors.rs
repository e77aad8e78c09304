//! Error types and handling
//!
//! This module provides the error taxonomy used throughout the assessment
//! engine. All errors implement the `AssessmentErrorExt` trait which provides
//! user-friendly hints and indicates whether an error is recoverable.
//!
//! # Error Categories
//!
//! - **Input validation**: rejected before any external call is made
//! - **Transient external failure**: retried, then degrades confidence
//! - **Diagnosis / scoring degradation**: absorbed by the director
//! - **Invariant violation**: fatal to the session, partial results kept
//! - **Ambient**: configuration, persistence, persona loading

use crate::types::Report;
use thiserror::Error;

/// Trait for assessment error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait AssessmentErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never contains
    /// provider credentials or raw provider payloads.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are absorbed into confidence flags on a
    /// `DimensionResult`. Non-recoverable errors end the session.
    fn is_recoverable(&self) -> bool;
}

/// Main assessment error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{AssessmentError, AssessmentErrorExt};
///
/// let error = AssessmentError::GenerationExhausted {
///     attempts: 3,
///     last_error: "Timeout".to_string(),
/// };
/// assert!(error.is_recoverable());
///
/// let fatal = AssessmentError::ScoringUnavailable { dimension: 2 };
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum AssessmentError {
    // Input validation errors
    #[error("Invalid subject identifier")]
    InvalidSubject,

    #[error("Unknown dimension: {0}")]
    UnknownDimension(u8),

    // Session sequencing errors
    #[error("All dimensions have already been scored")]
    DimensionExhausted,

    #[error("Dimension requested out of order: expected {expected}, got {requested}")]
    OutOfOrder { expected: u8, requested: u8 },

    #[error("Session incomplete: {completed}/7 dimensions scored")]
    IncompleteSession { completed: usize },

    #[error("Session is closed ({0})")]
    SessionClosed(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Session task aborted: {0}")]
    SessionAborted(String),

    #[error("Session failed: {reason}")]
    SessionFailed {
        reason: String,
        partial: Box<Report>,
    },

    // External generation errors
    #[error("Prompt generation failed: {0}")]
    GenerationFailure(String),

    #[error("Generation exhausted after {attempts} attempts: {last_error}")]
    GenerationExhausted { attempts: u32, last_error: String },

    #[error("Diagnosis unavailable: {0}")]
    DiagnosisUnavailable(String),

    #[error("Scoring unavailable for dimension {dimension}: empty transcript")]
    ScoringUnavailable { dimension: u8 },

    // Ambient errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Persona error: {0}")]
    Persona(String),
}

impl AssessmentError {
    /// Returns the partial report carried by a failed session, if any
    pub fn partial_report(&self) -> Option<&Report> {
        match self {
            Self::SessionFailed { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

impl AssessmentErrorExt for AssessmentError {
    fn user_hint(&self) -> &str {
        match self {
            // Input validation errors
            Self::InvalidSubject => "Provide a non-empty subject identifier",
            Self::UnknownDimension(_) => "Dimensions are numbered 1 to 7",

            // Session sequencing errors
            Self::DimensionExhausted => "All seven dimensions are scored. Finalize the session",
            Self::OutOfOrder { .. } => "Dimensions must be assessed in order",
            Self::IncompleteSession { .. } => "Run the remaining dimensions before finalizing",
            Self::SessionClosed(_) => "Start a new session for this subject",
            Self::Cancelled => "The session was cancelled. A partial report is available",
            Self::SessionFailed { .. } => "The session failed. A partial report is available",
            Self::SessionAborted(_) => "The session stopped unexpectedly. Run this subject again",

            // External generation errors
            Self::GenerationFailure(_) => "Could not shape the next question",
            Self::GenerationExhausted { .. } => {
                "LLM provider kept failing. Check your API keys and network"
            }
            Self::DiagnosisUnavailable(_) => "Sufficiency check unavailable. Interview continues",
            Self::ScoringUnavailable { .. } => "Nothing to score. This is an internal error",

            // Ambient errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Persistence(_) => "Could not write results. Check the data directory",
            Self::Persona(_) => "Check the persona file and directory",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Invariant violations and input validation end the session
            Self::InvalidSubject
            | Self::UnknownDimension(_)
            | Self::DimensionExhausted
            | Self::OutOfOrder { .. }
            | Self::IncompleteSession { .. }
            | Self::SessionClosed(_)
            | Self::SessionFailed { .. }
            | Self::SessionAborted(_)
            | Self::ScoringUnavailable { .. }
            | Self::Config(_) => false,

            // All other errors are absorbed or retried
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_recoverable() {
        let errors = vec![
            AssessmentError::GenerationExhausted {
                attempts: 3,
                last_error: "Timeout".to_string(),
            },
            AssessmentError::DiagnosisUnavailable("bad json".to_string()),
            AssessmentError::GenerationFailure("no facets".to_string()),
            AssessmentError::Persistence("disk full".to_string()),
        ];

        for error in errors {
            assert!(error.is_recoverable(), "{} should be recoverable", error);
        }
    }

    #[test]
    fn test_invariant_violations_are_fatal() {
        assert!(!AssessmentError::ScoringUnavailable { dimension: 1 }.is_recoverable());
        assert!(!AssessmentError::OutOfOrder {
            expected: 2,
            requested: 4
        }
        .is_recoverable());
        assert!(!AssessmentError::InvalidSubject.is_recoverable());
    }

    #[test]
    fn test_hints_do_not_leak_details() {
        let error = AssessmentError::GenerationExhausted {
            attempts: 3,
            last_error: "sk-secret-token rejected".to_string(),
        };
        assert!(!error.user_hint().contains("sk-secret"));
        assert!(error.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_partial_report_only_on_session_failure() {
        let partial = Report::new(
            "s1",
            "U1",
            Vec::new(),
            crate::types::Completeness::Incomplete,
            chrono::Utc::now(),
        );
        let failed = AssessmentError::SessionFailed {
            reason: "empty transcript".to_string(),
            partial: Box::new(partial),
        };
        assert_eq!(failed.partial_report().map(|r| r.subject_id.as_str()), Some("U1"));
        assert!(AssessmentError::Cancelled.partial_report().is_none());
    }
}

//! Assessment session state
//!
//! A session is owned by the caller but only the director mutates it; every
//! mutator here is crate-private.

use chrono::{DateTime, Utc};
use sdk::types::{Completeness, Dimension, DimensionResult, Report, DIMENSION_COUNT};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub subject_id: String,
    pub state: SessionState,
    /// Dimension that the next `run_dimension` call will assess
    pub current_dimension: Option<u8>,
    pub completed_dimensions: Vec<u8>,
    pub total_turns: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Session {
    id: String,
    subject_id: String,
    results: Vec<DimensionResult>,
    current_index: usize,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    state: SessionState,
    total_turns: usize,
    report: Option<Report>,
    cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(subject_id: String, cancel: CancellationToken) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id,
            results: Vec::with_capacity(DIMENSION_COUNT),
            current_index: 0,
            started_at: Utc::now(),
            ended_at: None,
            state: SessionState::Running,
            total_turns: 0,
            report: None,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn results(&self) -> &[DimensionResult] {
        &self.results
    }

    /// Index (0-based) of the next dimension to assess
    pub fn current_dimension_index(&self) -> usize {
        self.current_index
    }

    pub fn current_dimension(&self) -> Option<&'static Dimension> {
        Dimension::all().get(self.current_index)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_index >= DIMENSION_COUNT
    }

    /// Token that cancels this session at its next round boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            subject_id: self.subject_id.clone(),
            state: self.state,
            current_dimension: self.current_dimension().map(|d| d.id),
            completed_dimensions: self.results.iter().map(|r| r.dimension_id).collect(),
            total_turns: self.total_turns,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    pub(crate) fn cached_report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub(crate) fn count_turn(&mut self) {
        self.total_turns += 1;
    }

    pub(crate) fn push_result(&mut self, result: DimensionResult) {
        self.results.push(result);
        self.current_index += 1;
    }

    /// Close the session and build its report. The report is cached so that
    /// closing again returns the same value.
    pub(crate) fn close(&mut self, state: SessionState, completeness: Completeness) -> Report {
        if let Some(report) = &self.report {
            return report.clone();
        }

        self.state = state;
        let report = Report::new(
            self.id.clone(),
            self.subject_id.clone(),
            self.results.clone(),
            completeness,
            self.started_at,
        );
        self.ended_at = Some(report.finished_at);
        self.report = Some(report.clone());
        report
    }
}

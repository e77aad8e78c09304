//! Concurrent batch evaluation
//!
//! Each subject gets its own session on its own task. Sessions share the
//! director (read-only) and its sink, nothing else. At most `workers`
//! sessions are in flight at once.

use super::director::ScenarioDirector;
use sdk::errors::AssessmentError;
use sdk::types::Report;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of one subject's session
#[derive(Debug)]
pub struct BatchOutcome {
    pub subject_id: String,
    pub result: Result<Report, AssessmentError>,
    pub elapsed: Duration,
}

impl BatchOutcome {
    /// The report, complete or partial, if one was produced
    pub fn report(&self) -> Option<&Report> {
        match &self.result {
            Ok(report) => Some(report),
            Err(e) => e.partial_report(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub mean_aggregate: Option<f64>,
    pub max_aggregate: Option<u32>,
    pub min_aggregate: Option<u32>,
}

impl BatchSummary {
    /// Statistics over complete reports only
    pub fn from_outcomes(outcomes: &[BatchOutcome]) -> Self {
        let scores: Vec<u32> = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .filter(|r| r.is_complete())
            .map(|r| r.aggregate_score)
            .collect();

        let mean_aggregate = if scores.is_empty() {
            None
        } else {
            let total: u32 = scores.iter().sum();
            Some((total as f64 / scores.len() as f64 * 10.0).round() / 10.0)
        };

        Self {
            completed: outcomes.len(),
            succeeded: scores.len(),
            failed: outcomes.len() - scores.len(),
            mean_aggregate,
            max_aggregate: scores.iter().copied().max(),
            min_aggregate: scores.iter().copied().min(),
        }
    }
}

pub struct BatchRunner {
    director: Arc<ScenarioDirector>,
    workers: usize,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(director: Arc<ScenarioDirector>, workers: usize) -> Self {
        Self {
            director,
            workers: workers.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels every session of this batch
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one session per subject. Outcomes come back in completion order,
    /// one per subject, including subjects whose task panicked.
    pub async fn run(&self, subject_ids: Vec<String>) -> Vec<BatchOutcome> {
        info!(subjects = subject_ids.len(), workers = self.workers, "Batch started");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut subjects: HashMap<Id, String> = HashMap::new();

        for subject_id in subject_ids {
            let director = Arc::clone(&self.director);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let owner = subject_id.clone();

            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let started = Instant::now();
                let result = director.run_session_linked(&subject_id, &cancel).await;
                BatchOutcome {
                    subject_id,
                    result,
                    elapsed: started.elapsed(),
                }
            });
            subjects.insert(handle.id(), owner);
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    subjects.remove(&id);
                    match &outcome.result {
                        Ok(report) => info!(
                            subject = %outcome.subject_id,
                            aggregate = report.aggregate_score,
                            complete = report.is_complete(),
                            elapsed_ms = outcome.elapsed.as_millis() as u64,
                            "Subject finished"
                        ),
                        Err(e) => warn!(subject = %outcome.subject_id, error = %e, "Subject failed"),
                    }
                    outcomes.push(outcome);
                }
                Err(e) => {
                    let subject_id = subjects.remove(&e.id()).unwrap_or_default();
                    warn!(subject = %subject_id, error = %e, "Session task aborted");
                    outcomes.push(BatchOutcome {
                        subject_id,
                        result: Err(AssessmentError::SessionAborted(e.to_string())),
                        elapsed: Duration::ZERO,
                    });
                }
            }
        }

        info!(finished = outcomes.len(), "Batch finished");
        outcomes
    }
}

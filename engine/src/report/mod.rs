//! Report sinks
//!
//! The director emits one record per turn, one per scored dimension and one
//! final report per session. Sinks may be shared by many concurrent sessions;
//! each append must be atomic and must never be held across a generator call.
//!
//! Sink failures are the caller's to log. They never abort a session.

use async_trait::async_trait;
use sdk::errors::AssessmentError;
use sdk::types::{DimensionResult, Report, TurnRecord};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod jsonl;

pub use jsonl::JsonlSink;

/// A scored dimension as emitted to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRecord {
    pub session_id: String,
    pub subject_id: String,
    #[serde(flatten)]
    pub result: DimensionResult,
}

/// Anything a sink can receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Turn(TurnRecord),
    Dimension(DimensionRecord),
    Report(Report),
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn record_turn(&self, record: &TurnRecord) -> Result<(), AssessmentError>;

    async fn record_dimension(&self, record: &DimensionRecord) -> Result<(), AssessmentError>;

    async fn record_report(&self, report: &Report) -> Result<(), AssessmentError>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl ReportSink for NullSink {
    async fn record_turn(&self, _record: &TurnRecord) -> Result<(), AssessmentError> {
        Ok(())
    }

    async fn record_dimension(&self, _record: &DimensionRecord) -> Result<(), AssessmentError> {
        Ok(())
    }

    async fn record_report(&self, _report: &Report) -> Result<(), AssessmentError> {
        Ok(())
    }
}

/// Keeps every record in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    // Records are pushed whole, so a poisoned lock still holds consistent data
    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, record: Record) -> Result<(), AssessmentError> {
        self.lock().push(record);
        Ok(())
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    pub fn turns(&self) -> Vec<TurnRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Turn(turn) => Some(turn),
                _ => None,
            })
            .collect()
    }

    pub fn dimensions(&self) -> Vec<DimensionRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Dimension(dimension) => Some(dimension),
                _ => None,
            })
            .collect()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Report(report) => Some(report),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn record_turn(&self, record: &TurnRecord) -> Result<(), AssessmentError> {
        self.push(Record::Turn(record.clone()))
    }

    async fn record_dimension(&self, record: &DimensionRecord) -> Result<(), AssessmentError> {
        self.push(Record::Dimension(record.clone()))
    }

    async fn record_report(&self, report: &Report) -> Result<(), AssessmentError> {
        self.push(Record::Report(report.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sdk::types::{Completeness, InteractionMode, Turn, TurnOutcome};
    use std::sync::Arc;

    fn turn_record(round: u32) -> TurnRecord {
        TurnRecord {
            session_id: "s1".to_string(),
            subject_id: "U1".to_string(),
            dimension_id: 1,
            turn: Turn {
                round,
                mode: InteractionMode::Normal,
                question: "q".to_string(),
                answer: "a".to_string(),
                timestamp: Utc::now(),
                outcome: TurnOutcome::Answered,
            },
        }
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.record_turn(&turn_record(1)).await.unwrap();
        sink.record_turn(&turn_record(2)).await.unwrap();
        sink.record_report(&Report::new("s1", "U1", Vec::new(), Completeness::Incomplete, Utc::now()))
            .await
            .unwrap();

        let rounds: Vec<u32> = sink.turns().iter().map(|t| t.turn.round).collect();
        assert_eq!(rounds, vec![1, 2]);
        assert_eq!(sink.reports().len(), 1);
        assert_eq!(sink.records().len(), 3);
    }

    #[tokio::test]
    async fn test_poisoned_memory_sink_keeps_records() {
        let sink = Arc::new(MemorySink::new());
        sink.record_turn(&turn_record(1)).await.unwrap();

        let poisoner = Arc::clone(&sink);
        let crashed = std::thread::spawn(move || {
            let _guard = poisoner.records.lock().unwrap();
            panic!("reader crashed while holding the lock");
        })
        .join();
        assert!(crashed.is_err());
        assert!(sink.records.is_poisoned());

        assert_eq!(sink.records().len(), 1);
        sink.record_turn(&turn_record(2)).await.unwrap();
        let rounds: Vec<u32> = sink.turns().iter().map(|t| t.turn.round).collect();
        assert_eq!(rounds, vec![1, 2]);
    }

    #[test]
    fn test_record_tagging() {
        let json = serde_json::to_value(Record::Turn(turn_record(3))).unwrap();
        assert_eq!(json["type"], "turn");
        assert_eq!(json["round"], 3);
        assert_eq!(json["mode"], "normal");
        assert_eq!(json["subject_id"], "U1");
    }
}

/// Assessment persistence operations
///
/// The repository doubles as the SQLite [`ReportSink`]: turns and dimension
/// results are written as the director emits them, the session row when the
/// report is final. History and replay read the same tables back.
use crate::report::{DimensionRecord, ReportSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sdk::errors::AssessmentError;
use sdk::types::{
    Completeness, DimensionResult, InteractionMode, Report, ScoreLevel, Turn, TurnOutcome,
    TurnRecord,
};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// One line of assessment history
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub subject_id: String,
    pub completeness: Completeness,
    pub aggregate_score: u32,
    pub average_score: f64,
    pub overall_level: Option<ScoreLevel>,
    pub dimensions: u32,
    pub finished_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AssessmentRepository {
    pool: SqlitePool,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", raw))
}

fn parse_completeness(raw: &str) -> Completeness {
    match raw {
        "complete" => Completeness::Complete,
        _ => Completeness::Incomplete,
    }
}

fn persistence(e: anyhow::Error) -> AssessmentError {
    AssessmentError::Persistence(format!("{:#}", e))
}

impl AssessmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_turn(&self, record: &TurnRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO turns (session_id, subject_id, dimension_id, round, mode, question, answer, outcome, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.session_id)
        .bind(&record.subject_id)
        .bind(record.dimension_id as i64)
        .bind(record.turn.round as i64)
        .bind(record.turn.mode.as_str())
        .bind(&record.turn.question)
        .bind(&record.turn.answer)
        .bind(record.turn.outcome.as_str())
        .bind(record.turn.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await
        .context("Failed to insert turn")?;

        Ok(())
    }

    pub async fn upsert_dimension(
        &self,
        session_id: &str,
        subject_id: &str,
        result: &DimensionResult,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::write_dimension(&mut *conn, session_id, subject_id, result).await
    }

    async fn write_dimension(
        conn: &mut sqlx::SqliteConnection,
        session_id: &str,
        subject_id: &str,
        result: &DimensionResult,
    ) -> Result<()> {
        let evidence = serde_json::to_string(&result.evidence).context("Failed to encode evidence")?;

        sqlx::query(
            "INSERT OR REPLACE INTO dimension_results
             (session_id, subject_id, dimension_id, name, score, level, rationale, rounds_used,
              failed_rounds, low_confidence, clamped, evidence, confidence)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(subject_id)
        .bind(result.dimension_id as i64)
        .bind(&result.name)
        .bind(result.score as i64)
        .bind(result.level.as_str())
        .bind(&result.rationale)
        .bind(result.rounds_used as i64)
        .bind(result.failed_rounds as i64)
        .bind(result.low_confidence)
        .bind(result.clamped)
        .bind(evidence)
        .bind(result.confidence)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to store dimension {}", result.dimension_id))?;

        Ok(())
    }

    /// Store the final report and every result it carries in one transaction
    pub async fn save_report(&self, report: &Report) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT OR REPLACE INTO sessions
             (id, subject_id, completeness, aggregate_score, average_score, overall_level, started_at, finished_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&report.session_id)
        .bind(&report.subject_id)
        .bind(report.completeness.as_str())
        .bind(report.aggregate_score as i64)
        .bind(report.average_score)
        .bind(report.overall_level.map(|l| l.as_str()))
        .bind(report.started_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(report.finished_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&mut *tx)
        .await
        .context("Failed to store session")?;

        for result in &report.results {
            Self::write_dimension(&mut *tx, &report.session_id, &report.subject_id, result).await?;
        }

        tx.commit().await.context("Failed to commit report")?;
        Ok(())
    }

    /// Most recent finalized sessions, newest first
    pub async fn recent_sessions(&self, limit: u32) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT s.id, s.subject_id, s.completeness, s.aggregate_score, s.average_score,
                    s.overall_level, s.finished_at,
                    (SELECT COUNT(*) FROM dimension_results d WHERE d.session_id = s.id) AS dimensions
             FROM sessions s
             ORDER BY s.finished_at DESC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch session history")?;

        rows.iter()
            .map(|r| {
                Ok(SessionSummary {
                    session_id: r.get("id"),
                    subject_id: r.get("subject_id"),
                    completeness: parse_completeness(r.get::<&str, _>("completeness")),
                    aggregate_score: r.get::<i64, _>("aggregate_score") as u32,
                    average_score: r.get("average_score"),
                    overall_level: r
                        .get::<Option<String>, _>("overall_level")
                        .and_then(|l| ScoreLevel::parse(&l)),
                    dimensions: r.get::<i64, _>("dimensions") as u32,
                    finished_at: parse_timestamp(r.get::<&str, _>("finished_at"))?,
                })
            })
            .collect()
    }

    fn dimension_from_row(row: &SqliteRow) -> DimensionResult {
        let score = row.get::<i64, _>("score") as u32;
        DimensionResult {
            dimension_id: row.get::<i64, _>("dimension_id") as u8,
            name: row.get("name"),
            score,
            level: ScoreLevel::parse(row.get::<&str, _>("level"))
                .unwrap_or_else(|| ScoreLevel::from_score(score)),
            rationale: row.get("rationale"),
            rounds_used: row.get::<i64, _>("rounds_used") as u32,
            failed_rounds: row.get::<i64, _>("failed_rounds") as u32,
            low_confidence: row.get("low_confidence"),
            clamped: row.get("clamped"),
            evidence: serde_json::from_str(row.get::<&str, _>("evidence")).unwrap_or_default(),
            confidence: row.get("confidence"),
        }
    }

    /// Rebuild a finalized report
    pub async fn load_report(&self, session_id: &str) -> Result<Option<Report>> {
        let Some(session) = sqlx::query(
            "SELECT id, subject_id, completeness, aggregate_score, average_score, overall_level,
                    started_at, finished_at
             FROM sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")?
        else {
            return Ok(None);
        };

        let results = sqlx::query(
            "SELECT dimension_id, name, score, level, rationale, rounds_used, failed_rounds,
                    low_confidence, clamped, evidence, confidence
             FROM dimension_results WHERE session_id = ? ORDER BY dimension_id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch dimension results")?
        .iter()
        .map(Self::dimension_from_row)
        .collect();

        Ok(Some(Report {
            session_id: session.get("id"),
            subject_id: session.get("subject_id"),
            results,
            aggregate_score: session.get::<i64, _>("aggregate_score") as u32,
            average_score: session.get("average_score"),
            overall_level: session
                .get::<Option<String>, _>("overall_level")
                .and_then(|l| ScoreLevel::parse(&l)),
            completeness: parse_completeness(session.get::<&str, _>("completeness")),
            started_at: parse_timestamp(session.get::<&str, _>("started_at"))?,
            finished_at: parse_timestamp(session.get::<&str, _>("finished_at"))?,
        }))
    }

    /// Every recorded turn of a session, in interview order
    pub async fn session_turns(&self, session_id: &str) -> Result<Vec<TurnRecord>> {
        let rows = sqlx::query(
            "SELECT session_id, subject_id, dimension_id, round, mode, question, answer, outcome, created_at
             FROM turns WHERE session_id = ?
             ORDER BY dimension_id ASC, round ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch turns")?;

        rows.iter()
            .map(|r| {
                let mode: String = r.get("mode");
                let outcome: String = r.get("outcome");
                Ok(TurnRecord {
                    session_id: r.get("session_id"),
                    subject_id: r.get("subject_id"),
                    dimension_id: r.get::<i64, _>("dimension_id") as u8,
                    turn: Turn {
                        round: r.get::<i64, _>("round") as u32,
                        mode: InteractionMode::parse(&mode)
                            .with_context(|| format!("Unknown interaction mode: {}", mode))?,
                        question: r.get("question"),
                        answer: r.get("answer"),
                        timestamp: parse_timestamp(r.get::<&str, _>("created_at"))?,
                        outcome: TurnOutcome::parse(&outcome)
                            .with_context(|| format!("Unknown turn outcome: {}", outcome))?,
                    },
                })
            })
            .collect()
    }
}

#[async_trait]
impl ReportSink for AssessmentRepository {
    async fn record_turn(&self, record: &TurnRecord) -> Result<(), AssessmentError> {
        self.insert_turn(record).await.map_err(persistence)
    }

    async fn record_dimension(&self, record: &DimensionRecord) -> Result<(), AssessmentError> {
        self.upsert_dimension(&record.session_id, &record.subject_id, &record.result)
            .await
            .map_err(persistence)
    }

    async fn record_report(&self, report: &Report) -> Result<(), AssessmentError> {
        self.save_report(report).await.map_err(persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    fn result(id: u8, score: u32) -> DimensionResult {
        DimensionResult {
            dimension_id: id,
            name: format!("dimension {}", id),
            score,
            level: ScoreLevel::from_score(score),
            rationale: "steady".to_string(),
            rounds_used: 3,
            failed_rounds: 0,
            low_confidence: false,
            clamped: false,
            evidence: vec!["I compare sources".to_string()],
            confidence: Some(0.5),
        }
    }

    fn turn(round: u32) -> TurnRecord {
        TurnRecord {
            session_id: "s1".to_string(),
            subject_id: "U1".to_string(),
            dimension_id: 1,
            turn: Turn {
                round,
                mode: InteractionMode::Probe,
                question: format!("q{}", round),
                answer: format!("a{}", round),
                timestamp: Utc::now(),
                outcome: TurnOutcome::Answered,
            },
        }
    }

    #[tokio::test]
    async fn test_report_survives_storage() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("cctdi.db")).await.unwrap();
        let repo = db.assessments();

        let results = (1..=7).map(|id| result(id, 40 + id as u32)).collect();
        let report = Report::new("s1", "U1", results, Completeness::Complete, Utc::now());
        repo.record_report(&report).await.unwrap();

        let loaded = repo.load_report("s1").await.unwrap().unwrap();
        assert_eq!(loaded.results.len(), 7);
        assert_eq!(loaded.aggregate_score, report.aggregate_score);
        assert_eq!(loaded.overall_level, report.overall_level);
        assert_eq!(loaded.results[6].evidence, vec!["I compare sources".to_string()]);
        assert!(loaded.is_complete());

        assert!(repo.load_report("missing").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_turns_come_back_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("cctdi.db")).await.unwrap();
        let repo = db.assessments();

        repo.record_turn(&turn(2)).await.unwrap();
        repo.record_turn(&turn(1)).await.unwrap();

        let turns = repo.session_turns("s1").await.unwrap();
        let rounds: Vec<u32> = turns.iter().map(|t| t.turn.round).collect();
        assert_eq!(rounds, vec![1, 2]);
        assert_eq!(turns[0].turn.mode, InteractionMode::Probe);

        // the same round twice is a sink failure, not a panic
        assert!(repo.record_turn(&turn(1)).await.is_err());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("cctdi.db")).await.unwrap();
        let repo = db.assessments();

        let mut older = Report::new("old", "U1", vec![result(1, 30)], Completeness::Incomplete, Utc::now());
        older.finished_at = Utc::now() - chrono::Duration::hours(1);
        repo.save_report(&older).await.unwrap();

        let newer = Report::new("new", "U2", vec![result(1, 50)], Completeness::Incomplete, Utc::now());
        repo.save_report(&newer).await.unwrap();

        let history = repo.recent_sessions(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].session_id, "new");
        assert_eq!(history[0].dimensions, 1);
        assert!(history[1].overall_level.is_none());

        assert_eq!(repo.recent_sessions(1).await.unwrap().len(), 1);
        db.close().await.unwrap();
    }
}

//! Scenario director
//!
//! Top-level interview controller. The director is the only component that
//! mutates a [`Session`]; the navigator, diagnostic and scoring engine only
//! see the explicit inputs handed to them.
//!
//! Per dimension the loop is:
//!
//! 1. Stop at the round ceiling
//! 2. Ask the diagnostic for a verdict (an empty transcript is insufficient)
//! 3. Stop if sufficient and at or past the round floor
//! 4. Otherwise shape a question, have it worded, have it answered, record the turn
//! 5. After the loop, score the transcript and advance the session
//!
//! Cancellation is observed at round boundaries only.

use super::diagnostic::{DiagnosticAgent, HeuristicDiagnostic, LlmDiagnostic, Sufficiency};
use super::generator::{AnswerGenerator, AskRequest, Role};
use super::navigator::NavigatorAgent;
use super::retry::RetryPolicy;
use super::scoring::ScoringEngine;
use super::session::{Session, SessionState, SessionStatus};
use crate::config::{DiagnosticStrategy, InterviewConfig};
use crate::report::{DimensionRecord, ReportSink};
use sdk::errors::AssessmentError;
use sdk::types::{
    Completeness, Dimension, DimensionResult, InteractionMode, Report, Transcript, TurnOutcome,
    TurnRecord, DIMENSION_COUNT,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Turns of context handed to the generator with each request
const HISTORY_TURNS: usize = 2;

pub struct ScenarioDirector {
    navigator: NavigatorAgent,
    diagnostic: Arc<dyn DiagnosticAgent>,
    scoring: ScoringEngine,
    generator: Arc<dyn AnswerGenerator>,
    retry: RetryPolicy,
    sink: Arc<dyn ReportSink>,
    min_rounds: usize,
    max_rounds: usize,
}

impl ScenarioDirector {
    pub fn new(
        generator: Arc<dyn AnswerGenerator>,
        diagnostic: Arc<dyn DiagnosticAgent>,
        sink: Arc<dyn ReportSink>,
        settings: &InterviewConfig,
    ) -> Self {
        Self {
            navigator: NavigatorAgent::new(),
            diagnostic,
            scoring: ScoringEngine::new(Arc::clone(&generator), settings),
            generator,
            retry: RetryPolicy::from_config(settings),
            sink,
            min_rounds: settings.min_rounds as usize,
            max_rounds: settings.max_rounds as usize,
        }
    }

    /// Build a director with the diagnostic strategy named in `settings`
    pub fn from_config(
        settings: &InterviewConfig,
        generator: Arc<dyn AnswerGenerator>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        let diagnostic: Arc<dyn DiagnosticAgent> = match settings.diagnostic {
            DiagnosticStrategy::Heuristic => Arc::new(HeuristicDiagnostic::from_config(settings)),
            DiagnosticStrategy::Llm => Arc::new(LlmDiagnostic::new(Arc::clone(&generator), settings)),
        };
        Self::new(generator, diagnostic, sink, settings)
    }

    /// Open a session for `subject_id`
    pub fn start_session(&self, subject_id: &str) -> Result<Session, AssessmentError> {
        self.open(subject_id, CancellationToken::new())
    }

    /// Open a session that is cancelled together with `parent`
    pub fn start_session_linked(
        &self,
        subject_id: &str,
        parent: &CancellationToken,
    ) -> Result<Session, AssessmentError> {
        self.open(subject_id, parent.child_token())
    }

    fn open(&self, subject_id: &str, token: CancellationToken) -> Result<Session, AssessmentError> {
        let subject_id = subject_id.trim();
        if subject_id.is_empty() {
            return Err(AssessmentError::InvalidSubject);
        }

        let session = Session::new(subject_id.to_string(), token);
        info!(subject = subject_id, session_id = session.id(), "Session started");
        Ok(session)
    }

    pub fn status(&self, session: &Session) -> SessionStatus {
        session.status()
    }

    /// Interview and score the dimension at the session's current index
    pub async fn run_dimension(&self, session: &mut Session) -> Result<DimensionResult, AssessmentError> {
        if session.state() != SessionState::Running {
            return Err(AssessmentError::SessionClosed(session.state().as_str().to_string()));
        }
        let dimension = session
            .current_dimension()
            .ok_or(AssessmentError::DimensionExhausted)?;
        if session.is_cancelled() {
            return Err(AssessmentError::Cancelled);
        }

        let span = info_span!("dimension", subject = %session.subject_id(), dimension = dimension.id);
        self.interview_dimension(session, dimension).instrument(span).await
    }

    /// Like [`run_dimension`](Self::run_dimension), but checks that
    /// `dimension_id` is the one due next
    pub async fn run_dimension_at(
        &self,
        session: &mut Session,
        dimension_id: u8,
    ) -> Result<DimensionResult, AssessmentError> {
        Dimension::by_id(dimension_id)?;

        let expected = session
            .current_dimension()
            .map(|d| d.id)
            .ok_or(AssessmentError::DimensionExhausted)?;
        if dimension_id != expected {
            return Err(AssessmentError::OutOfOrder {
                expected,
                requested: dimension_id,
            });
        }

        self.run_dimension(session).await
    }

    async fn interview_dimension(
        &self,
        session: &mut Session,
        dimension: &'static Dimension,
    ) -> Result<DimensionResult, AssessmentError> {
        let mut transcript = Transcript::new();
        let mut stopped_early = false;

        loop {
            if session.is_cancelled() {
                info!(rounds = transcript.len(), "Cancelled at round boundary");
                return Err(AssessmentError::Cancelled);
            }

            let rounds = transcript.len();
            if rounds >= self.max_rounds {
                debug!(rounds, "Round ceiling reached");
                break;
            }

            let verdict = self.diagnose(&transcript, dimension).await;
            debug!(
                rounds,
                sufficient = verdict.sufficient,
                mode = %verdict.recommended_mode,
                reason = %verdict.reason,
                "Diagnostic verdict"
            );

            if verdict.sufficient {
                if rounds >= self.min_rounds {
                    break;
                }
                if transcript.last().is_some_and(|t| !t.is_answered()) {
                    warn!(rounds, "Generator exhausted below the round floor, stopping early");
                    stopped_early = true;
                    break;
                }
            }

            self.run_round(session, &mut transcript, dimension, verdict.recommended_mode)
                .await?;
        }

        let mut result = self.scoring.score(&transcript, dimension).await?;
        result.low_confidence |= stopped_early;

        info!(
            score = result.score,
            level = result.level.as_str(),
            rounds = result.rounds_used,
            failed_rounds = result.failed_rounds,
            low_confidence = result.low_confidence,
            "Dimension scored"
        );

        session.push_result(result.clone());

        let record = DimensionRecord {
            session_id: session.id().to_string(),
            subject_id: session.subject_id().to_string(),
            result: result.clone(),
        };
        if let Err(e) = self.sink.record_dimension(&record).await {
            warn!(error = %e, "Failed to record dimension result");
        }

        Ok(result)
    }

    async fn diagnose(&self, transcript: &Transcript, dimension: &Dimension) -> Sufficiency {
        if transcript.is_empty() {
            return Sufficiency::insufficient(InteractionMode::Normal, "no rounds yet");
        }

        match self.diagnostic.assess_sufficiency(transcript, dimension).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "Diagnosis unavailable, continuing");
                Sufficiency::insufficient(InteractionMode::Normal, "diagnosis unavailable")
            }
        }
    }

    async fn run_round(
        &self,
        session: &mut Session,
        transcript: &mut Transcript,
        dimension: &'static Dimension,
        mode: InteractionMode,
    ) -> Result<(), AssessmentError> {
        let round = transcript.next_round();
        let prior_answer = transcript.last().map(|t| t.answer.as_str());

        let shape = match self.navigator.next_prompt_shape(mode, prior_answer, dimension, round) {
            Ok(shape) => shape,
            Err(e) => {
                warn!(round, mode = %mode, error = %e, "Falling back to a normal prompt shape");
                self.navigator
                    .next_prompt_shape(InteractionMode::Normal, prior_answer, dimension, round)?
            }
        };

        let subject_id = session.subject_id().to_string();
        let interviewer = AskRequest {
            role: Role::Interviewer,
            subject_id: &subject_id,
            dimension,
            shape: &shape,
            question: None,
            history: transcript.recent(HISTORY_TURNS),
        };

        let question = match self
            .retry
            .run("question", |_| self.generator.ask(&interviewer))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => shape.fallback_question(dimension),
            Err(e) => {
                warn!(round, error = %e, "Using template question");
                shape.fallback_question(dimension)
            }
        };

        let subject = AskRequest {
            role: Role::Subject,
            question: Some(&question),
            ..interviewer
        };

        let (answer, outcome) = match self
            .retry
            .run("answer", |_| self.generator.ask(&subject))
            .await
        {
            Ok(text) => (text.trim().to_string(), TurnOutcome::Answered),
            Err(e) => {
                warn!(round, error = %e, "No answer for this round");
                (String::new(), TurnOutcome::GenerationExhausted)
            }
        };

        let turn = transcript.record(shape.mode, question, answer, outcome).clone();
        session.count_turn();
        debug!(round, mode = %turn.mode, outcome = turn.outcome.as_str(), "Round recorded");

        let record = TurnRecord {
            session_id: session.id().to_string(),
            subject_id,
            dimension_id: dimension.id,
            turn,
        };
        if let Err(e) = self.sink.record_turn(&record).await {
            warn!(round, error = %e, "Failed to record turn");
        }

        Ok(())
    }

    /// Build the final report. Requires all seven dimensions; calling it again
    /// returns the same report without touching any agent. A session already
    /// closed as cancelled or failed never finalizes.
    pub async fn finalize_session(&self, session: &mut Session) -> Result<Report, AssessmentError> {
        if let Some(report) = session.cached_report().filter(|r| r.is_complete()) {
            return Ok(report.clone());
        }
        if session.results().len() < DIMENSION_COUNT {
            return Err(AssessmentError::IncompleteSession {
                completed: session.results().len(),
            });
        }
        if session.state() != SessionState::Running {
            return Err(AssessmentError::SessionClosed(session.state().as_str().to_string()));
        }

        let report = session.close(SessionState::Completed, Completeness::Complete);
        info!(
            subject = %report.subject_id,
            aggregate = report.aggregate_score,
            level = report.overall_level.map(|l| l.as_str()).unwrap_or("-"),
            "Session complete"
        );
        self.emit_report(&report).await;
        Ok(report)
    }

    /// Cancel the session and return its partial report
    pub async fn cancel_session(&self, session: &mut Session) -> Report {
        session.cancellation_token().cancel();
        if let Some(report) = session.cached_report() {
            return report.clone();
        }

        let report = session.close(SessionState::Cancelled, Completeness::Incomplete);
        info!(
            subject = %report.subject_id,
            completed = report.results.len(),
            "Session cancelled"
        );
        self.emit_report(&report).await;
        report
    }

    async fn fail_session(&self, session: &mut Session, cause: AssessmentError) -> AssessmentError {
        let fresh = session.cached_report().is_none();
        let partial = session.close(SessionState::Failed, Completeness::Incomplete);
        error!(
            subject = %partial.subject_id,
            completed = partial.results.len(),
            error = %cause,
            "Session failed"
        );
        if fresh {
            self.emit_report(&partial).await;
        }

        AssessmentError::SessionFailed {
            reason: cause.to_string(),
            partial: Box::new(partial),
        }
    }

    async fn emit_report(&self, report: &Report) {
        if let Err(e) = self.sink.record_report(report).await {
            warn!(error = %e, "Failed to record report");
        }
    }

    /// Run every remaining dimension and finalize.
    ///
    /// Cancellation yields the partial report; any other failure marks the
    /// session failed and surfaces `SessionFailed` carrying the partial report.
    pub async fn run_to_completion(&self, session: &mut Session) -> Result<Report, AssessmentError> {
        let span = info_span!("session", subject = %session.subject_id(), session_id = %session.id());

        async move {
            while !session.is_exhausted() {
                match self.run_dimension(session).await {
                    Ok(_) => {}
                    Err(AssessmentError::Cancelled) => return Ok(self.cancel_session(session).await),
                    Err(e) => return Err(self.fail_session(session, e).await),
                }
            }
            self.finalize_session(session).await
        }
        .instrument(span)
        .await
    }

    /// Start, run and finalize a session for `subject_id`
    pub async fn run_session(&self, subject_id: &str) -> Result<Report, AssessmentError> {
        let mut session = self.start_session(subject_id)?;
        self.run_to_completion(&mut session).await
    }

    /// As [`run_session`](Self::run_session), cancelled together with `parent`
    pub async fn run_session_linked(
        &self,
        subject_id: &str,
        parent: &CancellationToken,
    ) -> Result<Report, AssessmentError> {
        let mut session = self.start_session_linked(subject_id, parent)?;
        self.run_to_completion(&mut session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::generator::JudgeRequest;
    use crate::llm::LLMError;
    use crate::report::NullSink;
    use async_trait::async_trait;

    struct Scripted;

    #[async_trait]
    impl AnswerGenerator for Scripted {
        async fn ask(&self, request: &AskRequest<'_>) -> Result<String, LLMError> {
            Ok(match request.role {
                Role::Interviewer => format!("Question {}?", request.shape.round),
                Role::Subject => "I weigh the evidence and look for sources before deciding.".to_string(),
            })
        }

        async fn judge(&self, _request: &JudgeRequest<'_>) -> Result<String, LLMError> {
            Ok(r#"{"score": 45, "reasoning": "consistent"}"#.to_string())
        }
    }

    fn director() -> ScenarioDirector {
        ScenarioDirector::from_config(&InterviewConfig::default(), Arc::new(Scripted), Arc::new(NullSink))
    }

    #[test]
    fn test_blank_subject_is_rejected() {
        let director = director();
        assert!(matches!(director.start_session(""), Err(AssessmentError::InvalidSubject)));
        assert!(matches!(director.start_session("   "), Err(AssessmentError::InvalidSubject)));
        assert_eq!(director.start_session(" U7 ").unwrap().subject_id(), "U7");
    }

    #[tokio::test]
    async fn test_out_of_order_dimension_is_rejected() {
        let director = director();
        let mut session = director.start_session("U1").unwrap();

        let err = director.run_dimension_at(&mut session, 3).await.unwrap_err();
        assert!(matches!(err, AssessmentError::OutOfOrder { expected: 1, requested: 3 }));

        let err = director.run_dimension_at(&mut session, 9).await.unwrap_err();
        assert!(matches!(err, AssessmentError::UnknownDimension(9)));

        assert!(session.results().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_requires_every_dimension() {
        let director = director();
        let mut session = director.start_session("U1").unwrap();
        director.run_dimension(&mut session).await.unwrap();

        let err = director.finalize_session(&mut session).await.unwrap_err();
        assert!(matches!(err, AssessmentError::IncompleteSession { completed: 1 }));
    }

    #[tokio::test]
    async fn test_cancelled_session_does_not_finalize() {
        let director = director();
        let mut session = director.start_session("U1").unwrap();
        director.run_dimension(&mut session).await.unwrap();

        let partial = director.cancel_session(&mut session).await;
        assert_eq!(partial.results.len(), 1);

        let err = director.finalize_session(&mut session).await.unwrap_err();
        assert!(matches!(err, AssessmentError::IncompleteSession { completed: 1 }));
    }

    #[tokio::test]
    async fn test_session_cancelled_after_last_dimension_does_not_finalize() {
        let director = director();
        let mut session = director.start_session("U1").unwrap();
        while !session.is_exhausted() {
            director.run_dimension(&mut session).await.unwrap();
        }

        let partial = director.cancel_session(&mut session).await;
        assert!(!partial.is_complete());

        let err = director.finalize_session(&mut session).await.unwrap_err();
        assert!(matches!(err, AssessmentError::SessionClosed(_)));
    }

    #[tokio::test]
    async fn test_heuristic_run_stays_within_round_bounds() {
        let director = director();
        let report = director.run_session("U1").await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.results.len(), DIMENSION_COUNT);
        for result in &report.results {
            assert!((3..=5).contains(&result.rounds_used));
            assert_eq!(result.score, 45);
        }
    }

    #[tokio::test]
    async fn test_closed_session_rejects_more_work() {
        let director = director();
        let mut session = director.start_session("U1").unwrap();
        let partial = director.cancel_session(&mut session).await;
        assert!(!partial.is_complete());

        let err = director.run_dimension(&mut session).await.unwrap_err();
        assert!(matches!(err, AssessmentError::SessionClosed(_)));
    }
}

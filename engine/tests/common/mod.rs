//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use cctdi_engine::interview::{
    AnswerGenerator, AskRequest, DiagnosticAgent, JudgeRequest, JudgmentKind, Role, Sufficiency,
};
use cctdi_engine::llm::LLMError;
use sdk::errors::AssessmentError;
use sdk::types::{Dimension, InteractionMode, Transcript};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Score the scripted judge gives each dimension
pub fn scripted_score(dimension_id: u8) -> u32 {
    30 + dimension_id as u32 * 3
}

/// Answer of exactly `len` characters that names its subject
pub fn scripted_answer(subject_id: &str, len: usize) -> String {
    let mut answer = format!("[{}] I check the facts", subject_id);
    while answer.chars().count() < len {
        answer.push('.');
    }
    answer.chars().take(len).collect()
}

pub struct ScriptedGenerator {
    answer_len: usize,
    /// Every subject attempt fails on this round
    fail_round: Option<u32>,
    judge_score: Option<i64>,
    pub asks: AtomicUsize,
    pub judges: AtomicUsize,
    pub failed_attempts: AtomicUsize,
    pub interviewer_subjects: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(answer_len: usize) -> Self {
        Self {
            answer_len,
            fail_round: None,
            judge_score: None,
            asks: AtomicUsize::new(0),
            judges: AtomicUsize::new(0),
            failed_attempts: AtomicUsize::new(0),
            interviewer_subjects: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on_round(mut self, round: u32) -> Self {
        self.fail_round = Some(round);
        self
    }

    /// Judge every dimension with this raw score
    pub fn judging(mut self, score: i64) -> Self {
        self.judge_score = Some(score);
        self
    }

    pub fn calls(&self) -> (usize, usize) {
        (self.asks.load(Ordering::SeqCst), self.judges.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    async fn ask(&self, request: &AskRequest<'_>) -> Result<String, LLMError> {
        self.asks.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        match request.role {
            Role::Interviewer => {
                self.interviewer_subjects
                    .lock()
                    .unwrap()
                    .push(request.subject_id.to_string());
                Ok(format!(
                    "Round {} on {} for {}?",
                    request.shape.round, request.shape.focus, request.subject_id
                ))
            }
            Role::Subject => {
                if self.fail_round == Some(request.shape.round) {
                    self.failed_attempts.fetch_add(1, Ordering::SeqCst);
                    return Err(LLMError::Timeout);
                }
                Ok(scripted_answer(request.subject_id, self.answer_len))
            }
        }
    }

    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<String, LLMError> {
        self.judges.fetch_add(1, Ordering::SeqCst);
        match request.kind {
            JudgmentKind::Score => {
                let score = self
                    .judge_score
                    .unwrap_or(scripted_score(request.dimension.id) as i64);
                Ok(format!(r#"{{"score": {}, "reasoning": "scripted"}}"#, score))
            }
            JudgmentKind::Sufficiency => Ok(r#"{"sufficient": false}"#.to_string()),
        }
    }
}

/// Sufficient once the transcript has `rounds` turns; `0` never, `1` always
pub struct ScriptedDiagnostic {
    rounds: Option<usize>,
    unavailable: bool,
    pub calls: AtomicUsize,
}

impl ScriptedDiagnostic {
    pub fn never() -> Self {
        Self {
            rounds: None,
            unavailable: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always() -> Self {
        Self::at(1)
    }

    pub fn at(rounds: usize) -> Self {
        Self {
            rounds: Some(rounds),
            unavailable: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            rounds: None,
            unavailable: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiagnosticAgent for ScriptedDiagnostic {
    async fn assess_sufficiency(
        &self,
        transcript: &Transcript,
        _dimension: &Dimension,
    ) -> Result<Sufficiency, AssessmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(AssessmentError::DiagnosisUnavailable("judge offline".to_string()));
        }

        Ok(match self.rounds {
            Some(rounds) if transcript.len() >= rounds => {
                Sufficiency::sufficient(InteractionMode::Normal, "scripted")
            }
            _ => Sufficiency::insufficient(InteractionMode::Normal, "scripted"),
        })
    }
}

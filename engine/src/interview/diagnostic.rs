//! Diagnostic agent
//!
//! Decides whether the active dimension has enough evidence to be scored and
//! which mode the next round should use. Strategies are pluggable behind
//! [`DiagnosticAgent`]; the director only relies on the contract:
//!
//! - an empty transcript is never sufficient
//! - once sufficient at or past the round floor, a longer transcript with the
//!   same prefix stays sufficient

use super::generator::{AnswerGenerator, JudgeRequest, JudgmentKind};
use super::navigator::ModePolicy;
use super::retry::RetryPolicy;
use crate::config::InterviewConfig;
use crate::llm::extract_json_object;
use async_trait::async_trait;
use sdk::errors::AssessmentError;
use sdk::types::{Dimension, InteractionMode, Transcript};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

/// Verdict of a sufficiency check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sufficiency {
    pub sufficient: bool,
    pub recommended_mode: InteractionMode,
    pub reason: String,
    pub confidence: Option<f64>,
}

impl Sufficiency {
    pub fn sufficient(mode: InteractionMode, reason: impl Into<String>) -> Self {
        Self {
            sufficient: true,
            recommended_mode: mode,
            reason: reason.into(),
            confidence: None,
        }
    }

    pub fn insufficient(mode: InteractionMode, reason: impl Into<String>) -> Self {
        Self {
            sufficient: false,
            recommended_mode: mode,
            reason: reason.into(),
            confidence: None,
        }
    }
}

#[async_trait]
pub trait DiagnosticAgent: Send + Sync {
    /// Judge the transcript of `dimension` gathered so far.
    ///
    /// Fails with `DiagnosisUnavailable` when the judgment itself could not be
    /// made; the director then continues as if the verdict were insufficient.
    async fn assess_sufficiency(
        &self,
        transcript: &Transcript,
        dimension: &Dimension,
    ) -> Result<Sufficiency, AssessmentError>;
}

/// Rule-based sufficiency over round count, facet coverage and answer volume
///
/// Every input only grows as the transcript grows, so the verdict is monotone.
#[derive(Debug, Clone)]
pub struct HeuristicDiagnostic {
    policy: ModePolicy,
    min_rounds: usize,
    max_rounds: usize,
    required_facets: usize,
    evidence_chars: usize,
}

impl HeuristicDiagnostic {
    pub fn from_config(config: &InterviewConfig) -> Self {
        Self {
            policy: ModePolicy::from_config(config),
            min_rounds: config.min_rounds as usize,
            max_rounds: config.max_rounds as usize,
            required_facets: config.required_facets,
            evidence_chars: config.evidence_chars,
        }
    }

    fn judge(&self, transcript: &Transcript, dimension: &Dimension) -> Sufficiency {
        let mode = self.policy.choose(transcript.last());
        let answered = transcript.answered_count();
        if answered == 0 {
            return Sufficiency::insufficient(mode, "no answers yet");
        }

        let covered = dimension.facets_covered(transcript.answered().map(|t| t.answer.as_str()));
        let chars = transcript.answer_chars();
        let reason = format!(
            "{} answered, {}/{} facets covered, {} chars",
            answered,
            covered,
            dimension.facets.len(),
            chars
        );

        let enough_evidence = covered >= self.required_facets || chars >= self.evidence_chars;
        if (answered >= self.min_rounds && enough_evidence) || answered >= self.max_rounds {
            Sufficiency::sufficient(mode, reason)
        } else {
            Sufficiency::insufficient(mode, reason)
        }
    }
}

#[async_trait]
impl DiagnosticAgent for HeuristicDiagnostic {
    async fn assess_sufficiency(
        &self,
        transcript: &Transcript,
        dimension: &Dimension,
    ) -> Result<Sufficiency, AssessmentError> {
        Ok(self.judge(transcript, dimension))
    }
}

/// Remembered sufficient prefixes before the memo is reset
const MAX_REMEMBERED_PREFIXES: usize = 4096;

/// Sufficiency judged by the answer generator
///
/// The judge itself is not monotone, so a prefix it once found sufficient at
/// or past the round floor is remembered and every extension of that prefix
/// is reported sufficient without asking again.
pub struct LlmDiagnostic {
    generator: Arc<dyn AnswerGenerator>,
    retry: RetryPolicy,
    policy: ModePolicy,
    min_rounds: usize,
    sufficient_prefixes: Mutex<HashSet<u64>>,
}

/// Fingerprint of every prefix of `transcript`: entry `k` covers turns `0..=k`
fn prefix_fingerprints(transcript: &Transcript, dimension: &Dimension) -> Vec<u64> {
    let mut hasher = DefaultHasher::new();
    dimension.id.hash(&mut hasher);
    transcript
        .turns()
        .iter()
        .map(|turn| {
            turn.question.hash(&mut hasher);
            turn.answer.hash(&mut hasher);
            turn.outcome.as_str().hash(&mut hasher);
            hasher.finish()
        })
        .collect()
}

impl LlmDiagnostic {
    pub fn new(generator: Arc<dyn AnswerGenerator>, config: &InterviewConfig) -> Self {
        Self {
            generator,
            retry: RetryPolicy::from_config(config),
            policy: ModePolicy::from_config(config),
            min_rounds: config.min_rounds as usize,
            sufficient_prefixes: Mutex::new(HashSet::new()),
        }
    }

    fn remembered(&self, fingerprints: &[u64]) -> bool {
        let prefixes = self
            .sufficient_prefixes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fingerprints.iter().any(|f| prefixes.contains(f))
    }

    fn remember(&self, fingerprint: u64) {
        let mut prefixes = self
            .sufficient_prefixes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if prefixes.len() >= MAX_REMEMBERED_PREFIXES {
            prefixes.clear();
        }
        prefixes.insert(fingerprint);
    }

    fn instruction(dimension: &Dimension) -> String {
        let facets: Vec<&str> = dimension.facets.iter().map(|f| f.name).collect();
        format!(
            "Decide whether the conversation above gives enough evidence to rate the subject on \
             {} ({}). Expected facets: {}. Reply with JSON only: \
             {{\"sufficient\": true|false, \"reason\": \"...\", \"confidence\": 0.0-1.0, \
             \"recommendation\": \"encourage\"|\"normal\"|\"probe\", \
             \"key_insights\": [\"...\"], \"missing_aspects\": [\"...\"]}}",
            dimension.name,
            dimension.description,
            facets.join(", ")
        )
    }

    fn parse(&self, raw: &str, transcript: &Transcript) -> Result<Sufficiency, AssessmentError> {
        let json = extract_json_object(raw).ok_or_else(|| {
            AssessmentError::DiagnosisUnavailable("judgment is not a JSON object".to_string())
        })?;

        let sufficient = json
            .get("sufficient")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| {
                AssessmentError::DiagnosisUnavailable("judgment has no `sufficient` flag".to_string())
            })?;

        let recommended_mode = json
            .get("recommendation")
            .and_then(|v| v.as_str())
            .and_then(InteractionMode::parse)
            .unwrap_or_else(|| self.policy.choose(transcript.last()));

        let mut reason = json
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if let Some(missing) = json.get("missing_aspects").and_then(|v| v.as_array()) {
            let missing: Vec<&str> = missing.iter().filter_map(|m| m.as_str()).collect();
            if !missing.is_empty() {
                reason.push_str(&format!(" (missing: {})", missing.join(", ")));
            }
        }

        Ok(Sufficiency {
            sufficient,
            recommended_mode,
            reason,
            confidence: json
                .get("confidence")
                .and_then(|v| v.as_f64())
                .map(|c| c.clamp(0.0, 1.0)),
        })
    }
}

#[async_trait]
impl DiagnosticAgent for LlmDiagnostic {
    async fn assess_sufficiency(
        &self,
        transcript: &Transcript,
        dimension: &Dimension,
    ) -> Result<Sufficiency, AssessmentError> {
        // Below the floor the answer is known without asking
        if transcript.answered_count() < self.min_rounds {
            return Ok(Sufficiency::insufficient(
                self.policy.choose(transcript.last()),
                "below the round floor",
            ));
        }

        let fingerprints = prefix_fingerprints(transcript, dimension);
        if self.remembered(&fingerprints) {
            return Ok(Sufficiency::sufficient(
                self.policy.choose(transcript.last()),
                "an earlier prefix was already sufficient",
            ));
        }

        let instruction = Self::instruction(dimension);
        let request = JudgeRequest {
            kind: JudgmentKind::Sufficiency,
            dimension,
            transcript,
            question: &instruction,
        };

        let raw = self
            .retry
            .run("diagnose", |_| self.generator.judge(&request))
            .await
            .map_err(|e| AssessmentError::DiagnosisUnavailable(e.to_string()))?;

        let verdict = self.parse(&raw, transcript)?;
        if verdict.sufficient {
            if let Some(last) = fingerprints.last() {
                self.remember(*last);
            }
        }
        Ok(verdict)
    }
}

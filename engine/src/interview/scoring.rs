//! Scoring engine
//!
//! Maps a finished transcript to a score in [10,60]. Malformed or out-of-range
//! judgments never fail a dimension. Out-of-range scores are clamped to the
//! nearest bound, malformed ones to the configured fallback score, and both
//! are flagged `clamped` with a note in the rationale.

use super::generator::{AnswerGenerator, JudgeRequest, JudgmentKind};
use super::retry::RetryPolicy;
use crate::config::InterviewConfig;
use crate::llm::extract_json_object;
use sdk::errors::AssessmentError;
use sdk::types::{Dimension, DimensionResult, ScoreLevel, Transcript, MAX_SCORE, MIN_SCORE};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ScoringEngine {
    generator: Arc<dyn AnswerGenerator>,
    retry: RetryPolicy,
    fallback_score: u32,
}

/// Judge output after validation
struct Judgment {
    score: u32,
    clamped_from: Option<f64>,
    reasoning: String,
    evidence: Vec<String>,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    confidence: Option<f64>,
}

impl ScoringEngine {
    pub fn new(generator: Arc<dyn AnswerGenerator>, config: &InterviewConfig) -> Self {
        Self {
            generator,
            retry: RetryPolicy::from_config(config),
            fallback_score: config.fallback_score.clamp(MIN_SCORE, MAX_SCORE),
        }
    }

    fn instruction(dimension: &Dimension) -> String {
        format!(
            "Rate the subject on {} ({}) from {} to {} using the whole conversation above. \
             Bands: 10-20 very poor, 21-30 poor, 31-40 fair, 41-50 good, 51-60 excellent. \
             Reply with JSON only: {{\"score\": integer, \"level\": \"...\", \"reasoning\": \"...\", \
             \"evidence\": [\"quotes from the answers\"], \"strengths\": [\"...\"], \
             \"weaknesses\": [\"...\"], \"confidence\": 0.0-1.0}}",
            dimension.name, dimension.description, MIN_SCORE, MAX_SCORE
        )
    }

    /// Score the transcript of `dimension`.
    ///
    /// Fails only on an empty transcript, which the round floor rules out.
    pub async fn score(
        &self,
        transcript: &Transcript,
        dimension: &Dimension,
    ) -> Result<DimensionResult, AssessmentError> {
        if transcript.is_empty() {
            return Err(AssessmentError::ScoringUnavailable {
                dimension: dimension.id,
            });
        }

        let failed_rounds = transcript.failed_count() as u32;

        if transcript.answered_count() == 0 {
            warn!(dimension = dimension.id, "No answered rounds, using fallback score");
            return Ok(self.fallback(transcript, dimension, "no answered rounds"));
        }

        let instruction = Self::instruction(dimension);
        let request = JudgeRequest {
            kind: JudgmentKind::Score,
            dimension,
            transcript,
            question: &instruction,
        };

        let raw = match self
            .retry
            .run("score", |_| self.generator.judge(&request))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(dimension = dimension.id, error = %e, "Judge unavailable, using fallback score");
                return Ok(self.fallback(transcript, dimension, "judge unavailable"));
            }
        };

        let Some(judgment) = parse_judgment(&raw) else {
            warn!(dimension = dimension.id, "Judgment unusable, using fallback score");
            let mut result = self.fallback(transcript, dimension, "judgment had no usable score");
            result.clamped = true;
            result.rationale = format!(
                "[clamped: malformed judgment, fallback {}]",
                self.fallback_score
            );
            return Ok(result);
        };

        debug!(
            dimension = dimension.id,
            score = judgment.score,
            clamped = judgment.clamped_from.is_some(),
            "Judgment parsed"
        );

        let mut rationale = judgment.reasoning;
        if !judgment.strengths.is_empty() {
            rationale.push_str(&format!(" Strengths: {}.", judgment.strengths.join("; ")));
        }
        if !judgment.weaknesses.is_empty() {
            rationale.push_str(&format!(" Weaknesses: {}.", judgment.weaknesses.join("; ")));
        }
        if let Some(raw_score) = judgment.clamped_from {
            rationale.push_str(&format!(
                " [clamped: judge returned {} outside {}-{}]",
                raw_score, MIN_SCORE, MAX_SCORE
            ));
        }

        Ok(DimensionResult {
            dimension_id: dimension.id,
            name: dimension.name.to_string(),
            score: judgment.score,
            level: ScoreLevel::from_score(judgment.score),
            rationale: rationale.trim().to_string(),
            rounds_used: transcript.len() as u32,
            failed_rounds,
            low_confidence: failed_rounds > 0,
            clamped: judgment.clamped_from.is_some(),
            evidence: judgment.evidence,
            confidence: judgment.confidence,
        })
    }

    fn fallback(&self, transcript: &Transcript, dimension: &Dimension, why: &str) -> DimensionResult {
        DimensionResult {
            dimension_id: dimension.id,
            name: dimension.name.to_string(),
            score: self.fallback_score,
            level: ScoreLevel::from_score(self.fallback_score),
            rationale: format!("[fallback: {}]", why),
            rounds_used: transcript.len() as u32,
            failed_rounds: transcript.failed_count() as u32,
            low_confidence: true,
            clamped: false,
            evidence: Vec::new(),
            confidence: None,
        }
    }
}

/// Validate raw judge output. `None` when no numeric score can be found.
fn parse_judgment(raw: &str) -> Option<Judgment> {
    let json = extract_json_object(raw)?;

    let value = match json.get("score")? {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !value.is_finite() {
        return None;
    }

    let rounded = value.round();
    let (score, clamped_from) = if rounded < MIN_SCORE as f64 {
        (MIN_SCORE, Some(value))
    } else if rounded > MAX_SCORE as f64 {
        (MAX_SCORE, Some(value))
    } else {
        (rounded as u32, None)
    };

    let strings = |key: &str| -> Vec<String> {
        json.get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    };

    Some(Judgment {
        score,
        clamped_from,
        reasoning: json
            .get("reasoning")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        evidence: strings("evidence"),
        strengths: strings("strengths"),
        weaknesses: strings("weaknesses"),
        confidence: json
            .get("confidence")
            .and_then(|v| v.as_f64())
            .map(|c| c.clamp(0.0, 1.0)),
    })
}

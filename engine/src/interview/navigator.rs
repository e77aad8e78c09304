//! Navigator agent
//!
//! Turns an interaction mode and the prior answer into the shape of the next
//! question: which sub-facet to focus on, how deep to go and in what tone.
//! The literal wording is left to the answer generator acting as interviewer.

use crate::config::InterviewConfig;
use sdk::errors::AssessmentError;
use sdk::types::{Dimension, InteractionMode, Turn};
use serde::Serialize;

/// Phrases that signal a withdrawn or discouraged subject
const WITHDRAWAL_MARKERS: &[&str] = &[
    "don't know",
    "dont know",
    "not sure",
    "no idea",
    "can't",
    "cannot",
    "hard",
    "不知道",
    "不确定",
    "不会",
    "难",
];

/// Longest prior-answer excerpt carried in a shape
const EXCERPT_CHARS: usize = 120;

/// Chooses the interaction mode from the last answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    pub short_answer_chars: usize,
    pub detailed_answer_chars: usize,
}

impl Default for ModePolicy {
    fn default() -> Self {
        Self {
            short_answer_chars: 20,
            detailed_answer_chars: 100,
        }
    }
}

impl ModePolicy {
    pub fn from_config(config: &InterviewConfig) -> Self {
        Self {
            short_answer_chars: config.short_answer_chars,
            detailed_answer_chars: config.detailed_answer_chars,
        }
    }

    /// Mode for the round after `last`. The first round is always Normal and
    /// a round whose answer never arrived is followed by Encourage.
    pub fn choose(&self, last: Option<&Turn>) -> InteractionMode {
        match last {
            None => InteractionMode::Normal,
            Some(turn) if !turn.is_answered() => InteractionMode::Encourage,
            Some(turn) => self.mode_for_answer(&turn.answer),
        }
    }

    pub fn mode_for_answer(&self, answer: &str) -> InteractionMode {
        let length = answer.trim().chars().count();
        let lowered = answer.to_lowercase();

        if length < self.short_answer_chars || WITHDRAWAL_MARKERS.iter().any(|m| lowered.contains(m)) {
            InteractionMode::Encourage
        } else if length > self.detailed_answer_chars {
            InteractionMode::Probe
        } else {
            InteractionMode::Normal
        }
    }
}

/// How demanding the next question should be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Easy,
    Standard,
    Deep,
}

/// Structured instruction for the next question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptShape {
    pub dimension_id: u8,
    pub round: u32,
    pub mode: InteractionMode,
    /// Sub-facet the question should target
    pub focus: &'static str,
    pub depth: Depth,
    pub tone: &'static str,
    /// Start of the previous answer, for follow-ups that quote it
    pub prior_excerpt: Option<String>,
}

impl PromptShape {
    /// Plain question used when the interviewer role cannot produce one
    pub fn fallback_question(&self, dimension: &Dimension) -> String {
        match (self.mode, &self.prior_excerpt) {
            (InteractionMode::Probe, Some(excerpt)) => format!(
                "You said \"{}\". What would make you change your mind about that, and why?",
                excerpt
            ),
            (InteractionMode::Encourage, _) => format!(
                "There are no wrong answers here. Could you share one simple example of {} from your own life?",
                self.focus
            ),
            _ => format!(
                "Thinking about {} ({}), how do you usually approach it? Please describe a concrete situation.",
                self.focus,
                dimension.name.to_lowercase()
            ),
        }
    }
}

/// Stateless prompt-shape planner
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigatorAgent;

impl NavigatorAgent {
    pub fn new() -> Self {
        Self
    }

    /// Shape of the question for `round` of `dimension`
    pub fn next_prompt_shape(
        &self,
        mode: InteractionMode,
        prior_answer: Option<&str>,
        dimension: &Dimension,
        round: u32,
    ) -> Result<PromptShape, AssessmentError> {
        if round == 0 {
            return Err(AssessmentError::GenerationFailure(
                "rounds are numbered from 1".to_string(),
            ));
        }
        if dimension.facets.is_empty() {
            return Err(AssessmentError::GenerationFailure(format!(
                "dimension {} has no facets to ask about",
                dimension.id
            )));
        }
        if mode != InteractionMode::Normal && prior_answer.is_none() {
            return Err(AssessmentError::GenerationFailure(format!(
                "{} mode needs a prior answer",
                mode
            )));
        }

        let scripted = &dimension.facets[(round as usize - 1) % dimension.facets.len()];

        let (focus, depth, tone) = match mode {
            InteractionMode::Normal => (
                scripted.name,
                Depth::Standard,
                "Neutral and curious. Ask the next standard question for this dimension.",
            ),
            InteractionMode::Encourage => (
                scripted.name,
                Depth::Easy,
                "Warm and affirming. Acknowledge the previous answer and ask an easier, concrete question that invites a personal example.",
            ),
            InteractionMode::Probe => {
                // Dig into whatever the subject already talked about
                let mentioned = prior_answer.and_then(|answer| {
                    dimension.facets.iter().find(|f| f.is_mentioned_in(answer))
                });
                (
                    mentioned.unwrap_or(scripted).name,
                    Depth::Deep,
                    "Respectful but challenging. Ask the subject to justify or stress-test the reasoning they just gave.",
                )
            }
        };

        let prior_excerpt = prior_answer
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| a.chars().take(EXCERPT_CHARS).collect::<String>());

        Ok(PromptShape {
            dimension_id: dimension.id,
            round,
            mode,
            focus,
            depth,
            tone,
            prior_excerpt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sdk::types::TurnOutcome;

    fn turn(answer: &str, outcome: TurnOutcome) -> Turn {
        Turn {
            round: 1,
            mode: InteractionMode::Normal,
            question: "q".to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
            outcome,
        }
    }

    #[test]
    fn test_mode_policy_thresholds() {
        let policy = ModePolicy::default();

        assert_eq!(policy.choose(None), InteractionMode::Normal);
        assert_eq!(policy.mode_for_answer("Yes."), InteractionMode::Encourage);
        assert_eq!(
            policy.mode_for_answer("I usually compare a few sources before I decide anything."),
            InteractionMode::Normal
        );
        assert_eq!(policy.mode_for_answer(&"detailed ".repeat(20)), InteractionMode::Probe);
    }

    #[test]
    fn test_withdrawal_markers_encourage() {
        let policy = ModePolicy::default();
        assert_eq!(
            policy.mode_for_answer("I'm honestly not sure how I would handle that situation."),
            InteractionMode::Encourage
        );
        assert_eq!(policy.mode_for_answer("这个问题我真的不知道该怎么回答才好呢，想不出来"), InteractionMode::Encourage);
    }

    #[test]
    fn test_failed_round_is_followed_by_encourage() {
        let policy = ModePolicy::default();
        let failed = turn("", TurnOutcome::GenerationExhausted);
        assert_eq!(policy.choose(Some(&failed)), InteractionMode::Encourage);
    }

    #[test]
    fn test_normal_shape_follows_scripted_facets() {
        let navigator = NavigatorAgent::new();
        let dim = Dimension::by_id(1).unwrap();

        let first = navigator.next_prompt_shape(InteractionMode::Normal, None, dim, 1).unwrap();
        let fourth = navigator.next_prompt_shape(InteractionMode::Normal, Some("ok"), dim, 4).unwrap();

        assert_eq!(first.focus, dim.facets[0].name);
        assert_eq!(first.depth, Depth::Standard);
        assert_eq!(fourth.focus, dim.facets[0].name);
        assert!(first.prior_excerpt.is_none());
    }

    #[test]
    fn test_deeper_followup_targets_mentioned_facet() {
        let navigator = NavigatorAgent::new();
        let dim = Dimension::by_id(2).unwrap();
        let answer = "I try hard to check my own bias before I judge anyone else's position.";

        let shape = navigator
            .next_prompt_shape(InteractionMode::Probe, Some(answer), dim, 2)
            .unwrap();

        assert_eq!(shape.focus, "self-monitoring for bias");
        assert_eq!(shape.depth, Depth::Deep);
        assert!(shape.fallback_question(dim).contains("change your mind"));
    }

    #[test]
    fn test_excerpt_is_char_bounded() {
        let navigator = NavigatorAgent::new();
        let dim = Dimension::by_id(6).unwrap();
        let long = "好".repeat(500);

        let shape = navigator
            .next_prompt_shape(InteractionMode::Encourage, Some(&long), dim, 2)
            .unwrap();

        assert_eq!(shape.prior_excerpt.unwrap().chars().count(), EXCERPT_CHARS);
    }

    #[test]
    fn test_follow_up_mode_without_prior_answer_fails() {
        let navigator = NavigatorAgent::new();
        let dim = Dimension::by_id(3).unwrap();

        let result = navigator.next_prompt_shape(InteractionMode::Probe, None, dim, 2);
        assert!(matches!(result, Err(AssessmentError::GenerationFailure(_))));

        let result = navigator.next_prompt_shape(InteractionMode::Normal, None, dim, 0);
        assert!(matches!(result, Err(AssessmentError::GenerationFailure(_))));
    }
}

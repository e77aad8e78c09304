//! LLM-backed answer generator
//!
//! Speaks three parts through the router: the interviewer wording a prompt
//! shape, the virtual subject role-playing its persona, and the judge
//! returning structured JSON over a transcript.

use super::router::LLMRouter;
use super::{LLMError, Message};
use crate::interview::generator::{AnswerGenerator, AskRequest, JudgeRequest, Role};
use crate::personas::PersonaBook;
use async_trait::async_trait;
use sdk::types::{Transcript, Turn};
use std::sync::Arc;
use tracing::debug;

pub struct LlmAnswerGenerator {
    router: Arc<LLMRouter>,
    personas: Arc<PersonaBook>,
}

impl LlmAnswerGenerator {
    pub fn new(router: Arc<LLMRouter>, personas: Arc<PersonaBook>) -> Self {
        Self { router, personas }
    }

    async fn complete(&self, label: &str, messages: Vec<Message>) -> Result<String, LLMError> {
        let (text, provider) = self.router.call(&messages).await?;
        debug!(call = label, provider = %provider, chars = text.chars().count(), "Completion received");

        let text = text.trim();
        if text.is_empty() {
            return Err(LLMError::ParseError(format!("{} provider returned empty text", provider)));
        }
        Ok(text.to_string())
    }
}

fn render_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|t| {
            let answer = if t.is_answered() { t.answer.as_str() } else { "(no answer)" };
            format!("Q: {}\nA: {}", t.question, answer)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Transcript as the judge sees it
pub fn render_transcript(transcript: &Transcript) -> String {
    transcript
        .turns()
        .iter()
        .map(|t| {
            let answer = if t.is_answered() { t.answer.as_str() } else { "(no answer)" };
            format!("Round {} [{}]\nQ: {}\nA: {}", t.round, t.mode, t.question, answer)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn interviewer_messages(request: &AskRequest<'_>) -> Vec<Message> {
    let shape = request.shape;
    let dimension = request.dimension;

    let system = format!(
        "You are a friendly interviewer assessing a person's critical-thinking disposition, \
         currently the dimension \"{}\" ({}). Ask exactly one open question. \
         Output only the question, no preamble.",
        dimension.name, dimension.description
    );

    let mut user = format!(
        "Round {}. Focus: {}. Depth: {:?}. Tone: {}",
        shape.round, shape.focus, shape.depth, shape.tone
    );
    if let Some(excerpt) = &shape.prior_excerpt {
        user.push_str(&format!("\nTheir last answer began: \"{}\"", excerpt));
    }
    if !request.history.is_empty() {
        user.push_str(&format!("\nRecent conversation:\n{}", render_history(request.history)));
    }

    vec![Message::system(system), Message::user(user)]
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn ask(&self, request: &AskRequest<'_>) -> Result<String, LLMError> {
        match request.role {
            Role::Interviewer => self.complete("question", interviewer_messages(request)).await,
            Role::Subject => {
                let persona = self.personas.get(request.subject_id).ok_or_else(|| {
                    LLMError::InvalidRequest(format!("No persona for subject {}", request.subject_id))
                })?;
                let question = request
                    .question
                    .ok_or_else(|| LLMError::InvalidRequest("Subject asked without a question".to_string()))?;

                let mut system = format!(
                    "You are role-playing the following person taking a critical-thinking interview.\n\n{}\n\n\
                     Current dimension: {}. Round {}.\n\
                     Answer in the first person, in this person's own voice and limits. \
                     Keep it to 30-100 characters, conversational, hesitations allowed, no lists. \
                     Never mention that you are role-playing.",
                    persona.description, request.dimension.name, request.shape.round
                );
                if !request.history.is_empty() {
                    system.push_str(&format!("\n\nEarlier in this conversation:\n{}", render_history(request.history)));
                }

                self.complete("answer", vec![Message::system(system), Message::user(question)])
                    .await
            }
        }
    }

    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<String, LLMError> {
        let system = format!(
            "You assess critical-thinking disposition on the dimension \"{}\": {}. \
             You only ever reply with a single JSON object.",
            request.dimension.name, request.dimension.description
        );
        let user = format!(
            "Conversation:\n{}\n\n{}",
            render_transcript(request.transcript),
            request.question
        );

        self.complete("judge", vec![Message::system(system), Message::user(user)])
            .await
    }
}

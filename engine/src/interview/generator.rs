//! Answer generator boundary
//!
//! The only suspension point of the interview loop. Implementations may fail
//! or time out; callers wrap every call in a [`RetryPolicy`](super::retry::RetryPolicy).

use super::navigator::PromptShape;
use crate::llm::LLMError;
use async_trait::async_trait;
use sdk::types::{Dimension, Transcript, Turn};

/// Who the generator speaks as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Writes the literal question for a prompt shape
    Interviewer,
    /// Answers the question as the subject under assessment
    Subject,
}

#[derive(Debug, Clone, Copy)]
pub struct AskRequest<'a> {
    pub role: Role,
    pub subject_id: &'a str,
    pub dimension: &'a Dimension,
    pub shape: &'a PromptShape,
    /// The question being answered, for the subject role
    pub question: Option<&'a str>,
    /// Most recent turns of the active dimension, oldest first
    pub history: &'a [Turn],
}

/// What a judgment is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgmentKind {
    Sufficiency,
    Score,
}

#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub kind: JudgmentKind,
    pub dimension: &'a Dimension,
    pub transcript: &'a Transcript,
    /// Instruction describing the structured judgment wanted
    pub question: &'a str,
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Free text for the given role
    async fn ask(&self, request: &AskRequest<'_>) -> Result<String, LLMError>;

    /// Raw structured judgment over a transcript, usually JSON
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<String, LLMError>;
}

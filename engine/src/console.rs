//! Interactive subject
//!
//! Puts a person at the keyboard in the subject's seat: questions are printed
//! to stdout and answers read line by line. Every other role is delegated to
//! the wrapped generator.

use crate::interview::generator::{AnswerGenerator, AskRequest, JudgeRequest, Role};
use crate::llm::LLMError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

pub struct ConsoleSubject<R = BufReader<Stdin>> {
    inner: Arc<dyn AnswerGenerator>,
    lines: Mutex<Lines<R>>,
}

impl ConsoleSubject {
    /// Answer from the process's stdin
    pub fn new(inner: Arc<dyn AnswerGenerator>) -> Self {
        Self::with_reader(inner, BufReader::new(tokio::io::stdin()))
    }
}

impl<R> ConsoleSubject<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn with_reader(inner: Arc<dyn AnswerGenerator>, reader: R) -> Self {
        Self {
            inner,
            lines: Mutex::new(reader.lines()),
        }
    }

    async fn read_answer(&self, round: u32, question: &str) -> Result<String, LLMError> {
        println!("\n[{}] {}", round, question);
        println!("> ");

        let line = self
            .lines
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| LLMError::Unknown(format!("Failed to read answer: {}", e)))?
            .ok_or_else(|| LLMError::ProviderUnavailable("Input closed".to_string()))?;

        let answer = line.trim();
        if answer.is_empty() {
            return Err(LLMError::InvalidRequest("Empty answer".to_string()));
        }
        Ok(answer.to_string())
    }
}

#[async_trait]
impl<R> AnswerGenerator for ConsoleSubject<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn ask(&self, request: &AskRequest<'_>) -> Result<String, LLMError> {
        match (request.role, request.question) {
            (Role::Subject, Some(question)) => self.read_answer(request.shape.round, question).await,
            _ => self.inner.ask(request).await,
        }
    }

    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<String, LLMError> {
        self.inner.judge(request).await
    }
}

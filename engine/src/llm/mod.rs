//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for interacting with multiple LLM providers
//! (Ollama, OpenAI-compatible endpoints, Anthropic). The LLMProvider trait defines
//! the contract that all providers must implement, enabling the LLM router to work
//! with multiple providers transparently.
//!
//! The interview core never talks to a provider directly. It goes through the
//! `AnswerGenerator` boundary, implemented here by [`generator::LlmAnswerGenerator`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

pub mod anthropic;
pub mod generator;
pub mod ollama;
pub mod openai;
pub mod router;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai", "anthropic")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama), false for cloud providers
    fn is_local(&self) -> bool;

    /// Returns the estimated cost in USD for the given token count
    /// Local providers should return 0.0
    fn estimated_cost(&self, tokens: usize) -> f64;

    /// Generate a completion for the conversation
    ///
    /// # Returns
    /// * `Ok(String)` - The text of the completion
    /// * `Err(LLMError)` - If the request fails
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Map a non-success HTTP status from a cloud provider to an error
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(body),
        429 => LLMError::RateLimitExceeded,
        500..=599 => LLMError::ProviderUnavailable(format!("{}: {}", status, body)),
        _ => LLMError::InvalidRequest(body),
    }
}

/// Map a transport error to an error
pub(crate) fn transport_error(e: reqwest::Error) -> LLMError {
    if e.is_timeout() {
        LLMError::Timeout
    } else if e.is_connect() {
        LLMError::ProviderUnavailable(e.to_string())
    } else {
        LLMError::NetworkError(e.to_string())
    }
}

/// Extract a JSON object from model output.
///
/// Handles multiple LLM output formats:
/// 1. Raw JSON: `{"score": 42, ...}`
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. JSON embedded in prose: the first balanced `{...}` that parses
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    // Pattern 1: Raw JSON
    if let Some(value) = parse_object(trimmed) {
        return Some(value);
    }

    // Pattern 2: Extract from markdown code fences (even with trailing text)
    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(value) = parse_object(inner.trim()) {
            return Some(value);
        }
    }

    // Pattern 3: Scan every `{` for a balanced object
    for (pos, _) in trimmed.match_indices('{') {
        if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
            if let Some(value) = parse_object(json_str) {
                return Some(value);
            }
        }
    }

    None
}

fn parse_object(s: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(s).ok()?;
    value.is_object().then_some(value)
}

/// Markdown code fence with an optional language tag
static FENCE_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn fence_pattern() -> Option<&'static Regex> {
    FENCE_PATTERN
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let body = fence_pattern()?.captures(content)?.get(1)?.as_str();
    (!body.trim().is_empty()).then_some(body)
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let system_msg = Message::system("You are an interviewer");
        assert_eq!(system_msg.role, MessageRole::System);
        assert_eq!(system_msg.role.to_string(), "system");
    }

    #[test]
    fn test_extract_raw_json() {
        let value = extract_json_object(r#"{"score": 42, "level": "good"}"#).unwrap();
        assert_eq!(value["score"], 42);
    }

    #[test]
    fn test_extract_fenced_json_with_trailing_text() {
        let content = "Here is my verdict:\n```json\n{\"sufficient\": true}\n```\nHope it helps.";
        let value = extract_json_object(content).unwrap();
        assert_eq!(value["sufficient"], true);
    }

    #[test]
    fn test_extract_fenced_json_without_language_tag() {
        let content = "```\n{\"score\": 33}\n```";
        assert_eq!(extract_json_object(content).unwrap()["score"], 33);
        assert!(extract_fenced_json("```json\n   \n```").is_none());
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let content = r#"I think {maybe} the answer is {"score": 51, "reasoning": "uses {braces}"} ok"#;
        let value = extract_json_object(content).unwrap();
        assert_eq!(value["score"], 51);
        assert_eq!(value["reasoning"], "uses {braces}");
    }

    #[test]
    fn test_extract_json_no_match() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("{\"unterminated\": ").is_none());
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(reqwest::StatusCode::UNAUTHORIZED, String::new()),
            LLMError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            LLMError::RateLimitExceeded
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_GATEWAY, String::new()),
            LLMError::ProviderUnavailable(_)
        ));
    }
}

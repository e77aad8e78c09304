//! Ollama provider
//!
//! Talks to a local Ollama daemon over `/api/chat` with streaming off.
//! Local and free, so the router ranks it ahead of cloud providers when
//! no default is configured.

use super::{status_error, transport_error, LLMError, LLMProvider, Message};
use crate::config::OllamaConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &OllamaConfig) -> Self {
        Self::new(&config.base_url, &config.model)
    }

    fn chat_request(&self, messages: &[Message]) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
        }
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn is_local(&self) -> bool {
        true
    }

    fn estimated_cost(&self, _tokens: usize) -> f64 {
        0.0
    }

    async fn generate(&self, messages: &[Message]) -> super::Result<String> {
        let request = self.chat_request(messages);
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LLMError::ProviderUnavailable(format!(
                        "Cannot reach Ollama at {}; is it running?",
                        self.base_url
                    ))
                } else {
                    transport_error(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Unexpected Ollama reply: {}", e)))?;

        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = reply.message.content.len(),
            "Ollama completion"
        );

        Ok(reply.message.content)
    }

    async fn check_health(&self) -> bool {
        match self.client.get(format!("{}/api/tags", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let provider = OllamaProvider::new("http://localhost:11434/", "qwen2.5:7b");
        assert_eq!(provider.base_url, "http://localhost:11434");
        assert!(provider.is_local());
        assert_eq!(provider.estimated_cost(1000), 0.0);
    }

    #[test]
    fn test_chat_request_keeps_roles_in_order() {
        let provider = OllamaProvider::new("http://localhost:11434", "qwen2.5:7b");
        let request = provider.chat_request(&[
            Message::system("You are an interviewer"),
            Message::user("Hello"),
            Message::assistant("Hi there"),
        ]);

        let roles: Vec<&str> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant"]);
        assert!(!request.stream);
        assert_eq!(request.model, "qwen2.5:7b");
    }
}

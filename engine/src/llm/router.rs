//! LLM Router
//!
//! Ranks the configured providers and fails over across them. The configured
//! default provider is always tried first, the rest follow cheapest first.
//!
//! One `call` is a single attempt from the point of view of the interview
//! retry policy: the policy wraps whole router calls, so a transient outage of
//! every provider costs one attempt, not one per provider.

use super::anthropic::AnthropicProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAIProvider;
use super::{LLMError, LLMProvider, Message};
use crate::config::LLMConfig;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Local providers get time for model loading on top of generation
const LOCAL_TIMEOUT: Duration = Duration::from_secs(120);

/// LLM Router that ranks providers and fails over between them
pub struct LLMRouter {
    /// Available LLM providers
    providers: Vec<Box<dyn LLMProvider>>,

    /// LLM configuration
    config: Arc<LLMConfig>,

    local_timeout: Duration,
    cloud_timeout: Duration,
}

impl LLMRouter {
    /// Create a new LLM router
    ///
    /// # Arguments
    /// * `providers` - List of available LLM providers
    /// * `config` - LLM configuration
    pub fn new(providers: Vec<Box<dyn LLMProvider>>, config: Arc<LLMConfig>) -> Self {
        let cloud_timeout = Duration::from_secs(config.timeout_secs);
        Self {
            providers,
            config,
            local_timeout: LOCAL_TIMEOUT,
            cloud_timeout,
        }
    }

    /// Build a router over every provider described in the config
    pub fn from_config(config: &LLMConfig) -> Self {
        let providers: Vec<Box<dyn LLMProvider>> = vec![
            Box::new(OllamaProvider::from_config(&config.ollama)),
            Box::new(OpenAIProvider::new(config.openai.clone())),
            Box::new(AnthropicProvider::new(config.anthropic.clone())),
        ];
        Self::new(providers, Arc::new(config.clone()))
    }

    /// Override the per-provider timeouts
    pub fn with_timeouts(mut self, local: Duration, cloud: Duration) -> Self {
        self.local_timeout = local;
        self.cloud_timeout = cloud;
        self
    }

    /// Estimate token count for the conversation
    ///
    /// Uses a simple heuristic: ~4 characters per token
    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        total_chars / 4
    }

    /// Rank providers: configured default first, then by ascending cost
    pub fn rank_providers(&self, estimated_tokens: usize) -> Vec<&dyn LLMProvider> {
        let mut providers: Vec<&dyn LLMProvider> =
            self.providers.iter().map(|b| b.as_ref()).collect();

        let default_provider = &self.config.default_provider;

        providers.sort_by(|a, b| {
            let a_default = a.name() == default_provider;
            let b_default = b.name() == default_provider;
            b_default.cmp(&a_default).then_with(|| {
                a.estimated_cost(estimated_tokens)
                    .partial_cmp(&b.estimated_cost(estimated_tokens))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        providers
    }

    /// Call LLM providers with automatic failover
    ///
    /// Returns the completion and the name of the provider that produced it.
    pub async fn call(&self, messages: &[Message]) -> super::Result<(String, String)> {
        if self.providers.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "No LLM providers configured".to_string(),
            ));
        }

        let ranked_providers = self.rank_providers(self.estimate_tokens(messages));
        let mut last_error = None;

        for provider in ranked_providers {
            let timeout = if provider.is_local() {
                self.local_timeout
            } else {
                self.cloud_timeout
            };
            tracing::debug!(
                provider = provider.name(),
                timeout_secs = timeout.as_secs_f64(),
                "Attempting provider"
            );

            match tokio::time::timeout(timeout, provider.generate(messages)).await {
                Ok(Ok(response)) => {
                    tracing::debug!(provider = provider.name(), "Provider succeeded");
                    return Ok((response, provider.name().to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Provider failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    tracing::warn!(
                        provider = provider.name(),
                        "Provider timed out after {:.0}s",
                        timeout.as_secs_f64()
                    );
                    last_error = Some(LLMError::Timeout);
                }
            }
        }

        tracing::error!("All LLM providers exhausted");
        Err(match last_error {
            Some(LLMError::Timeout) => LLMError::Timeout,
            Some(e) => LLMError::ProviderUnavailable(format!("All LLM providers failed: {}", e)),
            None => LLMError::ProviderUnavailable("All LLM providers failed".to_string()),
        })
    }

    /// Check the health of all registered providers concurrently
    /// Returns a list of (provider_name, is_healthy) in registration order
    pub async fn check_health(&self) -> Vec<(&str, bool)> {
        let checks = self.providers.iter().map(|provider| async move {
            (provider.name(), provider.check_health().await)
        });
        join_all(checks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProvider {
        name: String,
        is_local: bool,
        cost_per_1k: f64,
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(name: &str, is_local: bool, cost_per_1k: f64, reply: Option<&str>) -> Self {
            Self {
                name: name.to_string(),
                is_local,
                cost_per_1k,
                reply: reply.map(String::from),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_local(&self) -> bool {
            self.is_local
        }

        fn estimated_cost(&self, tokens: usize) -> f64 {
            (tokens as f64 / 1000.0) * self.cost_per_1k
        }

        async fn generate(&self, _messages: &[Message]) -> super::super::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| LLMError::NetworkError("connection reset".to_string()))
        }
    }

    fn config_with_default(default_provider: &str) -> Arc<LLMConfig> {
        Arc::new(LLMConfig {
            default_provider: default_provider.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_default_provider_ranks_first() {
        let providers: Vec<Box<dyn LLMProvider>> = vec![
            Box::new(MockProvider::new("ollama", true, 0.0, None)),
            Box::new(MockProvider::new("anthropic", false, 0.004, None)),
            Box::new(MockProvider::new("openai", false, 0.002, None)),
        ];
        let router = LLMRouter::new(providers, config_with_default("anthropic"));

        let ranked: Vec<&str> = router.rank_providers(1000).iter().map(|p| p.name()).collect();
        assert_eq!(ranked, vec!["anthropic", "ollama", "openai"]);
    }

    #[test]
    fn test_rank_providers_consider_cost() {
        let providers: Vec<Box<dyn LLMProvider>> = vec![
            Box::new(MockProvider::new("expensive", false, 0.010, None)),
            Box::new(MockProvider::new("cheap", false, 0.001, None)),
            Box::new(MockProvider::new("medium", false, 0.005, None)),
        ];
        let router = LLMRouter::new(providers, config_with_default("ollama"));

        let ranked: Vec<&str> = router.rank_providers(1000).iter().map(|p| p.name()).collect();
        assert_eq!(ranked, vec!["cheap", "medium", "expensive"]);
    }

    #[test]
    fn test_estimate_tokens() {
        let router = LLMRouter::new(vec![], config_with_default("ollama"));
        let tokens = router.estimate_tokens(&[Message::user("This is a test message")]);
        assert!((5..=6).contains(&tokens));
    }

    #[tokio::test]
    async fn test_call_fails_over_to_next_provider() {
        let providers: Vec<Box<dyn LLMProvider>> = vec![
            Box::new(MockProvider::new("ollama", true, 0.0, None)),
            Box::new(MockProvider::new("openai", false, 0.002, Some("hello"))),
        ];
        let router = LLMRouter::new(providers, config_with_default("ollama"));

        let (text, provider) = router.call(&[Message::user("hi")]).await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(provider, "openai");
    }

    #[tokio::test]
    async fn test_call_with_no_providers() {
        let router = LLMRouter::new(vec![], config_with_default("ollama"));
        let result = router.call(&[Message::user("hi")]).await;
        assert!(matches!(result, Err(LLMError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_call_all_providers_fail() {
        let providers: Vec<Box<dyn LLMProvider>> = vec![
            Box::new(MockProvider::new("ollama", true, 0.0, None)),
            Box::new(MockProvider::new("openai", false, 0.002, None)),
        ];
        let router = LLMRouter::new(providers, config_with_default("ollama"));
        let result = router.call(&[Message::user("hi")]).await;
        assert!(matches!(result, Err(LLMError::ProviderUnavailable(_))));
    }
}

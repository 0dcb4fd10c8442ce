//! Rig LLM client adapter.
//!
//! Wraps Rig's Agent for integration with our LlmClient trait.

use async_trait::async_trait;
use std::time::Instant;

use shellpilot_core::{
    config::PlannerConfig,
    traits::{LlmClient, LlmResponse, LlmUsage},
    Error, Result,
};

// Import required Rig traits
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;

/// Provider type for Rig clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigProvider {
    OpenAI,
    Anthropic,
    Gemini,
}

impl RigProvider {
    /// Parse a provider name from configuration.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(Error::Config(format!(
                "Unsupported planner provider '{}'. Use openai, anthropic or gemini",
                other
            ))),
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// Configuration for Rig client.
#[derive(Debug, Clone)]
pub struct RigConfig {
    /// Provider to use.
    pub provider: RigProvider,
    /// Model name.
    pub model: String,
    /// Temperature.
    pub temperature: Option<f64>,
    /// Max tokens.
    pub max_tokens: Option<u64>,
}

impl RigConfig {
    /// Build from the planner section of the app config.
    pub fn from_planner(config: &PlannerConfig) -> Result<Self> {
        Ok(Self {
            provider: RigProvider::parse(&config.provider)?,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

/// Rig-based LLM client.
pub struct RigLlmClient {
    config: RigConfig,
}

impl RigLlmClient {
    /// Create a new Rig client with the given configuration.
    ///
    /// Fails early when the provider's API key is not set, since Rig's
    /// `from_env` constructors panic on a missing key.
    pub fn new(config: RigConfig) -> Result<Self> {
        let var = config.provider.api_key_var();
        if std::env::var(var).is_err() {
            return Err(Error::Config(format!("{} not set", var)));
        }
        Ok(Self { config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Call OpenAI via Rig.
    async fn call_openai(&self, prompt: &str) -> Result<String> {
        use rig::providers::openai;

        let client = openai::Client::from_env();
        let mut builder = client.agent(&self.config.model);
        if let Some(t) = self.config.temperature {
            builder = builder.temperature(t);
        }
        if let Some(m) = self.config.max_tokens {
            builder = builder.max_tokens(m);
        }

        builder
            .build()
            .prompt(prompt)
            .await
            .map_err(|e| Error::planner(format!("OpenAI error: {}", e)))
    }

    /// Call Anthropic via Rig.
    async fn call_anthropic(&self, prompt: &str) -> Result<String> {
        use rig::providers::anthropic;

        let client = anthropic::Client::from_env();
        let mut builder = client.agent(&self.config.model);
        if let Some(t) = self.config.temperature {
            builder = builder.temperature(t);
        }
        // Anthropic requires an explicit limit.
        builder = builder.max_tokens(self.config.max_tokens.unwrap_or(4096));

        builder
            .build()
            .prompt(prompt)
            .await
            .map_err(|e| Error::planner(format!("Anthropic error: {}", e)))
    }

    /// Call Gemini via Rig.
    async fn call_gemini(&self, prompt: &str) -> Result<String> {
        use rig::providers::gemini;

        let client = gemini::Client::from_env();
        let mut builder = client.agent(&self.config.model);
        if let Some(t) = self.config.temperature {
            builder = builder.temperature(t);
        }
        if let Some(m) = self.config.max_tokens {
            builder = builder.max_tokens(m);
        }

        builder
            .build()
            .prompt(prompt)
            .await
            .map_err(|e| Error::planner(format!("Gemini error: {}", e)))
    }
}

#[async_trait]
impl LlmClient for RigLlmClient {
    async fn complete(&self, prompt: &str) -> Result<LlmResponse> {
        tracing::debug!(
            provider = ?self.config.provider,
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Calling LLM"
        );

        let started = Instant::now();
        let content = match self.config.provider {
            RigProvider::OpenAI => self.call_openai(prompt).await,
            RigProvider::Anthropic => self.call_anthropic(prompt).await,
            RigProvider::Gemini => self.call_gemini(prompt).await,
        }?;

        let usage = LlmUsage::estimate(prompt, &content);
        shellpilot_telemetry::track_planner_call(
            &self.config.model,
            usage.prompt_tokens,
            usage.completion_tokens,
            started.elapsed().as_secs_f64(),
        );

        Ok(LlmResponse {
            content,
            finish_reason: "stop".to_string(),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(RigProvider::parse("Gemini").unwrap(), RigProvider::Gemini);
        assert_eq!(RigProvider::parse("openai").unwrap(), RigProvider::OpenAI);
        assert!(matches!(RigProvider::parse("llama"), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_from_planner() {
        let planner = PlannerConfig {
            provider: "anthropic".into(),
            model: "claude-3-5-haiku-latest".into(),
            requests_per_minute: 30,
            temperature: Some(0.2),
            max_tokens: None,
        };
        let config = RigConfig::from_planner(&planner).unwrap();
        assert_eq!(config.provider, RigProvider::Anthropic);
        assert_eq!(config.model, "claude-3-5-haiku-latest");
        assert_eq!(config.temperature, Some(0.2));
    }
}

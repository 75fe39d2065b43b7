use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use haystack_core::{HaystackError, HaystackResult, ModelClient, RetryPolicy};

use crate::anthropic::AnthropicClient;
use crate::openai_compat::OpenAiCompatClient;

/// Supported backends. Chosen once from configuration; nothing downstream
/// branches on model names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Together,
    Fireworks,
    Azure,
    Mistral,
    Anthropic,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Self::OpenAi,
        Self::Together,
        Self::Fireworks,
        Self::Azure,
        Self::Mistral,
        Self::Anthropic,
    ];

    /// `None` for Azure, whose endpoint is per-deployment.
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Together => Some("https://api.together.xyz/v1"),
            Self::Fireworks => Some("https://api.fireworks.ai/inference/v1"),
            Self::Azure => None,
            Self::Mistral => Some("https://api.mistral.ai/v1"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi | Self::Azure => "gpt-4o",
            Self::Together => "meta-llama/Meta-Llama-3.1-405B-Instruct-Turbo",
            Self::Fireworks => "accounts/fireworks/models/llama-v3p1-405b-instruct",
            Self::Mistral => "mistral-large-2407",
            Self::Anthropic => "claude-3-5-sonnet-20240620",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Together => "TOGETHER_API_KEY",
            Self::Fireworks => "FIREWORKS_API_KEY",
            Self::Azure => "AZURE_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Largest context, in tokens, the benchmark grid is scaled to.
    pub fn default_max_context(self) -> usize {
        match self {
            Self::Anthropic => 200_000,
            _ => 128_000,
        }
    }

    /// Anthropic's per-minute limits bite harder, so it gets more attempts.
    pub fn default_retry_policy(self) -> RetryPolicy {
        match self {
            Self::Anthropic => RetryPolicy::with_attempts(5),
            _ => RetryPolicy::default(),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OpenAi => "openai",
            Self::Together => "together",
            Self::Fireworks => "fireworks",
            Self::Azure => "azure",
            Self::Mistral => "mistral",
            Self::Anthropic => "anthropic",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.to_string() == s.to_lowercase())
            .ok_or_else(|| format!("unknown provider: {s}"))
    }
}

/// Everything needed to construct one backend client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub provider: Provider,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientSettings {
    pub fn new(provider: Provider, model: &str, api_key: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
            base_url: None,
            api_key: api_key.to_string(),
            max_tokens: 64,
            timeout: Duration::from_secs(300),
            retry: provider.default_retry_policy(),
        }
    }
}

pub fn build_client(settings: &ClientSettings) -> HaystackResult<Box<dyn ModelClient>> {
    if settings.model.trim().is_empty() {
        return Err(HaystackError::Config("model name is empty".into()));
    }
    let base_url = settings
        .base_url
        .as_deref()
        .or(settings.provider.default_base_url())
        .ok_or_else(|| {
            HaystackError::Config(format!("provider {} needs a base_url", settings.provider))
        })?;

    let client: Box<dyn ModelClient> = match settings.provider {
        Provider::Anthropic => Box::new(AnthropicClient::new(settings, base_url)),
        Provider::OpenAi
        | Provider::Together
        | Provider::Fireworks
        | Provider::Azure
        | Provider::Mistral => Box::new(OpenAiCompatClient::new(settings, base_url)),
    };
    Ok(client)
}

/// Read the provider's API key from `env_override` or its standard variable.
pub fn api_key_from_env(provider: Provider, env_override: Option<&str>) -> HaystackResult<String> {
    let var = env_override.unwrap_or(provider.api_key_env());
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(HaystackError::Config(format!(
            "{var} is not set (needed for provider {provider})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for p in Provider::ALL {
            assert_eq!(p.to_string().parse::<Provider>(), Ok(p));
        }
        assert_eq!("OpenAI".parse::<Provider>(), Ok(Provider::OpenAi));
        assert!("bedrock".parse::<Provider>().is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Provider::Anthropic.default_max_context(), 200_000);
        assert_eq!(Provider::Mistral.default_max_context(), 128_000);
        assert_eq!(Provider::Anthropic.default_retry_policy().max_attempts, 5);
        assert_eq!(Provider::Fireworks.default_retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_build_uses_model() {
        let settings = ClientSettings::new(Provider::Mistral, "mistral-large-2407", "k");
        let client = build_client(&settings).unwrap();
        assert_eq!(client.model(), "mistral-large-2407");
        assert_eq!(client.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_azure_needs_base_url() {
        let mut settings = ClientSettings::new(Provider::Azure, "gpt-4o", "k");
        assert!(matches!(build_client(&settings), Err(HaystackError::Config(_))));
        settings.base_url = Some("https://example.openai.azure.com/openai/v1".into());
        assert!(build_client(&settings).is_ok());
    }

    #[test]
    fn test_missing_api_key() {
        let err = api_key_from_env(Provider::OpenAi, Some("HAYSTACK_TEST_SURELY_UNSET_KEY"))
            .unwrap_err();
        assert!(err.to_string().contains("HAYSTACK_TEST_SURELY_UNSET_KEY"));
    }
}

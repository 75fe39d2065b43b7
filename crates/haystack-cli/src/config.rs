//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `--config <path>` on the command line
//! 2. `$HAYSTACK_CONFIG` environment variable
//! 3. `./haystack.toml`
//! 4. `<platform config dir>/haystack/config.toml`
//! 5. Built-in defaults (everything is optional)

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use haystack_core::prompt::{DEFAULT_KEYWORDS, DEFAULT_NEEDLE, DEFAULT_QUESTION};
use haystack_core::{DepthSpacing, FailurePolicy, PromptLayout, RetryPolicy};
use haystack_providers::Provider;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub run: RunSection,
    pub needle: NeedleConfig,
    pub retry: RetryConfig,
    pub tokenizer: TokenizerConfig,
}

/// Which backend to query.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: Provider,
    /// Default: the provider's flagship model.
    pub model: Option<String>,
    /// Required for azure.
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Default: per provider.
    pub api_key_env: Option<String>,
    /// Grid ceiling, in units of the configured tokenizer. Default: per
    /// provider. With the default word tokenizer this counts whitespace runs,
    /// which is not the model's own token count.
    pub max_context_tokens: Option<usize>,
    /// Completion budget per query.
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Grid and output settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub haystack_path: PathBuf,
    pub output_dir: PathBuf,
    pub context_intervals: usize,
    pub depth_intervals: usize,
    pub depth_spacing: DepthSpacing,
    pub failure_policy: FailurePolicy,
    /// Fixed seed for window sampling. Unset: seeded from the OS.
    pub seed: Option<u64>,
    /// Keep the full injected context in each raw record.
    pub record_context: bool,
}

/// The fact under test and how it is asked for.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NeedleConfig {
    pub text: String,
    pub question: String,
    /// Whole-word keywords the scorer looks for.
    pub keywords: Vec<String>,
    pub layout: PromptLayout,
}

/// Overrides of the provider's retry defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub cooldown_secs: Option<u64>,
    pub pacing_ms: Option<u64>,
}

/// How context sizes are measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// Whitespace and non-whitespace runs. Needs no download, but a
    /// "200000 token" context is not 200000 model tokens.
    #[default]
    Word,
    /// A Hugging Face `tokenizer.json`, for model-accurate sizing. Requires
    /// the `hf-tokenizer` feature.
    Huggingface,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub kind: TokenizerKind,
    /// Local `tokenizer.json`.
    pub path: Option<PathBuf>,
    /// Hub repository to fetch `tokenizer.json` from when no path is given.
    pub repo: Option<String>,
}

// --- Defaults ---

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: Provider::Anthropic,
            model: None,
            base_url: None,
            api_key_env: None,
            max_context_tokens: None,
            max_tokens: 64,
            timeout_secs: 300,
        }
    }
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            haystack_path: PathBuf::from("haystack.txt"),
            output_dir: PathBuf::from("haystack-results"),
            context_intervals: 30,
            depth_intervals: 10,
            depth_spacing: DepthSpacing::Trailing,
            failure_policy: FailurePolicy::Abort,
            seed: None,
            record_context: true,
        }
    }
}

impl Default for NeedleConfig {
    fn default() -> Self {
        Self {
            text: DEFAULT_NEEDLE.into(),
            question: DEFAULT_QUESTION.into(),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            layout: PromptLayout::QuestionFirst,
        }
    }
}

impl ProviderConfig {
    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.kind.default_model().to_string())
    }

    pub fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
            .unwrap_or_else(|| self.kind.default_max_context())
    }
}

impl RetryConfig {
    /// Layer the configured overrides on top of `base`.
    pub fn apply(&self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            cooldown: self
                .cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(base.cooldown),
            pacing: self
                .pacing_ms
                .map(Duration::from_millis)
                .unwrap_or(base.pacing),
        }
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    if let Some(p) = explicit {
        return read_config(p);
    }
    match config_path() {
        Some(p) if p.exists() => read_config(&p),
        _ => Ok(Config::default()),
    }
}

fn read_config(path: &PathBuf) -> Result<Config> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    // 1. Environment variable
    if let Ok(p) = std::env::var("HAYSTACK_CONFIG") {
        return Some(PathBuf::from(p));
    }

    // 2. Working directory
    let local = PathBuf::from("haystack.toml");
    if local.exists() {
        return Some(local);
    }

    // 3. Platform config dir
    directories::ProjectDirs::from("", "", "haystack")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Show the active config path (for `haystack config`).
pub fn show_config_path(explicit: Option<&PathBuf>) -> String {
    match explicit.cloned().or_else(config_path) {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.kind, Provider::Anthropic);
        assert_eq!(config.provider.max_context_tokens(), 200_000);
        assert_eq!(config.provider.model(), "claude-3-5-sonnet-20240620");
        assert_eq!(config.run.context_intervals, 30);
        assert_eq!(config.run.depth_intervals, 10);
        assert_eq!(config.needle.keywords, vec!["purple", "white"]);
        assert!(config.run.record_context);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[provider]
kind = "fireworks"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.kind, Provider::Fireworks);
        assert_eq!(config.provider.max_context_tokens(), 128_000);
        // Other fields should be defaults
        assert_eq!(config.run.failure_policy, FailurePolicy::Abort);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[provider]
kind = "azure"
model = "gpt-4o"
base_url = "https://example.openai.azure.com/openai/v1"
api_key_env = "MY_AZURE_KEY"
max_context_tokens = 64000
max_tokens = 32

[run]
haystack_path = "/data/haystack.txt"
output_dir = "/tmp/results"
context_intervals = 5
depth_intervals = 4
depth_spacing = "centered"
failure_policy = "skip"
seed = 1234
record_context = false

[needle]
text = "The secret code is 42."
question = "What is the secret code?"
keywords = ["42"]
layout = "question_last"

[retry]
max_attempts = 4
cooldown_secs = 30

[tokenizer]
kind = "huggingface"
repo = "Xenova/gpt-4"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.max_context_tokens(), 64_000);
        assert_eq!(config.run.depth_spacing, DepthSpacing::Centered);
        assert_eq!(config.run.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.run.seed, Some(1234));
        assert_eq!(config.needle.layout, PromptLayout::QuestionLast);
        assert_eq!(config.tokenizer.kind, TokenizerKind::Huggingface);

        let policy = config.retry.apply(RetryPolicy::default());
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.cooldown, Duration::from_secs(30));
        assert_eq!(policy.pacing, Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let toml_str = r#"
[provider]
kind = "bedrock"
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(&missing)).is_err());

        let present = dir.path().join("haystack.toml");
        std::fs::write(&present, "[run]\ncontext_intervals = 3\n").unwrap();
        let config = load_config(Some(&present)).unwrap();
        assert_eq!(config.run.context_intervals, 3);
    }
}

use serde_json::{json, Value};

use haystack_core::{ClientError, ModelClient, RetryPolicy};

use crate::factory::ClientSettings;
use crate::http;

/// Any backend speaking the OpenAI chat-completions dialect: OpenAI itself,
/// Together, Fireworks, Azure deployments and Mistral.
pub struct OpenAiCompatClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    policy: RetryPolicy,
}

impl OpenAiCompatClient {
    pub fn new(settings: &ClientSettings, base_url: &str) -> Self {
        Self {
            agent: http::agent(settings.timeout),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            policy: settings.retry,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.max_tokens,
        })
    }
}

fn extract_text(body: &Value) -> Result<String, ClientError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| http::malformed("choices[0].message.content", body))
}

impl ModelClient for OpenAiCompatClient {
    fn complete(&self, prompt: &str) -> Result<String, ClientError> {
        let request = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json");
        let body = http::post_json(request, &self.body(prompt))?;
        extract_text(&body)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }
}

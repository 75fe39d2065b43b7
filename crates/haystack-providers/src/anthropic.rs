use serde_json::{json, Value};

use haystack_core::{ClientError, ModelClient, RetryPolicy};

use crate::factory::ClientSettings;
use crate::http;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API.
pub struct AnthropicClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    policy: RetryPolicy,
}

impl AnthropicClient {
    pub fn new(settings: &ClientSettings, base_url: &str) -> Self {
        Self {
            agent: http::agent(settings.timeout),
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            policy: settings.retry,
        }
    }

    fn body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        })
    }
}

/// Concatenate the text blocks of a Messages reply.
fn extract_text(body: &Value) -> Result<String, ClientError> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| http::malformed("content", body))?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return Err(http::malformed("text block", body));
    }
    Ok(text.concat())
}

impl ModelClient for AnthropicClient {
    fn complete(&self, prompt: &str) -> Result<String, ClientError> {
        let request = self
            .agent
            .post(&self.endpoint)
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", ANTHROPIC_VERSION)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Provider;

    #[test]
    fn test_extract_text_blocks() {
        let body = json!({
            "content": [
                {"type": "text", "text": "Purple "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "and white."}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(extract_text(&body).unwrap(), "Purple and white.");
    }

    #[test]
    fn test_extract_text_empty() {
        assert!(extract_text(&json!({"content": []})).is_err());
        assert!(extract_text(&json!({"type": "error"})).is_err());
    }

    #[test]
    fn test_body_and_policy() {
        let settings = ClientSettings::new(Provider::Anthropic, "claude-3-5-sonnet-20240620", "k");
        let client = AnthropicClient::new(&settings, "https://api.anthropic.com/v1");
        assert_eq!(client.endpoint, "https://api.anthropic.com/v1/messages");
        assert_eq!(client.body("q")["max_tokens"], 64);
        assert_eq!(client.retry_policy().max_attempts, 5);
    }
}

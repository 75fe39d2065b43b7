use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one grid cell for one model. Field names match the JSON
/// records written by earlier versions of the benchmark, so old result files
/// still load and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Actual token count of the injected context.
    #[serde(rename = "input_context_size")]
    pub context_tokens: usize,
    #[serde(rename = "input_context_percentage")]
    pub context_percentage: f64,
    pub needle_depth: f64,
    pub model_response: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_with_needle: Option<String>,

    /// Set when the cell was skipped after exhausting retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u8>,
}

impl TestResult {
    pub fn new(
        context_tokens: usize,
        context_percentage: f64,
        needle_depth: f64,
        model_response: String,
    ) -> Self {
        Self {
            context_tokens,
            context_percentage,
            needle_depth,
            model_response,
            context_with_needle: None,
            error: None,
            recorded_at: Some(Utc::now()),
            points: None,
        }
    }

    pub fn failed(
        context_tokens: usize,
        context_percentage: f64,
        needle_depth: f64,
        error: String,
    ) -> Self {
        Self {
            error: Some(error),
            ..Self::new(context_tokens, context_percentage, needle_depth, String::new())
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Every result recorded for one model, in insertion order.
pub type ResultBatch = Vec<TestResult>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_field_names() {
        let mut r = TestResult::new(1000, 50.0, 0.5, "purple".into());
        r.recorded_at = None;
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["input_context_size"], 1000);
        assert_eq!(json["input_context_percentage"], 50.0);
        assert_eq!(json["needle_depth"], 0.5);
        assert_eq!(json["model_response"], "purple");
        assert!(json.get("points").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("context_with_needle").is_none());
    }

    #[test]
    fn test_loads_legacy_record() {
        let legacy = r#"{
            "input_context_size": 4266,
            "input_context_percentage": 3.3333333333333335,
            "needle_depth": 0.1,
            "model_response": "Purple and white.",
            "context_with_needle": "..."
        }"#;
        let r: TestResult = serde_json::from_str(legacy).unwrap();
        assert_eq!(r.context_tokens, 4266);
        assert_eq!(r.context_with_needle.as_deref(), Some("..."));
        assert!(r.recorded_at.is_none());
        assert!(!r.is_failure());
    }

    #[test]
    fn test_missing_response_is_rejected() {
        let broken = r#"{"input_context_size": 1, "input_context_percentage": 1.0, "needle_depth": 0.1}"#;
        assert!(serde_json::from_str::<TestResult>(broken).is_err());
    }

    #[test]
    fn test_failed_marker() {
        let r = TestResult::failed(10, 10.0, 0.2, "gave up".into());
        assert!(r.is_failure());
        assert!(r.model_response.is_empty());
    }
}

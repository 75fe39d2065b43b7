//! Offline scoring of recorded responses.
//!
//! A response earns one point per expected keyword that appears as a whole
//! word (case-insensitive). With the default `purple`/`white` pair that gives
//! 0, 1 or 2 points.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{HaystackError, HaystackResult};
use crate::prompt::DEFAULT_KEYWORDS;
use crate::result::{ResultBatch, TestResult};

pub struct Scorer {
    keywords: Vec<Regex>,
}

impl Scorer {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> HaystackResult<Self> {
        if keywords.is_empty() {
            return Err(HaystackError::Config("scorer needs at least one keyword".into()));
        }
        if keywords.len() > u8::MAX as usize {
            return Err(HaystackError::Config("too many scoring keywords".into()));
        }
        let keywords = keywords
            .iter()
            .map(|kw| {
                let kw = kw.as_ref().trim().to_lowercase();
                if kw.is_empty() {
                    return Err(HaystackError::Config("empty scoring keyword".into()));
                }
                Regex::new(&format!(r"\b{}\b", regex::escape(&kw)))
                    .map_err(|e| HaystackError::Config(format!("bad keyword {kw:?}: {e}")))
            })
            .collect::<HaystackResult<Vec<_>>>()?;
        Ok(Self { keywords })
    }

    pub fn max_points(&self) -> u8 {
        self.keywords.len() as u8
    }

    pub fn points(&self, response: &str) -> u8 {
        let lower = response.to_lowercase();
        self.keywords
            .iter()
            .filter(|re| re.is_match(&lower))
            .count() as u8
    }

    /// Score every record and drop the injected context. Records keep their
    /// order; rescoring an already scored batch gives the same points.
    pub fn score(&self, batch: &[TestResult]) -> ResultBatch {
        batch
            .iter()
            .map(|r| TestResult {
                points: Some(self.points(&r.model_response)),
                context_with_needle: None,
                ..r.clone()
            })
            .collect()
    }

    /// Score raw JSON records. A record that does not carry the required
    /// fields (most importantly `model_response`) means the store is corrupt.
    pub fn score_json(&self, raw: &str) -> HaystackResult<ResultBatch> {
        let values: Vec<serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| HaystackError::Corrupt(format!("not a JSON array of results: {e}")))?;
        let batch = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                serde_json::from_value::<TestResult>(v)
                    .map_err(|e| HaystackError::Corrupt(format!("record {i}: {e}")))
            })
            .collect::<HaystackResult<Vec<_>>>()?;
        Ok(self.score(&batch))
    }
}

impl Default for Scorer {
    fn default() -> Self {
        let keywords = DEFAULT_KEYWORDS
            .iter()
            .map(|kw| Regex::new(&format!(r"\b{kw}\b")).expect("static keyword pattern"))
            .collect();
        Self { keywords }
    }
}

/// Mean points over a scored batch, overall and along each grid axis.
#[derive(Debug, Clone, Default)]
pub struct ScoreSummary {
    pub total: usize,
    pub failed: usize,
    pub mean_points: f64,
    /// Keyed by context percentage (rounded to 0.01), ascending.
    pub by_context: BTreeMap<u64, (f64, usize)>,
    /// Keyed by depth in thousandths, ascending.
    pub by_depth: BTreeMap<u64, (f64, usize)>,
}

impl ScoreSummary {
    pub fn from_batch(batch: &[TestResult]) -> Self {
        let mut summary = Self {
            total: batch.len(),
            ..Default::default()
        };
        let mut sum = 0u64;
        let mut ctx: BTreeMap<u64, (u64, usize)> = BTreeMap::new();
        let mut depth: BTreeMap<u64, (u64, usize)> = BTreeMap::new();

        for r in batch {
            if r.is_failure() {
                summary.failed += 1;
            }
            let p = u64::from(r.points.unwrap_or(0));
            sum += p;
            let c = ctx
                .entry((r.context_percentage * 100.0).round() as u64)
                .or_default();
            c.0 += p;
            c.1 += 1;
            let d = depth
                .entry((r.needle_depth * 1000.0).round() as u64)
                .or_default();
            d.0 += p;
            d.1 += 1;
        }

        if !batch.is_empty() {
            summary.mean_points = sum as f64 / batch.len() as f64;
        }
        let mean = |(s, n): (u64, usize)| (s as f64 / n as f64, n);
        summary.by_context = ctx.into_iter().map(|(k, v)| (k, mean(v))).collect();
        summary.by_depth = depth.into_iter().map(|(k, v)| (k, mean(v))).collect();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(response: &str) -> TestResult {
        let mut r = TestResult::new(1000, 50.0, 0.5, response.into());
        r.context_with_needle = Some("a very long context".into());
        r
    }

    #[test]
    fn test_points_table() {
        let scorer = Scorer::default();
        assert_eq!(scorer.points("the logo is purple and white"), 2);
        assert_eq!(scorer.points("it's purple"), 1);
        assert_eq!(scorer.points("no idea"), 0);
        assert_eq!(scorer.points("whitewash"), 0);
        assert_eq!(scorer.points("PURPLE, White."), 2);
        assert_eq!(scorer.points("purplish off-white"), 1);
    }

    #[test]
    fn test_score_strips_context() {
        let scored = Scorer::default().score(&[record("Purple and White")]);
        assert_eq!(scored[0].points, Some(2));
        assert!(scored[0].context_with_needle.is_none());
        let json = serde_json::to_value(&scored[0]).unwrap();
        assert!(json.get("context_with_needle").is_none());
        assert_eq!(json["points"], 2);
    }

    #[test]
    fn test_score_is_idempotent() {
        let scorer = Scorer::default();
        let batch = vec![record("purple"), record("white and purple"), record("nope")];
        let once = scorer.score(&batch);
        let twice = scorer.score(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_custom_keywords_are_escaped() {
        let scorer = Scorer::new(&["c++", "2019"]).unwrap();
        assert_eq!(scorer.max_points(), 2);
        assert_eq!(scorer.points("since 2019"), 1);
        assert!(Scorer::new::<&str>(&[]).is_err());
        assert!(Scorer::new(&["  "]).is_err());
    }

    #[test]
    fn test_score_json_missing_response_is_corrupt() {
        let raw = r#"[{"input_context_size": 10, "input_context_percentage": 10.0, "needle_depth": 0.1}]"#;
        let err = Scorer::default().score_json(raw).unwrap_err();
        assert!(matches!(err, HaystackError::Corrupt(_)));
    }

    #[test]
    fn test_score_json_legacy_file() {
        let raw = r#"[
            {"input_context_size": 10, "input_context_percentage": 10.0, "needle_depth": 0.1,
             "model_response": "Purple and white.", "context_with_needle": "xx"}
        ]"#;
        let scored = Scorer::default().score_json(raw).unwrap();
        assert_eq!(scored[0].points, Some(2));
        assert!(scored[0].context_with_needle.is_none());
    }

    #[test]
    fn test_summary() {
        let scorer = Scorer::default();
        let mut a = record("purple and white");
        a.needle_depth = 0.1;
        let mut b = record("purple");
        b.needle_depth = 0.2;
        let c = TestResult::failed(1000, 50.0, 0.2, "gave up".into());
        let scored = scorer.score(&[a, b, c]);

        let summary = ScoreSummary::from_batch(&scored);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 1);
        assert!((summary.mean_points - 1.0).abs() < 1e-9);
        assert_eq!(summary.by_context.get(&5000), Some(&(1.0, 3)));
        assert_eq!(summary.by_depth.get(&100), Some(&(2.0, 1)));
        assert_eq!(summary.by_depth.get(&200), Some(&(0.5, 2)));
    }
}

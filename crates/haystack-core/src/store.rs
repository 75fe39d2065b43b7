use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{HaystackError, HaystackResult};
use crate::result::{ResultBatch, TestResult};

/// Durable, append-only record of results, one batch per `store_id`.
///
/// Implementations never reorder, deduplicate or drop prior entries.
pub trait ResultStore: Send + Sync {
    fn load(&self, store_id: &str) -> HaystackResult<ResultBatch>;
    fn append(&self, store_id: &str, result: &TestResult) -> HaystackResult<()>;
    /// Replace a whole batch. Used for derived outputs such as scored batches.
    fn save(&self, store_id: &str, batch: &ResultBatch) -> HaystackResult<()>;

    fn count(&self, store_id: &str) -> HaystackResult<usize> {
        Ok(self.load(store_id)?.len())
    }
}

/// Process-local store, for tests and dry runs.
#[derive(Default)]
pub struct MemoryResultStore {
    batches: Mutex<HashMap<String, ResultBatch>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn load(&self, store_id: &str) -> HaystackResult<ResultBatch> {
        let batches = self
            .batches
            .lock()
            .map_err(|_| HaystackError::Store("store lock poisoned".into()))?;
        Ok(batches.get(store_id).cloned().unwrap_or_default())
    }

    fn append(&self, store_id: &str, result: &TestResult) -> HaystackResult<()> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| HaystackError::Store("store lock poisoned".into()))?;
        batches
            .entry(store_id.to_string())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    fn save(&self, store_id: &str, batch: &ResultBatch) -> HaystackResult<()> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| HaystackError::Store("store lock poisoned".into()))?;
        batches.insert(store_id.to_string(), batch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(depth: f64) -> TestResult {
        TestResult::new(100, 10.0, depth, format!("answer {depth}"))
    }

    #[test]
    fn test_append_preserves_order() {
        let store = MemoryResultStore::new();
        let (r1, r2, r3) = (result(0.1), result(0.2), result(0.3));
        store.append("m", &r1).unwrap();
        store.append("m", &r2).unwrap();
        store.append("m", &r3).unwrap();
        assert_eq!(store.load("m").unwrap(), vec![r1, r2, r3]);
        assert_eq!(store.count("m").unwrap(), 3);
    }

    #[test]
    fn test_batches_are_separate() {
        let store = MemoryResultStore::new();
        store.append("a", &result(0.1)).unwrap();
        assert_eq!(store.count("a").unwrap(), 1);
        assert_eq!(store.count("b").unwrap(), 0);
    }
}

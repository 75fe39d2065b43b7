use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use haystack_core::{HaystackError, HaystackResult, ResultBatch, ResultStore, TestResult};

/// One pretty-printed JSON array per model, under a single directory.
///
/// `append` is a read-modify-write of the whole file. It is serialized by a
/// lock held across the read and the write, and the new contents go through a
/// temp file + rename so readers never see a half-written batch. Two processes
/// writing the same model's file are still not coordinated.
pub struct JsonFileStore {
    dir: PathBuf,
    suffix: String,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: &Path) -> HaystackResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            HaystackError::Store(format!("cannot create output dir {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            suffix: "results".into(),
            write_lock: Mutex::new(()),
        })
    }

    /// Files are named `<model>_<suffix>.json`. Defaults to `results`.
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.suffix = suffix.to_string();
        self
    }

    pub fn path(&self, store_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", sanitize_model_id(store_id), self.suffix))
    }

    pub fn read_batch(path: &Path) -> HaystackResult<ResultBatch> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| HaystackError::Store(format!("cannot read {}: {e}", path.display())))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| HaystackError::Corrupt(format!("{}: {e}", path.display())))
    }

    pub fn write_batch(path: &Path, batch: &[TestResult]) -> HaystackResult<()> {
        let json = serde_json::to_string_pretty(batch)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json)
            .map_err(|e| HaystackError::Store(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path).map_err(|e| {
            HaystackError::Store(format!("cannot replace {}: {e}", path.display()))
        })?;
        Ok(())
    }

    fn lock(&self) -> HaystackResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| HaystackError::Store("write lock poisoned".into()))
    }
}

/// Reduce a model identifier to a safe file stem: keep the last `/` segment
/// (`accounts/fireworks/models/llama-v3p1` → `llama-v3p1`) and replace any
/// remaining path or drive separators.
pub fn sanitize_model_id(model: &str) -> String {
    let last = model.rsplit('/').next().unwrap_or(model);
    let cleaned: String = last
        .chars()
        .map(|c| match c {
            '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "model".into(),
        _ => cleaned,
    }
}

impl ResultStore for JsonFileStore {
    fn load(&self, store_id: &str) -> HaystackResult<ResultBatch> {
        Self::read_batch(&self.path(store_id))
    }

    fn append(&self, store_id: &str, result: &TestResult) -> HaystackResult<()> {
        let _guard = self.lock()?;
        let path = self.path(store_id);
        let mut batch = Self::read_batch(&path)?;
        batch.push(result.clone());
        Self::write_batch(&path, &batch)?;
        debug!(path = %path.display(), len = batch.len(), "result appended");
        Ok(())
    }

    fn save(&self, store_id: &str, batch: &ResultBatch) -> HaystackResult<()> {
        let _guard = self.lock()?;
        Self::write_batch(&self.path(store_id), batch)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn result(depth: f64) -> TestResult {
        let mut r = TestResult::new(500, 25.0, depth, format!("answer at {depth}"));
        r.recorded_at = None;
        r
    }

    #[test]
    fn test_sanitize_model_id() {
        assert_eq!(
            sanitize_model_id("accounts/fireworks/models/llama-v3p1-405b-instruct"),
            "llama-v3p1-405b-instruct"
        );
        assert_eq!(sanitize_model_id("gpt-4o"), "gpt-4o");
        assert_eq!(sanitize_model_id("C:\\models\\x"), "C__models_x");
        assert_eq!(sanitize_model_id("trailing/"), "model");
        assert_eq!(sanitize_model_id(".."), "model");
    }

    #[test]
    fn test_path_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        assert_eq!(
            store.path("meta-llama/Meta-Llama-3.1-405B-Instruct-Turbo"),
            dir.path().join("Meta-Llama-3.1-405B-Instruct-Turbo_results.json")
        );
        let scored = JsonFileStore::new(dir.path()).unwrap().with_suffix("scored");
        assert_eq!(scored.path("gpt-4o"), dir.path().join("gpt-4o_scored.json"));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        assert!(store.load("nobody").unwrap().is_empty());
        assert_eq!(store.count("nobody").unwrap(), 0);
    }

    #[test]
    fn test_append_order_and_durability() {
        let dir = tempfile::tempdir().unwrap();
        let (r1, r2, r3) = (result(0.1), result(0.2), result(0.3));
        {
            let store = JsonFileStore::new(dir.path()).unwrap();
            store.append("gpt-4o", &r1).unwrap();
            store.append("gpt-4o", &r2).unwrap();
        }
        // a fresh instance sees what the first one wrote
        let store = JsonFileStore::new(dir.path()).unwrap();
        store.append("gpt-4o", &r3).unwrap();
        assert_eq!(store.load("gpt-4o").unwrap(), vec![r1, r2, r3]);

        let raw = fs::read_to_string(store.path("gpt-4o")).unwrap();
        assert!(raw.starts_with("[\n  {"));
        assert!(!dir.path().join("gpt-4o_results.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        fs::write(store.path("m"), "{not json").unwrap();
        assert!(matches!(store.load("m"), Err(HaystackError::Corrupt(_))));
        assert!(store.append("m", &result(0.1)).is_err());
        // the broken file is left as found
        assert_eq!(fs::read_to_string(store.path("m")).unwrap(), "{not json");
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..5u32 {
                        store.append("m", &result(f64::from(t * 10 + i))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.count("m").unwrap(), 40);
    }

    #[test]
    fn test_save_replaces_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap().with_suffix("scored");
        store.save("m", &vec![result(0.1), result(0.2)]).unwrap();
        store.save("m", &vec![result(0.3)]).unwrap();
        assert_eq!(store.load("m").unwrap(), vec![result(0.3)]);
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use pawchat_types::{ChatError, ChatResult};

/// Synchronous string-keyed get/set store.
///
/// The contract is `get(key) -> Option<String>` / `set(key, value)`;
/// callers serialize whole collections into a single value per key, so
/// every write is an atomic overwrite from the store's point of view.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> ChatResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ChatResult<()>;
}

/// In-memory store for tests and ephemeral sessions.
///
/// Writes can be switched off to model disabled/full storage.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
    writes: Mutex<usize>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with `PersistenceUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `set` calls that have landed.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> ChatResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ChatResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ChatError::PersistenceUnavailable(
                "storage disabled".to_string(),
            ));
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Durable store keeping one `<key>.json` document per collection key.
#[derive(Debug)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Create the backing directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> ChatResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| ChatError::PersistenceUnavailable(e.to_string()))?;
        }
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are collection names; keep file names filesystem-safe.
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> ChatResult<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| ChatError::PersistenceUnavailable(e.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> ChatResult<()> {
        fs::write(self.path_for(key), value)
            .map_err(|e| ChatError::PersistenceUnavailable(e.to_string()))
    }
}

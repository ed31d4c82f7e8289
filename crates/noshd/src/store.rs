//! Durable store for pending clarifications.
//!
//! One record per user, persisted to a JSON state file after every
//! mutation. The file is rewritten whole via write-to-temp-then-rename so
//! a crash mid-write never leaves a torn state visible after restart. If a
//! durable write fails, the in-memory mutation is rolled back: memory and
//! disk never diverge.

use nosh_common::{NoshError, PendingClarification, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type StateMap = HashMap<i64, PendingClarification>;

/// Durable medium behind the store. The file implementation is used in
/// production; `MemorySink` backs tests, mirroring the real sink's
/// failure surface.
pub trait StateSink: Send + Sync {
    fn load(&self) -> Result<StateMap>;
    fn save(&self, state: &StateMap) -> Result<()>;
}

/// Whole-state JSON file with atomic replacement.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl StateSink for FileSink {
    fn load(&self) -> Result<StateMap> {
        if !self.path.exists() {
            return Ok(StateMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        let state: StateMap = serde_json::from_str(&contents)?;
        Ok(state)
    }

    fn save(&self, state: &StateMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| NoshError::Persistence(e.to_string()))?;
            }
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| NoshError::Persistence(e.to_string()))?;

        // Write to temp file then rename (atomic)
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|e| NoshError::Persistence(e.to_string()))?;
        fs::rename(&temp_path, &self.path).map_err(|e| NoshError::Persistence(e.to_string()))?;

        Ok(())
    }
}

/// In-memory sink with a switchable failure mode, for tests.
#[derive(Default)]
pub struct MemorySink {
    state: std::sync::Mutex<StateMap>,
    fail_saves: std::sync::atomic::AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail, until switched back.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn saved_len(&self) -> usize {
        self.state.lock().unwrap().len()
    }
}

impl StateSink for MemorySink {
    fn load(&self) -> Result<StateMap> {
        Ok(self.state.lock().unwrap().clone())
    }

    fn save(&self, state: &StateMap) -> Result<()> {
        if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NoshError::Persistence("simulated sink failure".into()));
        }
        *self.state.lock().unwrap() = state.clone();
        Ok(())
    }
}

/// Outcome of an evicting lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// No record for this user.
    Missing,
    /// A record existed but was past expiry; it has been evicted.
    Expired,
    Active(PendingClarification),
}

/// Keyed store holding at most one pending clarification per user.
///
/// The map and sink are guarded by one async mutex; per-user mutual
/// exclusion across the whole analyze-then-persist sequence lives in the
/// handlers layer.
pub struct ClarificationStore {
    inner: Mutex<StateMap>,
    sink: Arc<dyn StateSink>,
}

impl ClarificationStore {
    /// Open the store, loading any persisted state. An unreadable state
    /// file is logged and treated as empty rather than refusing to start.
    pub fn open(sink: Arc<dyn StateSink>) -> Self {
        let state = match sink.load() {
            Ok(state) => {
                if !state.is_empty() {
                    info!("Loaded {} pending clarification(s) from disk", state.len());
                }
                state
            }
            Err(e) => {
                warn!("Could not load clarification state, starting empty: {}", e);
                StateMap::new()
            }
        };

        Self {
            inner: Mutex::new(state),
            sink,
        }
    }

    /// Evicting lookup: an expired record is removed (and the removal
    /// persisted) before `Expired` is reported.
    pub async fn lookup(&self, user_id: i64) -> Result<Lookup> {
        let mut state = self.inner.lock().await;
        match state.get(&user_id) {
            None => Ok(Lookup::Missing),
            Some(record) if record.is_expired() => {
                let removed = state.remove(&user_id).unwrap();
                if let Err(e) = self.sink.save(&state) {
                    state.insert(user_id, removed);
                    return Err(e);
                }
                debug!("Evicted expired clarification for user {}", user_id);
                Ok(Lookup::Expired)
            }
            Some(record) => Ok(Lookup::Active(record.clone())),
        }
    }

    /// Non-evicting read with the same expiry test, for read-only paths
    /// like `status`. An expired record reads as absent; eviction is left
    /// to `lookup` and the sweep.
    pub async fn peek(&self, user_id: i64) -> Option<PendingClarification> {
        let state = self.inner.lock().await;
        state
            .get(&user_id)
            .filter(|record| !record.is_expired())
            .cloned()
    }

    /// Create the pending record for a user. Fails with `Conflict` if a
    /// non-expired record already exists; an expired leftover is evicted
    /// as part of the same durable write.
    pub async fn put(&self, record: PendingClarification) -> Result<()> {
        let user_id = record.user_id;
        let mut state = self.inner.lock().await;

        if let Some(existing) = state.get(&user_id) {
            if !existing.is_expired() {
                return Err(NoshError::Conflict(user_id));
            }
        }

        let previous = state.insert(user_id, record);
        if let Err(e) = self.sink.save(&state) {
            match previous {
                Some(prev) => {
                    state.insert(user_id, prev);
                }
                None => {
                    state.remove(&user_id);
                }
            }
            return Err(e);
        }

        debug!("Stored pending clarification for user {}", user_id);
        Ok(())
    }

    /// Remove a user's record. Idempotent; returns whether one was present.
    pub async fn remove(&self, user_id: i64) -> Result<bool> {
        let mut state = self.inner.lock().await;
        match state.remove(&user_id) {
            None => Ok(false),
            Some(removed) => {
                if let Err(e) = self.sink.save(&state) {
                    state.insert(user_id, removed);
                    return Err(e);
                }
                debug!("Removed pending clarification for user {}", user_id);
                Ok(true)
            }
        }
    }

    /// Eager sweep: evict everything past expiry in one durable write.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let mut state = self.inner.lock().await;
        let now = chrono::Utc::now();
        let expired: Vec<i64> = state
            .iter()
            .filter(|(_, record)| record.is_expired_at(now))
            .map(|(user_id, _)| *user_id)
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let mut removed = Vec::with_capacity(expired.len());
        for user_id in &expired {
            if let Some(record) = state.remove(user_id) {
                removed.push(record);
            }
        }

        if let Err(e) = self.sink.save(&state) {
            for record in removed {
                state.insert(record.user_id, record);
            }
            return Err(e);
        }

        info!("Cleaned up {} expired clarification(s)", expired.len());
        Ok(expired.len())
    }

    /// Number of records currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

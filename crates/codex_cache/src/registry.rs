//! Maps session keys to their stores.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use codex_config::CodexConfig;
use tracing::info;

use crate::error::CacheError;
use crate::session::{list_sessions, load_session, save_session};
use crate::store::CacheStore;

type StoreFactory = dyn Fn() -> CacheStore + Send + Sync;

/// Owns one [`CacheStore`] per live session.
///
/// Stores are created on first use and dropped by [`teardown`](Self::teardown).
/// Callers hold `Arc` handles, so a torn-down store lives on until the last
/// in-flight request using it finishes. Saved sessions go under `save_dir`.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<CacheStore>>>,
    factory: Box<StoreFactory>,
    save_dir: PathBuf,
}

impl SessionRegistry {
    /// Creates a registry whose stores are built by `factory`.
    ///
    /// Sessions are saved under the current directory until
    /// [`with_save_dir`](Self::with_save_dir) says otherwise.
    pub fn new(factory: impl Fn() -> CacheStore + Send + Sync + 'static) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
            save_dir: PathBuf::from("."),
        }
    }

    /// Creates a registry from `[cache]` and `[session]`.
    pub fn from_config(config: &CodexConfig) -> Self {
        let cache = config.cache.clone();
        Self::new(move || CacheStore::from_config(&cache))
            .with_save_dir(&config.session.save_dir)
    }

    /// Sets the directory holding the `sessions/` tree.
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    /// Directory sessions are saved under.
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<CacheStore>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the store for `key`, creating an empty one if needed.
    pub fn session(&self, key: &str) -> Arc<CacheStore> {
        let mut sessions = self.sessions();
        if let Some(store) = sessions.get(key) {
            return Arc::clone(store);
        }
        info!(session = key, "opened session");
        let store = Arc::new((self.factory)());
        sessions.insert(key.to_string(), Arc::clone(&store));
        store
    }

    /// Returns the store for `key` if the session is live.
    pub fn get(&self, key: &str) -> Option<Arc<CacheStore>> {
        self.sessions().get(key).cloned()
    }

    /// Drops the session, returning whether it existed.
    pub fn teardown(&self, key: &str) -> bool {
        let removed = self.sessions().remove(key).is_some();
        if removed {
            info!(session = key, "tore down session");
        }
        removed
    }

    /// Keys of all live sessions, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sessions().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Saves the live session `key` as `name`.
    pub fn save(&self, key: &str, name: &str, overwrite: bool) -> Result<PathBuf, CacheError> {
        let store = self
            .get(key)
            .ok_or_else(|| CacheError::not_found("session", key))?;
        save_session(&self.save_dir, name, &store, overwrite)
    }

    /// Replaces session `key` with the saved session `name`.
    pub fn load(&self, key: &str, name: &str) -> Result<Arc<CacheStore>, CacheError> {
        let template = (self.factory)();
        let store = Arc::new(load_session(&self.save_dir, name, &template)?);
        self.sessions().insert(key.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Names of the sessions saved under the save directory.
    pub fn saved(&self) -> Result<Vec<String>, CacheError> {
        list_sessions(&self.save_dir)
    }
}

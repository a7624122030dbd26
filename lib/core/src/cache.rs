use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use crate::Result;

/// `(model_id, version)`
pub type CacheKey = (String, String);

type Slot<T> = Arc<CacheSlot<T>>;

/// Loaded value plus a load gate. Hits only take the value read lock; the
/// gate serializes first loads of the key.
struct CacheSlot<T> {
    value: RwLock<Option<Arc<T>>>,
    gate: Mutex<()>,
}

impl<T> Default for CacheSlot<T> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
            gate: Mutex::new(()),
        }
    }
}

impl<T> CacheSlot<T> {
    fn loaded(&self) -> Option<Arc<T>> {
        self.value.read().clone()
    }
}

/// Process-wide memo of loaded models keyed by `(model_id, version)`.
///
/// Entries are written once and never mutated; readers share them through
/// `Arc`. Hits take only a per-key read lock. Each key also owns a load gate:
/// concurrent first requests for the same key wait on it and observe the
/// single loaded instance, while loads of other keys proceed in parallel.
/// The outer map lock is only held long enough to find or create a slot,
/// never across a load.
///
/// There is no automatic eviction. A new version is a new key, so old and new
/// versions coexist until [`ModelCache::evict`] is called.
pub struct ModelCache<T> {
    slots: RwLock<HashMap<CacheKey, Slot<T>>>,
}

impl<T> Default for ModelCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ModelCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, model_id: &str, version: &str) -> Slot<T> {
        let key = (model_id.to_string(), version.to_string());
        if let Some(slot) = self.slots.read().get(&key) {
            return slot.clone();
        }
        self.slots.write().entry(key).or_default().clone()
    }

    /// Return the cached model or run `loader` to produce it.
    ///
    /// `loader` runs at most once per key as long as it succeeds. A failed
    /// load leaves the slot empty so a later call can retry.
    pub fn get_or_load<F>(&self, model_id: &str, version: &str, loader: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let slot = self.slot(model_id, version);
        if let Some(model) = slot.loaded() {
            return Ok(model);
        }

        let _gate = slot.gate.lock();
        if let Some(model) = slot.loaded() {
            return Ok(model);
        }

        tracing::info!(model_id, version, "loading model into cache");
        let model = Arc::new(loader()?);
        *slot.value.write() = Some(model.clone());
        Ok(model)
    }

    /// Cached model without loading. Does not wait on an in-flight load.
    pub fn get(&self, model_id: &str, version: &str) -> Option<Arc<T>> {
        let key = (model_id.to_string(), version.to_string());
        let slot = self.slots.read().get(&key)?.clone();
        slot.loaded()
    }

    /// Drop a cached version. Readers holding the `Arc` keep their copy.
    pub fn evict(&self, model_id: &str, version: &str) -> bool {
        let key = (model_id.to_string(), version.to_string());
        self.slots.write().remove(&key).is_some()
    }

    /// Keys with a loaded model
    pub fn keys(&self) -> Vec<CacheKey> {
        self.slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.value.read().is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

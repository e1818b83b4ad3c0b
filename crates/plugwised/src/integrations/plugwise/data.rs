use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use super::client::SmileClient;
use super::platforms::Platform;
use super::updater::SmileDataUpdater;

/// Everything one loaded config entry owns.
pub struct EntryData {
    pub client: Arc<dyn SmileClient>,
    pub updater: Arc<SmileDataUpdater>,
    /// Platforms forwarded for this entry, unloaded again on entry unload
    pub platforms: Vec<Platform>,
}

/// Per-domain registry of loaded entries, keyed by config entry id.
#[derive(Default)]
pub struct PlugwiseData {
    entries: Mutex<HashMap<String, Arc<EntryData>>>,
}

impl PlugwiseData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry_id: impl Into<String>, data: Arc<EntryData>) {
        self.lock().insert(entry_id.into(), data);
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<EntryData>> {
        self.lock().get(entry_id).cloned()
    }

    pub fn remove(&self, entry_id: &str) -> Option<Arc<EntryData>> {
        self.lock().remove(entry_id)
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.lock().contains_key(entry_id)
    }

    /// Loaded entry ids, sorted
    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The updater of every loaded entry, ordered by entry id.
    pub fn updaters(&self) -> Vec<(String, Arc<SmileDataUpdater>)> {
        let mut updaters: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, data)| (id.clone(), data.updater.clone()))
            .collect();
        updaters.sort_by(|a, b| a.0.cmp(&b.0));
        updaters
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<EntryData>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

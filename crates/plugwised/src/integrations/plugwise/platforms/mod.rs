pub mod binary_sensor;
pub mod climate;
pub mod sensor;
pub mod switch;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use anyhow::bail;
use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::data::EntryData;
use super::entity::EntityIds;
use super::entity::PlugwiseEntity;
use super::updater::ListenerId;
use super::updater::SmileDataUpdater;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    BinarySensor,
    Climate,
    Sensor,
    Switch,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::BinarySensor => "binary_sensor",
            Platform::Climate => "climate",
            Platform::Sensor => "sensor",
            Platform::Switch => "switch",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platforms for gateways without heating control (P1 energy meters)
pub const SENSOR_PLATFORMS: &[Platform] = &[Platform::Sensor];

/// Platforms for gateways with heating control
pub const CLIMATE_PLATFORMS: &[Platform] = &[
    Platform::BinarySensor,
    Platform::Climate,
    Platform::Sensor,
    Platform::Switch,
];

/// Pick the platform set from the gateway's master thermostat capability.
pub fn platforms_for(single_master_thermostat: Option<bool>) -> Vec<Platform> {
    match single_master_thermostat {
        None => SENSOR_PLATFORMS.to_vec(),
        Some(_) => CLIMATE_PLATFORMS.to_vec(),
    }
}

/// Loads and unloads entity platforms for config entries.
#[async_trait]
pub trait PlatformForwarder: Send + Sync {
    /// Set up `platform` for a loaded entry
    async fn setup(
        &self,
        platform: Platform,
        entry_id: &str,
        entry: Arc<EntryData>,
    ) -> anyhow::Result<()>;

    /// Unload `platform` for an entry. Returns whether the unload succeeded.
    async fn unload(&self, platform: Platform, entry_id: &str) -> bool;
}

struct LoadedPlatform {
    updater: Arc<SmileDataUpdater>,
    entities: Vec<(String, ListenerId)>,
}

/// A platform stays on record after an unload attempt, so retrying the unload of its entry
/// succeeds.
enum PlatformRecord {
    Loaded(LoadedPlatform),
    Unloaded,
}

/// Creates entities from the gateway's device list and subscribes them to the entry's updater.
pub struct EntityPlatforms {
    tx: FromIntegrationSender,
    integration_name: String,
    ids: EntityIds,
    records: Mutex<HashMap<(String, Platform), PlatformRecord>>,
}

impl EntityPlatforms {
    pub fn new(tx: FromIntegrationSender, integration_name: impl Into<String>) -> Self {
        Self {
            tx,
            integration_name: integration_name.into(),
            ids: EntityIds::default(),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Entity ids currently loaded for `platform` of an entry
    #[cfg(test)]
    pub fn entity_ids(&self, platform: Platform, entry_id: &str) -> Vec<String> {
        match self.lock().get(&(entry_id.to_string(), platform)) {
            Some(PlatformRecord::Loaded(loaded)) => {
                loaded.entities.iter().map(|(id, _)| id.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Listeners currently subscribed for `platform` of an entry
    #[cfg(test)]
    pub fn listeners(&self, platform: Platform, entry_id: &str) -> Vec<ListenerId> {
        match self.lock().get(&(entry_id.to_string(), platform)) {
            Some(PlatformRecord::Loaded(loaded)) => {
                loaded.entities.iter().map(|(_, listener)| *listener).collect()
            }
            _ => Vec::new(),
        }
    }

    fn build_entities(
        &self,
        platform: Platform,
        entry: &EntryData,
    ) -> Vec<Arc<dyn PlugwiseEntity>> {
        let client = &entry.client;
        let devices = client.devices();
        match platform {
            Platform::BinarySensor => {
                binary_sensor::entities(client, &devices, &self.tx, &self.ids)
            }
            Platform::Climate => climate::entities(client, &devices, &self.tx, &self.ids),
            Platform::Sensor => sensor::entities(client, &devices, &self.tx, &self.ids),
            Platform::Switch => switch::entities(client, &devices, &self.tx, &self.ids),
        }
    }

    async fn send(&self, msg: FromIntegrationMessage) {
        if let Err(e) = self.tx.send(msg).await {
            warn!("Failed to send message to engine: {}", e);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, Platform), PlatformRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PlatformForwarder for EntityPlatforms {
    async fn setup(
        &self,
        platform: Platform,
        entry_id: &str,
        entry: Arc<EntryData>,
    ) -> anyhow::Result<()> {
        let key = (entry_id.to_string(), platform);
        let already_loaded = matches!(self.lock().get(&key), Some(PlatformRecord::Loaded(_)));
        if already_loaded {
            bail!("platform {} already loaded for entry {}", platform, entry_id);
        }

        let entities = self.build_entities(platform, &entry);
        info!(
            "Setting up {} {} entities for entry {}",
            entities.len(),
            platform,
            entry_id
        );

        let mut subscribed = Vec::with_capacity(entities.len());
        for entity in entities {
            let entity_id = entity.entity_id().to_string();
            debug!("Discovered {} ({})", entity_id, entity.base().name);
            self.send(FromIntegrationMessage::EntityDiscovered {
                entity_id: entity_id.clone(),
                integration_name: self.integration_name.clone(),
                name: entity.base().name.clone(),
                unique_id: entity.base().unique_id.clone(),
                device_class: entity.device_class().map(str::to_string),
            })
            .await;

            entity.update_state();
            let listener_entity = entity.clone();
            let listener = entry
                .updater
                .add_listener(Arc::new(move || listener_entity.update_state()));
            subscribed.push((entity_id, listener));
        }

        self.lock().insert(
            key,
            PlatformRecord::Loaded(LoadedPlatform {
                updater: entry.updater.clone(),
                entities: subscribed,
            }),
        );
        Ok(())
    }

    async fn unload(&self, platform: Platform, entry_id: &str) -> bool {
        let key = (entry_id.to_string(), platform);
        let record = self.lock().insert(key.clone(), PlatformRecord::Unloaded);
        let loaded = match record {
            Some(PlatformRecord::Loaded(loaded)) => loaded,
            Some(PlatformRecord::Unloaded) => {
                debug!("{} for entry {} is already unloaded", platform, entry_id);
                return true;
            }
            None => {
                self.lock().remove(&key);
                warn!(
                    "Cannot unload {} for entry {}: platform was never loaded",
                    platform, entry_id
                );
                return false;
            }
        };

        // Listeners that are already gone cannot be removed on a later attempt either
        let mut ok = true;
        for (entity_id, listener) in loaded.entities {
            if let Err(e) = loaded.updater.remove_listener(listener) {
                warn!("Failed to unsubscribe {}: {}", entity_id, e);
                ok = false;
            }
            self.ids.release(&entity_id);
            self.send(FromIntegrationMessage::EntityRemoved { entity_id })
                .await;
        }

        info!("Unloaded {} for entry {}", platform, entry_id);
        ok
    }
}

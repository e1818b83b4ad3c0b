use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use smile_api::DeviceData;
use tracing::warn;

use super::client::SmileClient;
use super::platforms::Platform;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;

/// Build an entity id such as `sensor.anna_temperature`.
///
/// The object id is the device name and key joined by `_`, lowercased, with every character
/// that is not ASCII alphanumeric replaced by `_`.
pub fn entity_id(platform: Platform, device_name: &str, key: &str) -> String {
    let object_id: String = format!("{}_{}", device_name, key)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.{}", platform, object_id)
}

/// Entity ids handed out to live entities, shared by every entry of the integration.
#[derive(Debug, Default)]
pub struct EntityIds {
    claimed: Mutex<HashSet<String>>,
}

impl EntityIds {
    /// Claim the id for `key` on a device. A taken id gets `_2`, `_3`, ... appended.
    pub fn claim(&self, platform: Platform, device_name: &str, key: &str) -> String {
        let base = entity_id(platform, device_name, key);
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);

        let mut candidate = base.clone();
        let mut suffix = 2;
        while claimed.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        claimed.insert(candidate.clone());
        candidate
    }

    /// Give an id back once its entity is removed
    pub fn release(&self, entity_id: &str) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entity_id);
    }
}

/// State shared by every Plugwise entity: identity plus the means to re-read the device and
/// report back to the engine.
pub struct EntityBase {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub device_id: String,
    client: Arc<dyn SmileClient>,
    tx: FromIntegrationSender,
}

impl EntityBase {
    pub fn new(
        platform: Platform,
        device: &DeviceData,
        key: &str,
        name: String,
        client: Arc<dyn SmileClient>,
        tx: FromIntegrationSender,
        ids: &EntityIds,
    ) -> Self {
        Self {
            entity_id: ids.claim(platform, &device.name, key),
            unique_id: format!("{}-{}", device.id, key),
            name,
            device_id: device.id.clone(),
            client,
            tx,
        }
    }

    /// Latest snapshot of the backing device
    pub fn device(&self) -> Option<DeviceData> {
        let device = self.client.device(&self.device_id);
        if device.is_none() {
            warn!(
                "Device {} for {} missing from gateway data",
                self.device_id, self.entity_id
            );
        }
        device
    }

    /// Queue a state report for the engine.
    ///
    /// Listeners run synchronously, so this never waits for channel capacity. A full channel drops
    /// the report; the next refresh sends a fresh one.
    pub fn report(&self, msg: FromIntegrationMessage) {
        if let Err(e) = self.tx.try_send(msg) {
            warn!("Failed to report state for {}: {}", self.entity_id, e);
        }
    }
}

/// An entity that re-reads its device after every gateway refresh.
pub trait PlugwiseEntity: Send + Sync {
    fn base(&self) -> &EntityBase;

    /// Re-read the device snapshot and report the current state.
    fn update_state(&self);

    fn entity_id(&self) -> &str {
        &self.base().entity_id
    }

    fn device_class(&self) -> Option<&str> {
        None
    }
}

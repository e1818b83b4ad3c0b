use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Serialize;
use tracing::debug;
use tracing::info;

/// A device in the plugwised system.
///
/// A device represents a physical gateway or appliance that one or more config entries expose
/// entities for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub identifiers: Vec<(String, String)>,
    pub config_entries: Vec<String>,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
}

/// Metadata an integration supplies when registering a device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
}

impl Device {
    fn new(id: String, config_entry_id: &str, info: DeviceInfo) -> Self {
        Self {
            id,
            identifiers: info.identifiers,
            config_entries: vec![config_entry_id.to_string()],
            name: info.name,
            manufacturer: info.manufacturer,
            model: info.model,
            sw_version: info.sw_version,
        }
    }

    fn matches(&self, identifiers: &[(String, String)]) -> bool {
        identifiers.iter().any(|i| self.identifiers.contains(i))
    }

    fn merge(&mut self, config_entry_id: &str, info: DeviceInfo) {
        if !self.config_entries.iter().any(|e| e == config_entry_id) {
            self.config_entries.push(config_entry_id.to_string());
        }
        for identifier in info.identifiers {
            if !self.identifiers.contains(&identifier) {
                self.identifiers.push(identifier);
            }
        }
        if !info.name.is_empty() {
            self.name = info.name;
        }
        if info.manufacturer.is_some() {
            self.manufacturer = info.manufacturer;
        }
        if info.model.is_some() {
            self.model = info.model;
        }
        if info.sw_version.is_some() {
            self.sw_version = info.sw_version;
        }
    }
}

/// Registry of every device known to the engine.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<Vec<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look a device up by any of its identifiers, merging the config entry and metadata into it,
    /// or create it if no identifier matches.
    pub fn get_or_create(&self, config_entry_id: &str, info: DeviceInfo) -> Device {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(device) = devices.iter_mut().find(|d| d.matches(&info.identifiers)) {
            debug!("Updating device {} for entry {}", device.id, config_entry_id);
            device.merge(config_entry_id, info);
            return device.clone();
        }

        let id = format!("{:016x}", devices.len() + 1);
        let device = Device::new(id, config_entry_id, info);
        info!(
            "Registered device {} ({}) for entry {}",
            device.name, device.id, config_entry_id
        );
        devices.push(device.clone());
        device
    }

    pub fn get(&self, id: &str) -> Option<Device> {
        let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        devices.iter().find(|d| d.id == id).cloned()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_info(sw_version: &str) -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![("plugwise".to_string(), "gw-1".to_string())],
            name: "Smile Anna".to_string(),
            manufacturer: Some("Plugwise".to_string()),
            model: Some("Smile Anna".to_string()),
            sw_version: Some(sw_version.to_string()),
        }
    }

    #[test]
    fn test_create_device() {
        let registry = DeviceRegistry::new();
        let device = registry.get_or_create("entry-1", gateway_info("4.0.15"));

        assert_eq!(device.config_entries, vec!["entry-1".to_string()]);
        assert_eq!(device.manufacturer.as_deref(), Some("Plugwise"));
        assert_eq!(registry.get(&device.id), Some(device));
    }

    #[test]
    fn test_merge_by_identifier() {
        let registry = DeviceRegistry::new();
        let first = registry.get_or_create("entry-1", gateway_info("4.0.15"));
        let second = registry.get_or_create("entry-2", gateway_info("4.1.0"));

        assert_eq!(first.id, second.id);
        assert_eq!(registry.devices().len(), 1);
        assert_eq!(
            second.config_entries,
            vec!["entry-1".to_string(), "entry-2".to_string()]
        );
        assert_eq!(second.sw_version.as_deref(), Some("4.1.0"));
    }

    #[test]
    fn test_distinct_identifiers() {
        let registry = DeviceRegistry::new();
        registry.get_or_create("entry-1", gateway_info("4.0.15"));

        let mut other = gateway_info("3.1.11");
        other.identifiers = vec![("plugwise".to_string(), "gw-2".to_string())];
        registry.get_or_create("entry-2", other);

        assert_eq!(registry.devices().len(), 2);
    }
}

use std::collections::HashMap;

use serde::Serialize;

use super::config_entry::ConfigEntryState;

/// Registration details of a discovered entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityInfo {
    pub integration: String,
    pub name: String,
    pub unique_id: String,
    pub device_class: Option<String>,
}

/// State of a numeric sensor entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SensorState {
    /// Latest reading, `None` when the device stopped reporting it.
    pub value: Option<f64>,

    pub unit: Option<String>,
}

/// State of a binary sensor entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BinarySensorState {
    pub on: bool,
}

/// State of a thermostat entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ClimateState {
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub min_temp: f64,
    pub max_temp: f64,
}

/// State of a relay switch entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SwitchState {
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigEntryStatus {
    pub domain: String,
    pub title: String,
    pub state: ConfigEntryState,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub entities: HashMap<String, EntityInfo>,
    pub sensors: HashMap<String, SensorState>,
    pub binary_sensors: HashMap<String, BinarySensorState>,
    pub climates: HashMap<String, ClimateState>,
    pub switches: HashMap<String, SwitchState>,
    pub config_entries: HashMap<String, ConfigEntryStatus>,
}

impl State {
    /// Drop every state recorded for `entity_id`.
    pub fn remove_entity(&mut self, entity_id: &str) {
        self.entities.remove(entity_id);
        self.sensors.remove(entity_id);
        self.binary_sensors.remove(entity_id);
        self.climates.remove(entity_id);
        self.switches.remove(entity_id);
    }
}

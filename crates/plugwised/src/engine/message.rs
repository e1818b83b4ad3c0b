//! Type-safe message system for plugwised
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use super::config_entry::ConfigEntryState;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
        /// Friendly name, e.g. "Anna Temperature"
        name: String,
        /// Stable id that survives renames, e.g. "<device id>-temperature"
        unique_id: String,
        device_class: Option<String>,
    },

    /// An entity was removed (platform unloaded, etc.)
    EntityRemoved { entity_id: String },

    /// A numeric sensor reported a new reading
    SensorStateChanged {
        entity_id: String,
        value: Option<f64>,
        unit: Option<String>,
    },

    /// A binary sensor's state changed (e.g., domestic hot water active)
    BinarySensorStateChanged { entity_id: String, on: bool },

    /// A thermostat reported its temperatures
    ClimateStateChanged {
        entity_id: String,
        current_temperature: Option<f64>,
        target_temperature: Option<f64>,
        min_temp: f64,
        max_temp: f64,
    },

    /// A relay switch's state changed
    SwitchStateChanged { entity_id: String, on: bool },

    /// A config entry moved through its lifecycle
    ConfigEntryStateChanged {
        entry_id: String,
        domain: String,
        title: String,
        state: ConfigEntryState,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone)]
pub enum ToIntegrationMessage {
    /// Unload one config entry while leaving the integration running
    UnloadEntry { entry_id: String },
}

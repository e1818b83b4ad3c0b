use std::sync::Arc;

use smile_api::DeviceData;
use tracing::debug;

use super::Platform;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::integrations::plugwise::client::SmileClient;
use crate::integrations::plugwise::entity::EntityBase;
use crate::integrations::plugwise::entity::EntityIds;
use crate::integrations::plugwise::entity::PlugwiseEntity;

const PERCENTAGE: &str = "%";
const UNIT_LUMEN: &str = "lm";
const TEMP_CELSIUS: &str = "°C";
const PRESSURE_BAR: &str = "bar";
const POWER_WATT: &str = "W";
const ENERGY_WATT_HOUR: &str = "Wh";
const VOLUME_CUBIC_METERS: &str = "m³";

/// How one measurement key is presented as a sensor entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<&'static str>,
    pub enabled_default: bool,
}

const fn desc(
    key: &'static str,
    name: &'static str,
    unit: &'static str,
    device_class: Option<&'static str>,
    enabled_default: bool,
) -> SensorDescription {
    SensorDescription {
        key,
        name,
        unit: Some(unit),
        device_class,
        enabled_default,
    }
}

const TEMPERATURE: Option<&str> = Some("temperature");
const POWER: Option<&str> = Some("power");

pub const THERMOSTAT_SENSORS: &[SensorDescription] = &[
    desc("battery", "Charge", PERCENTAGE, Some("battery"), true),
    desc("illuminance", "Illuminance", UNIT_LUMEN, Some("illuminance"), true),
    desc("outdoor_temperature", "Temperature", TEMP_CELSIUS, TEMPERATURE, true),
    desc("setpoint", "Temperature", TEMP_CELSIUS, TEMPERATURE, true),
    desc("temperature", "Temperature", TEMP_CELSIUS, TEMPERATURE, true),
    desc("temperature_difference", "Temperature", TEMP_CELSIUS, TEMPERATURE, false),
    desc("valve_position", "Valve Position", PERCENTAGE, None, true),
];

pub const AUX_DEV_SENSORS: &[SensorDescription] = &[
    desc("intended_boiler_temperature", "Temperature", TEMP_CELSIUS, TEMPERATURE, true),
    desc("modulation_level", "Heater Modulation Level", PERCENTAGE, None, false),
    desc("return_temperature", "Temperature", TEMP_CELSIUS, TEMPERATURE, false),
    desc("water_pressure", "Pressure", PRESSURE_BAR, Some("pressure"), true),
    desc("water_temperature", "Temperature", TEMP_CELSIUS, TEMPERATURE, true),
];

pub const ENERGY_SENSORS: &[SensorDescription] = &[
    desc("electricity_consumed", "Current Consumed Power", POWER_WATT, POWER, true),
    desc("electricity_produced", "Current Produced Power", POWER_WATT, POWER, true),
    desc("electricity_consumed_interval", "Consumed Power Interval", ENERGY_WATT_HOUR, POWER, true),
    desc(
        "electricity_consumed_peak_interval",
        "Consumed Power Interval",
        ENERGY_WATT_HOUR,
        POWER,
        true,
    ),
    desc(
        "electricity_consumed_off_peak_interval",
        "Consumed Power Interval (off peak)",
        ENERGY_WATT_HOUR,
        POWER,
        true,
    ),
    desc("electricity_produced_interval", "Produced Power Interval", ENERGY_WATT_HOUR, POWER, true),
    desc(
        "electricity_produced_peak_interval",
        "Produced Power Interval",
        ENERGY_WATT_HOUR,
        POWER,
        true,
    ),
    desc(
        "electricity_produced_off_peak_interval",
        "Produced Power Interval (off peak)",
        ENERGY_WATT_HOUR,
        POWER,
        true,
    ),
    desc(
        "electricity_consumed_off_peak_point",
        "Current Consumed Power (off peak)",
        POWER_WATT,
        POWER,
        true,
    ),
    desc("electricity_consumed_peak_point", "Current Consumed Power", POWER_WATT, POWER, true),
    desc(
        "electricity_consumed_off_peak_cumulative",
        "Cumulative Consumed Power (off peak)",
        ENERGY_WATT_HOUR,
        POWER,
        true,
    ),
    desc(
        "electricity_consumed_peak_cumulative",
        "Cumulative Consumed Power",
        ENERGY_WATT_HOUR,
        POWER,
        true,
    ),
    desc(
        "electricity_produced_off_peak_point",
        "Current Produced Power (off peak)",
        POWER_WATT,
        POWER,
        true,
    ),
    desc("electricity_produced_peak_point", "Current Produced Power", POWER_WATT, POWER, true),
    desc(
        "electricity_produced_off_peak_cumulative",
        "Cumulative Produced Power (off peak)",
        ENERGY_WATT_HOUR,
        POWER,
        true,
    ),
    desc(
        "electricity_produced_peak_cumulative",
        "Cumulative Produced Power",
        ENERGY_WATT_HOUR,
        POWER,
        true,
    ),
    desc("gas_consumed_interval", "Current Consumed Gas", VOLUME_CUBIC_METERS, None, true),
    desc("gas_consumed_cumulative", "Cumulative Consumed Gas", VOLUME_CUBIC_METERS, None, true),
    desc("net_electricity_point", "Current Net Power", POWER_WATT, POWER, true),
    desc("net_electricity_cumulative", "Current Net Power", ENERGY_WATT_HOUR, POWER, true),
];

/// Find the description for a measurement key across every catalogue.
pub fn describe(key: &str) -> Option<&'static SensorDescription> {
    THERMOSTAT_SENSORS
        .iter()
        .chain(AUX_DEV_SENSORS)
        .chain(ENERGY_SENSORS)
        .find(|d| d.key == key)
}

pub struct Sensor {
    base: EntityBase,
    description: &'static SensorDescription,
}

impl PlugwiseEntity for Sensor {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn device_class(&self) -> Option<&str> {
        self.description.device_class
    }

    fn update_state(&self) {
        let Some(device) = self.base.device() else {
            return;
        };

        self.base.report(FromIntegrationMessage::SensorStateChanged {
            entity_id: self.base.entity_id.clone(),
            value: device.sensors.get(self.description.key).copied(),
            unit: self.description.unit.map(str::to_string),
        });
    }
}

/// One sensor per known measurement a device reports. Measurements disabled by default are not
/// created.
pub fn entities(
    client: &Arc<dyn SmileClient>,
    devices: &[DeviceData],
    tx: &FromIntegrationSender,
    ids: &EntityIds,
) -> Vec<Arc<dyn PlugwiseEntity>> {
    let mut entities: Vec<Arc<dyn PlugwiseEntity>> = Vec::new();

    for device in devices {
        for key in device.sensors.keys() {
            let Some(description) = describe(key) else {
                debug!("No sensor description for {} on {}", key, device.name);
                continue;
            };
            if !description.enabled_default {
                debug!("Skipping {} on {}, disabled by default", key, device.name);
                continue;
            }

            let name = format!("{} {}", device.name, description.name);
            entities.push(Arc::new(Sensor {
                base: EntityBase::new(
                    Platform::Sensor,
                    device,
                    key,
                    name,
                    client.clone(),
                    tx.clone(),
                    ids,
                ),
                description,
            }));
        }
    }

    entities
}

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::Error;

/// Appliance classes that carry a thermostat.
pub const THERMOSTAT_CLASSES: [&str; 3] =
    ["thermostat", "zone_thermostat", "thermostatic_radiator_valve"];

/// The product family of a gateway, derived from its vendor model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmileType {
    /// P1 energy meter gateway
    Power,
    /// Anna or Adam heating gateway
    Thermostat,
    /// Stretch plug gateway
    Stretch,
}

impl SmileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmileType::Power => "power",
            SmileType::Thermostat => "thermostat",
            SmileType::Stretch => "stretch",
        }
    }

    /// Map a gateway `vendor_model` to its type and marketing name.
    pub fn from_vendor_model(model: &str) -> Result<(Self, &'static str), Error> {
        match model {
            "smile" => Ok((SmileType::Power, "P1")),
            "smile_thermo" => Ok((SmileType::Thermostat, "Anna")),
            "smile_open_therm" => Ok((SmileType::Thermostat, "Adam")),
            "stretch" => Ok((SmileType::Stretch, "Stretch")),
            other => Err(Error::UnsupportedDevice(other.to_string())),
        }
    }
}

impl fmt::Display for SmileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the gateway itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayInfo {
    pub id: String,
    pub smile_type: SmileType,
    pub smile_name: String,
    pub firmware_version: String,
    pub hostname: Option<String>,
}

/// One device known to the gateway, flattened to its current readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceData {
    pub id: String,
    pub name: String,
    /// Appliance class, e.g. `thermostat`, `heater_central`, `plug`, `gateway`
    pub class: String,
    pub location: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub firmware: Option<String>,
    pub sensors: BTreeMap<String, f64>,
    pub binary_sensors: BTreeMap<String, bool>,
    pub switches: BTreeMap<String, bool>,
    pub setpoint: Option<f64>,
}

impl DeviceData {
    pub fn is_thermostat(&self) -> bool {
        THERMOSTAT_CLASSES.contains(&self.class.as_str())
    }
}

/// Everything read from one `domain_objects` fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub gateway: GatewayInfo,
    pub devices: BTreeMap<String, DeviceData>,
}

impl Snapshot {
    /// `None` for gateways without heating control, otherwise whether exactly one
    /// thermostat drives the system.
    pub fn single_master_thermostat(&self) -> Option<bool> {
        if self.gateway.smile_type != SmileType::Thermostat {
            return None;
        }

        let thermostats = self.devices.values().filter(|d| d.is_thermostat()).count();
        Some(thermostats == 1)
    }
}

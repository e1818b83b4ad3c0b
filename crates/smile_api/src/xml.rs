//! Serde model of the `/core/domain_objects` document.
//!
//! Only the elements the snapshot needs are modelled; everything else in the
//! document is skipped by the deserializer.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::model::DeviceData;
use crate::model::GatewayInfo;
use crate::model::SmileType;
use crate::model::Snapshot;
use crate::Error;
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename = "domain_objects")]
struct DomainObjects {
    #[serde(default)]
    gateway: Vec<GatewayXml>,
    #[serde(default)]
    appliance: Vec<ApplianceXml>,
    #[serde(default)]
    location: Vec<LocationXml>,
}

#[derive(Debug, Deserialize)]
struct GatewayXml {
    #[serde(rename = "@id")]
    id: String,
    vendor_name: Option<String>,
    vendor_model: Option<String>,
    firmware_version: Option<String>,
    hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApplianceXml {
    #[serde(rename = "@id")]
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    class: Option<String>,
    location: Option<LocationRef>,
    logs: Option<Logs>,
    actuator_functionalities: Option<Actuators>,
}

#[derive(Debug, Deserialize)]
struct LocationRef {
    #[serde(rename = "@id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct LocationXml {
    #[serde(rename = "@id")]
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    logs: Option<Logs>,
}

#[derive(Debug, Default, Deserialize)]
struct Logs {
    #[serde(default)]
    point_log: Vec<LogXml>,
    #[serde(default)]
    interval_log: Vec<LogXml>,
    #[serde(default)]
    cumulative_log: Vec<LogXml>,
}

#[derive(Debug, Deserialize)]
struct LogXml {
    #[serde(rename = "type")]
    kind: String,
    period: Option<Period>,
}

#[derive(Debug, Deserialize)]
struct Period {
    #[serde(default)]
    measurement: Vec<Measurement>,
}

#[derive(Debug, Deserialize)]
struct Measurement {
    #[serde(rename = "@tariff")]
    tariff: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Actuators {
    #[serde(default)]
    thermostat_functionality: Vec<ThermostatFunctionality>,
    #[serde(default)]
    relay_functionality: Vec<RelayFunctionality>,
}

#[derive(Debug, Deserialize)]
struct ThermostatFunctionality {
    setpoint: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RelayFunctionality {
    state: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum LogKind {
    Point,
    Interval,
    Cumulative,
}

/// Gateway log names that are exposed under a friendlier key.
const RENAMES: [(&str, &str); 5] = [
    ("thermostat", "setpoint"),
    ("boiler_temperature", "water_temperature"),
    ("central_heater_water_pressure", "water_pressure"),
    ("return_water_temperature", "return_temperature"),
    ("domestic_hot_water_state", "dhw_state"),
];

fn reading_key(kind: &str, log: LogKind, tariff: Option<&str>) -> String {
    let kind = RENAMES
        .iter()
        .find(|(from, _)| *from == kind)
        .map(|(_, to)| *to)
        .unwrap_or(kind);

    let tariff = match tariff {
        Some("nl_peak") => Some("peak"),
        Some("nl_offpeak") => Some("off_peak"),
        _ => None,
    };

    match (log, tariff) {
        (LogKind::Point, None) => kind.to_string(),
        (LogKind::Point, Some(t)) => format!("{}_{}_point", kind, t),
        (LogKind::Interval, None) => format!("{}_interval", kind),
        (LogKind::Interval, Some(t)) => format!("{}_{}_interval", kind, t),
        (LogKind::Cumulative, None) => format!("{}_cumulative", kind),
        (LogKind::Cumulative, Some(t)) => format!("{}_{}_cumulative", kind, t),
    }
}

fn apply_reading(device: &mut DeviceData, key: String, raw: &str) {
    let state = match raw {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    };

    match (state, key.as_str()) {
        (Some(on), "relay") => {
            device.switches.insert(key, on);
        }
        (Some(on), _) => {
            device.binary_sensors.insert(key, on);
        }
        (None, _) => {
            if let Ok(value) = raw.parse::<f64>() {
                device.sensors.insert(key, value);
            }
        }
    }
}

fn apply_logs(device: &mut DeviceData, logs: &Logs) {
    let all = logs
        .point_log
        .iter()
        .map(|l| (l, LogKind::Point))
        .chain(logs.interval_log.iter().map(|l| (l, LogKind::Interval)))
        .chain(logs.cumulative_log.iter().map(|l| (l, LogKind::Cumulative)));

    for (log, kind) in all {
        let Some(period) = &log.period else {
            continue;
        };
        for m in &period.measurement {
            let key = reading_key(&log.kind, kind, m.tariff.as_deref());
            apply_reading(device, key, m.value.trim());
        }
    }
}

fn apply_actuators(device: &mut DeviceData, actuators: &Actuators) {
    if let Some(setpoint) = actuators
        .thermostat_functionality
        .iter()
        .find_map(|t| t.setpoint)
    {
        device.setpoint = Some(setpoint);
    }

    if let Some(state) = actuators
        .relay_functionality
        .iter()
        .find_map(|r| r.state.as_deref())
    {
        device.switches.insert("relay".to_string(), state == "on");
    }
}

/// Parse a `domain_objects` document into a [`Snapshot`].
pub fn parse_domain_objects(xml: &str) -> Result<Snapshot> {
    let doc: DomainObjects = quick_xml::de::from_str(xml)?;

    let gw = doc.gateway.first().ok_or(Error::MissingGateway)?;
    let (smile_type, smile_name) =
        SmileType::from_vendor_model(gw.vendor_model.as_deref().unwrap_or_default())?;

    let gateway = GatewayInfo {
        id: gw.id.clone(),
        smile_type,
        smile_name: smile_name.to_string(),
        firmware_version: gw.firmware_version.clone().unwrap_or_default(),
        hostname: gw.hostname.clone(),
    };

    let location_names: BTreeMap<&str, &str> = doc
        .location
        .iter()
        .filter_map(|l| Some((l.id.as_str(), l.name.as_deref()?)))
        .collect();

    let mut gateway_device = DeviceData {
        id: gateway.id.clone(),
        name: format!("Smile {}", smile_name),
        class: "gateway".to_string(),
        model: Some(format!("Smile {}", smile_name)),
        vendor: gw.vendor_name.clone(),
        firmware: Some(gateway.firmware_version.clone()),
        ..Default::default()
    };

    // The building location carries household-wide readings (P1 meter values,
    // outdoor temperature), which belong to the gateway itself.
    for location in doc
        .location
        .iter()
        .filter(|l| l.kind.as_deref() == Some("building"))
    {
        if let Some(logs) = &location.logs {
            apply_logs(&mut gateway_device, logs);
        }
    }

    let mut devices = BTreeMap::new();
    for appliance in &doc.appliance {
        let class = appliance.class.clone().unwrap_or_default();
        let target = if class == "gateway" {
            &mut gateway_device
        } else {
            devices.entry(appliance.id.clone()).or_insert_with(|| DeviceData {
                id: appliance.id.clone(),
                name: appliance
                    .name
                    .clone()
                    .unwrap_or_else(|| appliance.id.clone()),
                class,
                location: appliance
                    .location
                    .as_ref()
                    .and_then(|l| location_names.get(l.id.as_str()))
                    .map(|n| n.to_string()),
                vendor: gw.vendor_name.clone(),
                ..Default::default()
            })
        };

        if let Some(logs) = &appliance.logs {
            apply_logs(target, logs);
        }
        if let Some(actuators) = &appliance.actuator_functionalities {
            apply_actuators(target, actuators);
        }
    }

    devices.insert(gateway_device.id.clone(), gateway_device);

    tracing::trace!(
        gateway = %gateway.id,
        devices = devices.len(),
        "Parsed domain_objects"
    );

    Ok(Snapshot { gateway, devices })
}

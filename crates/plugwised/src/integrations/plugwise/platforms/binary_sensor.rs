use std::sync::Arc;

use smile_api::DeviceData;

use super::Platform;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::integrations::plugwise::client::SmileClient;
use crate::integrations::plugwise::entity::EntityBase;
use crate::integrations::plugwise::entity::EntityIds;
use crate::integrations::plugwise::entity::PlugwiseEntity;

/// Binary sensor keys and their display names
pub const BINARY_SENSOR_MAP: &[(&str, &str)] = &[
    ("dhw_state", "Domestic Hot Water State"),
    ("slave_boiler_state", "Secondary Heater Device State"),
];

pub struct BinarySensor {
    base: EntityBase,
    key: &'static str,
}

impl PlugwiseEntity for BinarySensor {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn update_state(&self) {
        let Some(device) = self.base.device() else {
            return;
        };

        self.base.report(FromIntegrationMessage::BinarySensorStateChanged {
            entity_id: self.base.entity_id.clone(),
            on: device.binary_sensors.get(self.key).copied().unwrap_or(false),
        });
    }
}

pub fn entities(
    client: &Arc<dyn SmileClient>,
    devices: &[DeviceData],
    tx: &FromIntegrationSender,
    ids: &EntityIds,
) -> Vec<Arc<dyn PlugwiseEntity>> {
    let mut entities: Vec<Arc<dyn PlugwiseEntity>> = Vec::new();

    for device in devices {
        for &(key, name) in BINARY_SENSOR_MAP {
            if !device.binary_sensors.contains_key(key) {
                continue;
            }

            entities.push(Arc::new(BinarySensor {
                base: EntityBase::new(
                    Platform::BinarySensor,
                    device,
                    key,
                    format!("{} {}", device.name, name),
                    client.clone(),
                    tx.clone(),
                    ids,
                ),
                key,
            }));
        }
    }

    entities
}

#[cfg(test)]
mod tests {
    use smile_api::SmileType;
    use tokio::sync::mpsc;

    use super::*;
    use crate::integrations::plugwise::client::MockSmileClient;

    fn heater() -> DeviceData {
        DeviceData {
            id: "boiler".to_string(),
            name: "OpenTherm".to_string(),
            class: "heater_central".to_string(),
            binary_sensors: [
                ("dhw_state".to_string(), true),
                ("flame_state".to_string(), false),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_only_mapped_keys_become_entities() {
        let client: Arc<dyn SmileClient> =
            Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(true)).with_device(heater()));
        let (tx, mut rx) = mpsc::channel(8);

        let entities = entities(&client, &[heater()], &tx, &EntityIds::default());
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_id(), "binary_sensor.opentherm_dhw_state");
        assert_eq!(entities[0].base().name, "OpenTherm Domestic Hot Water State");

        entities[0].update_state();
        assert!(matches!(
            rx.recv().await.unwrap(),
            FromIntegrationMessage::BinarySensorStateChanged { on: true, .. }
        ));
    }
}

use std::sync::Arc;

use smile_api::DeviceData;

use super::Platform;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::integrations::plugwise::client::SmileClient;
use crate::integrations::plugwise::entity::EntityBase;
use crate::integrations::plugwise::entity::EntityIds;
use crate::integrations::plugwise::entity::PlugwiseEntity;

pub const DEFAULT_MIN_TEMP: f64 = 4.0;
pub const DEFAULT_MAX_TEMP: f64 = 30.0;

/// A thermostat, zone thermostat or radiator valve
pub struct Thermostat {
    base: EntityBase,
}

impl PlugwiseEntity for Thermostat {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn update_state(&self) {
        let Some(device) = self.base.device() else {
            return;
        };

        self.base.report(FromIntegrationMessage::ClimateStateChanged {
            entity_id: self.base.entity_id.clone(),
            current_temperature: device.sensors.get("temperature").copied(),
            target_temperature: device.setpoint,
            min_temp: DEFAULT_MIN_TEMP,
            max_temp: DEFAULT_MAX_TEMP,
        });
    }
}

pub fn entities(
    client: &Arc<dyn SmileClient>,
    devices: &[DeviceData],
    tx: &FromIntegrationSender,
    ids: &EntityIds,
) -> Vec<Arc<dyn PlugwiseEntity>> {
    devices
        .iter()
        .filter(|device| device.is_thermostat())
        .map(|device| -> Arc<dyn PlugwiseEntity> {
            Arc::new(Thermostat {
                base: EntityBase::new(
                    Platform::Climate,
                    device,
                    "thermostat",
                    device.name.clone(),
                    client.clone(),
                    tx.clone(),
                    ids,
                ),
            })
        })
        .collect()
}

use std::sync::Arc;

use smile_api::DeviceData;

use super::Platform;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::integrations::plugwise::client::SmileClient;
use crate::integrations::plugwise::entity::EntityBase;
use crate::integrations::plugwise::entity::EntityIds;
use crate::integrations::plugwise::entity::PlugwiseEntity;

pub const SWITCH_CLASSES: [&str; 2] = ["plug", "switch_group"];

const RELAY: &str = "relay";

pub struct Switch {
    base: EntityBase,
}

impl PlugwiseEntity for Switch {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn update_state(&self) {
        let Some(device) = self.base.device() else {
            return;
        };

        self.base.report(FromIntegrationMessage::SwitchStateChanged {
            entity_id: self.base.entity_id.clone(),
            on: device.switches.get(RELAY).copied().unwrap_or(false),
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
        .filter(|device| {
            SWITCH_CLASSES.contains(&device.class.as_str()) && device.switches.contains_key(RELAY)
        })
        .map(|device| -> Arc<dyn PlugwiseEntity> {
            Arc::new(Switch {
                base: EntityBase::new(
                    Platform::Switch,
                    device,
                    RELAY,
                    device.name.clone(),
                    client.clone(),
                    tx.clone(),
                    ids,
                ),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use smile_api::SmileType;
    use tokio::sync::mpsc;

    use super::*;
    use crate::integrations::plugwise::client::MockSmileClient;

    #[tokio::test]
    async fn test_plug_relay() {
        let plug = DeviceData {
            id: "p1".to_string(),
            name: "Koelkast".to_string(),
            class: "plug".to_string(),
            switches: [(RELAY.to_string(), true)].into_iter().collect(),
            ..Default::default()
        };
        let thermostat = DeviceData {
            id: "t1".to_string(),
            name: "Anna".to_string(),
            class: "thermostat".to_string(),
            ..Default::default()
        };
        let mock = Arc::new(
            MockSmileClient::new(SmileType::Stretch, None)
                .with_device(plug.clone())
                .with_device(thermostat.clone()),
        );
        let client: Arc<dyn SmileClient> = mock.clone();
        let (tx, mut rx) = mpsc::channel(8);

        let entities = entities(&client, &[plug, thermostat], &tx, &EntityIds::default());
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_id(), "switch.koelkast_relay");

        mock.update_device("p1", |d| {
            d.switches.insert(RELAY.to_string(), false);
        });
        entities[0].update_state();
        assert!(matches!(
            rx.recv().await.unwrap(),
            FromIntegrationMessage::SwitchStateChanged { on: false, .. }
        ));
    }
}

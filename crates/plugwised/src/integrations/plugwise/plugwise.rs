use std::collections::BTreeMap;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use smile_api::Smile;
use smile_api::SmileConfig;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use super::DOMAIN;
use super::client::SmileClient;
use super::data::PlugwiseData;
use super::entry::EntryContext;
use super::entry::setup_entry;
use super::entry::unload_entry;
use super::platforms::EntityPlatforms;
use crate::config::PlugwiseConfig;
use crate::config::PlugwiseEntryConfig;
use crate::engine::ConfigEntry;
use crate::engine::ConfigEntryState;
use crate::engine::Host;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// Builds the gateway client for a config entry
pub type ClientFactory =
    Arc<dyn Fn(&PlugwiseEntryConfig) -> smile_api::Result<Arc<dyn SmileClient>> + Send + Sync>;

fn smile_client(config: &PlugwiseEntryConfig) -> smile_api::Result<Arc<dyn SmileClient>> {
    let mut smile_config = SmileConfig::new(config.host.clone(), config.password.clone());
    smile_config.port = config.port;
    smile_config.username = config.username.clone();
    Ok(Arc::new(Smile::new(smile_config)?))
}

/// Plugwise Smile integration for plugwised
///
/// Owns one config entry per configured gateway. Each loaded entry polls its gateway through a
/// [`SmileDataUpdater`](super::updater::SmileDataUpdater) and exposes sensor, binary sensor,
/// climate and switch entities.
pub struct PlugwiseIntegration {
    entries: BTreeMap<String, ConfigEntry<PlugwiseEntryConfig>>,
    client_factory: ClientFactory,
    ctx: Option<EntryContext>,
    /// Platform forwarding still in flight, per entry
    forwarding: HashMap<String, JoinHandle<()>>,
}

impl PlugwiseIntegration {
    pub fn new(config: &PlugwiseConfig) -> Self {
        Self::with_client_factory(config, Arc::new(smile_client))
    }

    pub fn with_client_factory(config: &PlugwiseConfig, client_factory: ClientFactory) -> Self {
        let entries = config
            .entries
            .iter()
            .map(|(entry_id, entry)| {
                (
                    entry_id.clone(),
                    ConfigEntry::new(entry_id.clone(), DOMAIN, entry.title.clone(), entry.clone()),
                )
            })
            .collect();

        Self {
            entries,
            client_factory,
            ctx: None,
            forwarding: HashMap::new(),
        }
    }

    fn not_set_up() -> Box<dyn Error + Send> {
        Box::new(std::io::Error::other("Plugwise integration is not set up"))
    }

    async fn setup_one(&mut self, ctx: &EntryContext, entry_id: &str) {
        let Some(entry) = self.entries.get_mut(entry_id) else {
            return;
        };

        let result = match (self.client_factory)(&entry.data) {
            Ok(client) => setup_entry(ctx, entry, client).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(forwarding) => {
                self.forwarding.insert(entry_id.to_string(), forwarding);
                entry.set_state(ConfigEntryState::Loaded, &ctx.host.tx).await;
            }
            Err(e) => {
                warn!(
                    "Failed to set up entry {} ({}): {}",
                    entry_id, entry.data.host, e
                );
                entry
                    .set_state(ConfigEntryState::SetupError, &ctx.host.tx)
                    .await;
            }
        }
    }

    async fn unload_one(&mut self, ctx: &EntryContext, entry_id: &str) -> bool {
        let Some(entry) = self.entries.get_mut(entry_id) else {
            return false;
        };

        // Nothing was set up, so there is nothing to tear down
        if matches!(
            entry.state(),
            ConfigEntryState::NotLoaded | ConfigEntryState::SetupError
        ) {
            entry.set_state(ConfigEntryState::NotLoaded, &ctx.host.tx).await;
            return true;
        }

        // Platforms must finish loading before they can be unloaded
        if let Some(forwarding) = self.forwarding.remove(entry_id) {
            if let Err(e) = forwarding.await {
                warn!("Platform forwarding for entry {} failed: {}", entry_id, e);
            }
        }

        let unloaded = unload_entry(ctx, entry_id).await;
        if let Some(entry) = self.entries.get_mut(entry_id) {
            let state = if unloaded {
                ConfigEntryState::NotLoaded
            } else {
                ConfigEntryState::FailedUnload
            };
            entry.set_state(state, &ctx.host.tx).await;
        }
        unloaded
    }
}

#[async_trait]
impl Integration for PlugwiseIntegration {
    fn name(&self) -> &str {
        DOMAIN
    }

    async fn setup(&mut self, host: Host) -> Result<(), Box<dyn Error + Send>> {
        info!("Setting up Plugwise integration");

        let ctx = EntryContext {
            platforms: Arc::new(EntityPlatforms::new(host.tx.clone(), DOMAIN)),
            data: Arc::new(PlugwiseData::new()),
            host,
        };

        let entry_ids: Vec<String> = self.entries.keys().cloned().collect();
        for entry_id in entry_ids {
            self.setup_one(&ctx, &entry_id).await;
        }

        info!(
            "Plugwise integration set up with {} of {} entries loaded",
            ctx.data.len(),
            self.entries.len()
        );
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        let ctx = self.ctx.clone().ok_or_else(Self::not_set_up)?;

        match msg {
            ToIntegrationMessage::UnloadEntry { entry_id } => {
                if !self.entries.contains_key(&entry_id) {
                    return Err(Box::new(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Unknown Plugwise entry: {}", entry_id),
                    )));
                }
                self.unload_one(&ctx, &entry_id).await;
                Ok(())
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let Some(ctx) = self.ctx.take() else {
            return Ok(());
        };

        info!("Shutting down Plugwise integration");
        for entry_id in ctx.data.entry_ids() {
            self.unload_one(&ctx, &entry_id).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use smile_api::DeviceData;
    use smile_api::SmileType;
    use tokio::sync::mpsc;

    use super::*;
    use crate::engine::DeviceRegistry;
    use crate::engine::FromIntegrationMessage;
    use crate::engine::ServiceRegistry;
    use crate::engine::scheduler::ManualScheduler;
    use crate::integrations::plugwise::client::MockSmileClient;

    fn entry_config(host: &str) -> PlugwiseEntryConfig {
        PlugwiseEntryConfig {
            title: format!("Smile {}", host),
            host: host.to_string(),
            password: "abcdefgh".to_string(),
            port: 80,
            username: "smile".to_string(),
            scan_interval: None,
        }
    }

    /// Gateway "good" serves an Anna thermostat, any other host refuses the password.
    fn factory() -> ClientFactory {
        Arc::new(|config: &PlugwiseEntryConfig| {
            let mut client = MockSmileClient::new(SmileType::Thermostat, Some(true)).with_device(
                DeviceData {
                    id: "t1".to_string(),
                    name: "Anna".to_string(),
                    class: "thermostat".to_string(),
                    sensors: [("temperature".to_string(), 20.0)].into_iter().collect(),
                    setpoint: Some(21.0),
                    ..Default::default()
                },
            );
            client.fail_connect = config.host != "good";
            Ok(Arc::new(client) as Arc<dyn SmileClient>)
        })
    }

    fn host(tx: mpsc::Sender<FromIntegrationMessage>) -> (Host, Arc<ServiceRegistry>) {
        let services = Arc::new(ServiceRegistry::new());
        let host = Host {
            tx,
            devices: Arc::new(DeviceRegistry::new()),
            services: services.clone(),
            scheduler: Arc::new(ManualScheduler::new()),
        };
        (host, services)
    }

    fn entry_states(
        rx: &mut mpsc::Receiver<FromIntegrationMessage>,
    ) -> Vec<(String, ConfigEntryState)> {
        let mut states = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let FromIntegrationMessage::ConfigEntryStateChanged {
                entry_id, state, ..
            } = msg
            {
                states.push((entry_id, state));
            }
        }
        states
    }

    fn integration() -> PlugwiseIntegration {
        let config = PlugwiseConfig {
            entries: [
                ("anna".to_string(), entry_config("good")),
                ("broken".to_string(), entry_config("bad")),
            ]
            .into_iter()
            .collect(),
        };
        PlugwiseIntegration::with_client_factory(&config, factory())
    }

    #[tokio::test]
    async fn test_setup_marks_entry_states() {
        let (tx, mut rx) = mpsc::channel(64);
        let (host, services) = host(tx);
        let mut integration = integration();

        integration.setup(host).await.unwrap();

        assert_eq!(
            entry_states(&mut rx),
            vec![
                ("anna".to_string(), ConfigEntryState::Loaded),
                ("broken".to_string(), ConfigEntryState::SetupError),
            ]
        );
        assert!(services.has_service("plugwise", "update"));
    }

    #[tokio::test]
    async fn test_unload_entry_message() {
        let (tx, mut rx) = mpsc::channel(64);
        let (host, services) = host(tx);
        let mut integration = integration();
        integration.setup(host).await.unwrap();
        entry_states(&mut rx);

        integration
            .handle_message(ToIntegrationMessage::UnloadEntry {
                entry_id: "anna".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            entry_states(&mut rx),
            vec![("anna".to_string(), ConfigEntryState::NotLoaded)]
        );
        assert!(!services.has_service("plugwise", "update"));
    }

    #[tokio::test]
    async fn test_unload_entry_that_failed_setup() {
        let (tx, mut rx) = mpsc::channel(64);
        let (host, _services) = host(tx);
        let mut integration = integration();
        integration.setup(host).await.unwrap();
        entry_states(&mut rx);

        integration
            .handle_message(ToIntegrationMessage::UnloadEntry {
                entry_id: "broken".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            entry_states(&mut rx),
            vec![("broken".to_string(), ConfigEntryState::NotLoaded)]
        );
    }

    #[tokio::test]
    async fn test_unload_unknown_entry_errors() {
        let (tx, _rx) = mpsc::channel(64);
        let (host, _services) = host(tx);
        let mut integration = integration();
        integration.setup(host).await.unwrap();

        let result = integration
            .handle_message(ToIntegrationMessage::UnloadEntry {
                entry_id: "missing".to_string(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_unloads_entries() {
        let (tx, mut rx) = mpsc::channel(64);
        let (host, services) = host(tx);
        let mut integration = integration();
        integration.setup(host).await.unwrap();
        entry_states(&mut rx);

        integration.shutdown().await.unwrap();

        assert_eq!(
            entry_states(&mut rx),
            vec![("anna".to_string(), ConfigEntryState::NotLoaded)]
        );
        assert!(!services.has_service("plugwise", "update"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entities_report_through_engine_channel() {
        let (tx, mut rx) = mpsc::channel(64);
        let (host, _services) = host(tx);
        let mut integration = integration();
        integration.setup(host).await.unwrap();

        // Let platform forwarding run
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut discovered = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let FromIntegrationMessage::EntityDiscovered { entity_id, .. } = msg {
                discovered.push(entity_id);
            }
        }
        discovered.sort();
        assert_eq!(
            discovered,
            vec!["climate.anna_thermostat", "sensor.anna_temperature"]
        );
    }
}

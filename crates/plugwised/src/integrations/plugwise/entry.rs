use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use smile_api::SmileType;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::SmileClient;
use super::data::EntryData;
use super::data::PlugwiseData;
use super::platforms::platforms_for;
use super::platforms::PlatformForwarder;
use super::updater::SmileDataUpdater;
use super::DOMAIN;
use crate::config::PlugwiseEntryConfig;
use crate::engine::ConfigEntry;
use crate::engine::DeviceInfo;
use crate::engine::Host;

/// Polling interval for P1 energy gateways
pub const POWER_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Polling interval for every other gateway type
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

pub const SERVICE_UPDATE: &str = "update";

/// What entry setup and unload operate on.
#[derive(Clone)]
pub struct EntryContext {
    pub host: Host,
    pub data: Arc<PlugwiseData>,
    pub platforms: Arc<dyn PlatformForwarder>,
}

/// Pick the polling interval for a gateway. An explicit `scan_interval` wins.
pub fn update_interval(smile_type: SmileType, scan_interval: Option<Duration>) -> Duration {
    if let Some(interval) = scan_interval {
        return interval;
    }
    match smile_type {
        SmileType::Power => POWER_UPDATE_INTERVAL,
        SmileType::Thermostat | SmileType::Stretch => DEFAULT_UPDATE_INTERVAL,
    }
}

/// Set up one config entry.
///
/// Connects the client, stores the entry data, registers the gateway device and the `update`
/// service, then forwards the entry's platforms in the background. The returned handle completes
/// once every platform has been set up; dropping it detaches the forwarding. Polling starts when
/// the first entity subscribes, not here.
pub async fn setup_entry(
    ctx: &EntryContext,
    entry: &ConfigEntry<PlugwiseEntryConfig>,
    client: Arc<dyn SmileClient>,
) -> smile_api::Result<JoinHandle<()>> {
    client.connect().await?;

    let smile_type = client.smile_type()?;
    let interval = update_interval(smile_type, entry.data.scan_interval);
    let updater = SmileDataUpdater::new(client.clone(), ctx.host.scheduler.clone(), interval);
    debug!(
        "Entry {} is a {} gateway, polling every {:?}",
        entry.entry_id,
        smile_type,
        updater.update_interval()
    );

    // Populates the device list before any platform reads it
    let devices = client.devices();
    debug!("Gateway reported {} devices", devices.len());

    let device_info = DeviceInfo {
        identifiers: vec![(DOMAIN.to_string(), client.gateway_id()?)],
        name: entry.title.clone(),
        manufacturer: Some("Plugwise".to_string()),
        model: Some(format!("Smile {}", client.smile_name()?)),
        sw_version: Some(client.smile_version()?),
    };

    let entry_data = Arc::new(EntryData {
        client: client.clone(),
        updater,
        platforms: platforms_for(client.single_master_thermostat()),
    });
    if ctx.data.contains(&entry.entry_id) {
        warn!("Entry {} was already loaded, replacing it", entry.entry_id);
    }
    ctx.data.insert(entry.entry_id.clone(), entry_data.clone());

    let device = ctx.host.devices.get_or_create(&entry.entry_id, device_info);
    info!(
        "Set up entry {} ({}) for device {}",
        entry.entry_id, entry.title, device.id
    );

    let forwarding = forward_platforms(ctx, &entry.entry_id, entry_data);
    register_update_service(ctx);

    Ok(forwarding)
}

fn forward_platforms(
    ctx: &EntryContext,
    entry_id: &str,
    entry_data: Arc<EntryData>,
) -> JoinHandle<()> {
    let forwarder = ctx.platforms.clone();
    let entry_id = entry_id.to_string();

    tokio::spawn(async move {
        let mut tasks = JoinSet::new();
        for platform in entry_data.platforms.clone() {
            let forwarder = forwarder.clone();
            let entry_id = entry_id.clone();
            let entry_data = entry_data.clone();
            tasks.spawn(async move {
                let result = forwarder.setup(platform, &entry_id, entry_data).await;
                (platform, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((platform, Err(e))) => {
                    warn!("Failed to set up {} for entry {}: {:#}", platform, entry_id, e)
                }
                Err(e) => warn!("Platform setup task for entry {} failed: {}", entry_id, e),
            }
        }
    })
}

/// Register `plugwise.update`, which refreshes every loaded entry.
fn register_update_service(ctx: &EntryContext) {
    if ctx.host.services.has_service(DOMAIN, SERVICE_UPDATE) {
        return;
    }

    let data = ctx.data.clone();
    ctx.host
        .services
        .register(DOMAIN, SERVICE_UPDATE, move || {
            let data = data.clone();
            async move {
                for (entry_id, updater) in data.updaters() {
                    updater
                        .refresh_all()
                        .await
                        .with_context(|| format!("refreshing entry {}", entry_id))?;
                }
                Ok::<_, anyhow::Error>(())
            }
        });
}

/// Unload one config entry. Returns whether every platform unloaded.
///
/// The entry data is only dropped when all of its platforms unloaded; otherwise it stays in place
/// so the unload can be retried.
pub async fn unload_entry(ctx: &EntryContext, entry_id: &str) -> bool {
    let Some(entry_data) = ctx.data.get(entry_id) else {
        warn!("Cannot unload entry {}: not loaded", entry_id);
        return false;
    };

    let mut tasks = JoinSet::new();
    for platform in entry_data.platforms.clone() {
        let forwarder = ctx.platforms.clone();
        let entry_id = entry_id.to_string();
        tasks.spawn(async move { forwarder.unload(platform, &entry_id).await });
    }

    let mut unloaded = true;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(ok) => unloaded &= ok,
            Err(e) => {
                warn!("Platform unload task for entry {} failed: {}", entry_id, e);
                unloaded = false;
            }
        }
    }

    if !unloaded {
        warn!(
            "Entry {} did not unload cleanly, {} listeners left (polling: {})",
            entry_id,
            entry_data.updater.listener_count(),
            entry_data.updater.is_polling()
        );
        return false;
    }

    ctx.data.remove(entry_id);
    if ctx.data.is_empty() {
        ctx.host.services.unregister(DOMAIN, SERVICE_UPDATE);
    }
    info!("Unloaded entry {}", entry_id);
    true
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use smile_api::DeviceData;
    use tokio::sync::mpsc;

    use super::*;
    use crate::engine::scheduler::ManualScheduler;
    use crate::engine::DeviceRegistry;
    use crate::engine::ServiceError;
    use crate::engine::ServiceRegistry;
    use crate::integrations::plugwise::client::MockSmileClient;
    use crate::integrations::plugwise::platforms::EntityPlatforms;
    use crate::integrations::plugwise::platforms::Platform;
    use crate::integrations::plugwise::updater::ListenerId;

    /// Forwarder that subscribes one listener per platform and can be told to fail unloads.
    #[derive(Default)]
    struct FakeForwarder {
        loaded: Mutex<HashMap<(String, Platform), (Arc<SmileDataUpdater>, ListenerId)>>,
        setups: Mutex<Vec<(String, Platform)>>,
        unloads: Mutex<Vec<(String, Platform)>>,
        fail_unload: Mutex<Option<Platform>>,
    }

    #[async_trait]
    impl PlatformForwarder for FakeForwarder {
        async fn setup(
            &self,
            platform: Platform,
            entry_id: &str,
            entry: Arc<EntryData>,
        ) -> anyhow::Result<()> {
            let listener = entry.updater.add_listener(Arc::new(|| {}));
            self.loaded.lock().unwrap().insert(
                (entry_id.to_string(), platform),
                (entry.updater.clone(), listener),
            );
            self.setups
                .lock()
                .unwrap()
                .push((entry_id.to_string(), platform));
            Ok(())
        }

        async fn unload(&self, platform: Platform, entry_id: &str) -> bool {
            self.unloads
                .lock()
                .unwrap()
                .push((entry_id.to_string(), platform));
            if *self.fail_unload.lock().unwrap() == Some(platform) {
                return false;
            }
            let Some((updater, listener)) = self
                .loaded
                .lock()
                .unwrap()
                .remove(&(entry_id.to_string(), platform))
            else {
                return false;
            };
            updater.remove_listener(listener).is_ok()
        }
    }

    struct Harness {
        ctx: EntryContext,
        forwarder: Arc<FakeForwarder>,
        scheduler: Arc<ManualScheduler>,
    }

    fn harness() -> Harness {
        let (tx, _rx) = mpsc::channel(64);
        let scheduler = Arc::new(ManualScheduler::new());
        let forwarder = Arc::new(FakeForwarder::default());
        let ctx = EntryContext {
            host: Host {
                tx,
                devices: Arc::new(DeviceRegistry::new()),
                services: Arc::new(ServiceRegistry::new()),
                scheduler: scheduler.clone(),
            },
            data: Arc::new(PlugwiseData::new()),
            platforms: forwarder.clone(),
        };
        Harness {
            ctx,
            forwarder,
            scheduler,
        }
    }

    fn config_entry(
        entry_id: &str,
        scan_interval: Option<Duration>,
    ) -> ConfigEntry<PlugwiseEntryConfig> {
        ConfigEntry::new(
            entry_id,
            DOMAIN,
            "Smile Anna",
            PlugwiseEntryConfig {
                title: "Smile Anna".to_string(),
                host: "192.168.1.10".to_string(),
                password: "abcdefgh".to_string(),
                port: 80,
                username: "smile".to_string(),
                scan_interval,
            },
        )
    }

    async fn setup(
        h: &Harness,
        entry_id: &str,
        client: Arc<MockSmileClient>,
    ) -> smile_api::Result<()> {
        let forwarding = setup_entry(&h.ctx, &config_entry(entry_id, None), client).await?;
        forwarding.await.unwrap();
        Ok(())
    }

    fn sorted_platforms(calls: &Mutex<Vec<(String, Platform)>>, entry_id: &str) -> Vec<Platform> {
        let mut platforms: Vec<_> = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == entry_id)
            .map(|(_, p)| *p)
            .collect();
        platforms.sort();
        platforms
    }

    #[test]
    fn test_update_interval() {
        assert_eq!(update_interval(SmileType::Power, None), Duration::from_secs(10));
        assert_eq!(update_interval(SmileType::Thermostat, None), Duration::from_secs(60));
        assert_eq!(update_interval(SmileType::Stretch, None), Duration::from_secs(60));
        assert_eq!(
            update_interval(SmileType::Power, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
    }

    #[tokio::test]
    async fn test_setup_power_gateway() {
        let h = harness();
        let client = Arc::new(MockSmileClient::new(SmileType::Power, None));

        setup(&h, "p1", client.clone()).await.unwrap();

        let entry = h.ctx.data.get("p1").unwrap();
        assert_eq!(entry.updater.update_interval(), Duration::from_secs(10));
        assert_eq!(entry.platforms, vec![Platform::Sensor]);
        assert_eq!(sorted_platforms(&h.forwarder.setups, "p1"), vec![Platform::Sensor]);
        assert_eq!(client.connects.load(Ordering::SeqCst), 1);

        // The timer starts with the first subscriber, never from setup itself
        assert_eq!(h.scheduler.intervals(), vec![Duration::from_secs(10)]);
        assert!(entry.updater.is_polling());
    }

    #[tokio::test]
    async fn test_setup_thermostat_gateway() {
        let h = harness();
        let client = Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(true)));

        setup(&h, "anna", client).await.unwrap();

        let entry = h.ctx.data.get("anna").unwrap();
        assert_eq!(entry.updater.update_interval(), Duration::from_secs(60));
        assert_eq!(
            sorted_platforms(&h.forwarder.setups, "anna"),
            vec![
                Platform::BinarySensor,
                Platform::Climate,
                Platform::Sensor,
                Platform::Switch
            ]
        );
        assert!(h.ctx.host.services.has_service("plugwise", "update"));
    }

    #[tokio::test]
    async fn test_setup_starts_no_timer_itself() {
        let h = harness();
        let client = Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(true)));

        // Forwarding runs on a spawned task that has not been polled yet
        let forwarding = setup_entry(&h.ctx, &config_entry("anna", None), client)
            .await
            .unwrap();
        assert!(h.ctx.data.contains("anna"));
        assert!(h.scheduler.intervals().is_empty());
        assert!(!h.ctx.data.get("anna").unwrap().updater.is_polling());

        forwarding.await.unwrap();
        assert_eq!(h.scheduler.active_timers(), 1);
    }

    #[tokio::test]
    async fn test_scan_interval_override() {
        let h = harness();
        let client = Arc::new(MockSmileClient::new(SmileType::Power, None));

        let forwarding = setup_entry(
            &h.ctx,
            &config_entry("p1", Some(Duration::from_secs(5))),
            client,
        )
        .await
        .unwrap();
        forwarding.await.unwrap();

        assert_eq!(
            h.ctx.data.get("p1").unwrap().updater.update_interval(),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_setup_registers_gateway_device() {
        let h = harness();
        let client = Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(true)));

        setup(&h, "anna", client).await.unwrap();

        let devices = h.ctx.host.devices.devices();
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(
            device.identifiers,
            vec![("plugwise".to_string(), "gw-0001".to_string())]
        );
        assert_eq!(device.config_entries, vec!["anna".to_string()]);
        assert_eq!(device.name, "Smile Anna");
        assert_eq!(device.manufacturer.as_deref(), Some("Plugwise"));
        assert_eq!(device.model.as_deref(), Some("Smile Anna"));
        assert_eq!(device.sw_version.as_deref(), Some("4.0.15"));
    }

    #[tokio::test]
    async fn test_setup_connect_failure() {
        let h = harness();
        let mut client = MockSmileClient::new(SmileType::Thermostat, Some(true));
        client.fail_connect = true;

        let err = setup(&h, "anna", Arc::new(client)).await.unwrap_err();

        assert!(matches!(err, smile_api::Error::InvalidAuthentication));
        assert!(h.ctx.data.is_empty());
        assert!(h.ctx.host.devices.devices().is_empty());
        assert!(!h.ctx.host.services.has_service("plugwise", "update"));
        assert!(h.forwarder.setups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unload_entry() {
        let h = harness();
        let client = Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(true)));
        setup(&h, "anna", client).await.unwrap();
        let updater = h.ctx.data.get("anna").unwrap().updater.clone();
        assert_eq!(updater.listener_count(), 4);

        assert!(unload_entry(&h.ctx, "anna").await);

        assert!(!h.ctx.data.contains("anna"));
        assert_eq!(
            sorted_platforms(&h.forwarder.unloads, "anna"),
            sorted_platforms(&h.forwarder.setups, "anna")
        );
        assert_eq!(updater.listener_count(), 0);
        assert!(!updater.is_polling());
        assert_eq!(h.scheduler.active_timers(), 0);
        assert!(!h.ctx.host.services.has_service("plugwise", "update"));
    }

    #[tokio::test]
    async fn test_unload_uses_entry_platforms() {
        let h = harness();
        setup(&h, "p1", Arc::new(MockSmileClient::new(SmileType::Power, None)))
            .await
            .unwrap();
        setup(
            &h,
            "anna",
            Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(false))),
        )
        .await
        .unwrap();

        assert!(unload_entry(&h.ctx, "p1").await);

        assert_eq!(sorted_platforms(&h.forwarder.unloads, "p1"), vec![Platform::Sensor]);
        assert!(h.ctx.data.contains("anna"));
        assert!(h.ctx.host.services.has_service("plugwise", "update"));
    }

    #[tokio::test]
    async fn test_unload_failure_keeps_entry() {
        let h = harness();
        let client = Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(true)));
        setup(&h, "anna", client).await.unwrap();
        *h.forwarder.fail_unload.lock().unwrap() = Some(Platform::Climate);

        assert!(!unload_entry(&h.ctx, "anna").await);

        assert!(h.ctx.data.contains("anna"));
        assert_eq!(sorted_platforms(&h.forwarder.unloads, "anna").len(), 4);
    }

    #[tokio::test]
    async fn test_unload_retry_succeeds() {
        let (tx, _rx) = mpsc::channel(64);
        let platforms = Arc::new(EntityPlatforms::new(tx.clone(), DOMAIN));
        let ctx = EntryContext {
            host: Host {
                tx,
                devices: Arc::new(DeviceRegistry::new()),
                services: Arc::new(ServiceRegistry::new()),
                scheduler: Arc::new(ManualScheduler::new()),
            },
            data: Arc::new(PlugwiseData::new()),
            platforms: platforms.clone(),
        };
        let client = Arc::new(
            MockSmileClient::new(SmileType::Thermostat, Some(true)).with_device(DeviceData {
                id: "t1".to_string(),
                name: "Anna".to_string(),
                class: "thermostat".to_string(),
                sensors: [("temperature".to_string(), 20.0)].into_iter().collect(),
                ..Default::default()
            }),
        );
        let forwarding = setup_entry(&ctx, &config_entry("anna", None), client)
            .await
            .unwrap();
        forwarding.await.unwrap();

        let updater = ctx.data.get("anna").unwrap().updater.clone();
        for listener in platforms.listeners(Platform::Climate, "anna") {
            updater.remove_listener(listener).unwrap();
        }

        assert!(!unload_entry(&ctx, "anna").await);
        assert!(ctx.data.contains("anna"));

        assert!(unload_entry(&ctx, "anna").await);
        assert!(!ctx.data.contains("anna"));
        assert_eq!(updater.listener_count(), 0);
        assert!(!updater.is_polling());
        assert!(!ctx.host.services.has_service("plugwise", "update"));
    }

    #[tokio::test]
    async fn test_unload_unknown_entry() {
        let h = harness();
        assert!(!unload_entry(&h.ctx, "missing").await);
    }

    #[tokio::test]
    async fn test_update_service_refreshes_every_entry() {
        let h = harness();
        let power = Arc::new(MockSmileClient::new(SmileType::Power, None));
        let anna = Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(true)));
        setup(&h, "p1", power.clone()).await.unwrap();
        setup(&h, "anna", anna.clone()).await.unwrap();

        h.ctx.host.services.call("plugwise", "update").await.unwrap();

        assert_eq!(power.refresh_count(), 1);
        assert_eq!(anna.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_update_service_propagates_refresh_error() {
        let h = harness();
        let anna = Arc::new(MockSmileClient::new(SmileType::Thermostat, Some(true)));
        setup(&h, "anna", anna.clone()).await.unwrap();
        anna.fail_refresh.store(true, Ordering::SeqCst);

        let err = h
            .ctx
            .host
            .services
            .call("plugwise", "update")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CallFailed { .. }));
    }

    #[tokio::test]
    async fn test_update_service_gone_after_last_unload() {
        let h = harness();
        setup(&h, "p1", Arc::new(MockSmileClient::new(SmileType::Power, None)))
            .await
            .unwrap();
        assert!(unload_entry(&h.ctx, "p1").await);

        let err = h
            .ctx
            .host
            .services
            .call("plugwise", "update")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}

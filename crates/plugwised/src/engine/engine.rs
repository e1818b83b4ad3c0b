use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::sync::PoisonError;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::device::Device;
use super::device::DeviceRegistry;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Host;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::scheduler::Scheduler;
use super::scheduler::TokioScheduler;
use super::services::ServiceError;
use super::services::ServiceRegistry;
use super::state::BinarySensorState;
use super::state::ClimateState;
use super::state::ConfigEntryStatus;
use super::state::EntityInfo;
use super::state::SensorState;
use super::state::State;
use super::state::SwitchState;
use crate::engine::IntegrationContext;

/// plugwised engine
///
/// This structure owns the host capabilities integrations run against (device registry, service
/// registry, scheduler), routes commands to the correct integration, and maintains a view of the
/// world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Communication channels to integrations (for commands), keyed by integration name
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,

    devices: Arc<DeviceRegistry>,
    services: Arc<ServiceRegistry>,
    scheduler: Arc<dyn Scheduler>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance backed by the tokio scheduler
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(TokioScheduler))
    }

    pub fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: std::sync::Mutex::new(Vec::new()),
            devices: Arc::new(DeviceRegistry::new()),
            services: Arc::new(ServiceRegistry::new()),
            scheduler,
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every factory in the integration registry and registers the ones the config enables.
    pub fn register_integrations_from_config(&mut self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// The capabilities handed to integrations during setup
    pub fn host(&self) -> Host {
        Host {
            tx: self.message_tx.clone(),
            devices: self.devices.clone(),
            services: self.services.clone(),
            scheduler: self.scheduler.clone(),
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let host = self.host();

        self.integration_channels
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            if let Err(e) = integration.setup(host).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Send a command to the named integration
    pub fn send_command(
        &self,
        integration_name: &str,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        let channels = self
            .integration_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let tx = channels
            .get(integration_name)
            .ok_or_else(|| -> Box<dyn Error + Send> {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Integration channel not found: {}", integration_name),
                ))
            })?;

        tx.send(msg)
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
    }

    /// Ask the integration owning `domain` to unload one of its config entries
    pub fn unload_entry(&self, domain: &str, entry_id: &str) -> Result<(), Box<dyn Error + Send>> {
        self.send_command(
            domain,
            ToIntegrationMessage::UnloadEntry {
                entry_id: entry_id.to_string(),
            },
        )
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.devices.devices()
    }

    pub fn services(&self) -> Vec<(String, String)> {
        self.services.services()
    }

    /// Call a registered service and wait for it to finish
    pub async fn call_service(&self, domain: &str, service: &str) -> Result<(), ServiceError> {
        info!("Calling service {}.{}", domain, service);
        self.services.call(domain, service).await
    }

    /// Stop every integration and wait for their shutdown to complete
    pub async fn shutdown(&self) {
        info!("Stopping integrations");

        // Dropping the command senders ends each integration's message loop.
        self.integration_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let handles = std::mem::take(
            &mut *self
                .integration_handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Integration task panicked: {}", e);
            }
        }
    }

    fn update_state(&self, f: impl FnOnce(&mut State)) {
        let mut state = State::clone(&self.state.load());
        f(&mut state);
        self.state.store(Arc::new(state));
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
                name,
                unique_id,
                device_class,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                // State is not populated until the first state-change message arrives.
                self.update_state(|state| {
                    state.entities.insert(
                        entity_id,
                        EntityInfo {
                            integration: integration_name,
                            name,
                            unique_id,
                            device_class,
                        },
                    );
                });
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);
                self.update_state(|state| state.remove_entity(&entity_id));
            }
            FromIntegrationMessage::SensorStateChanged {
                entity_id,
                value,
                unit,
            } => {
                debug!("Sensor state changed: {} -> {:?}", entity_id, value);
                self.update_state(|state| {
                    state.sensors.insert(entity_id, SensorState { value, unit });
                });
            }
            FromIntegrationMessage::BinarySensorStateChanged { entity_id, on } => {
                debug!("Binary sensor state changed: {} -> on={}", entity_id, on);
                self.update_state(|state| {
                    state
                        .binary_sensors
                        .insert(entity_id, BinarySensorState { on });
                });
            }
            FromIntegrationMessage::ClimateStateChanged {
                entity_id,
                current_temperature,
                target_temperature,
                min_temp,
                max_temp,
            } => {
                debug!(
                    "Climate state changed: {} -> current={:?}, target={:?}",
                    entity_id, current_temperature, target_temperature
                );
                self.update_state(|state| {
                    state.climates.insert(
                        entity_id,
                        ClimateState {
                            current_temperature,
                            target_temperature,
                            min_temp,
                            max_temp,
                        },
                    );
                });
            }
            FromIntegrationMessage::SwitchStateChanged { entity_id, on } => {
                debug!("Switch state changed: {} -> on={}", entity_id, on);
                self.update_state(|state| {
                    state.switches.insert(entity_id, SwitchState { on });
                });
            }
            FromIntegrationMessage::ConfigEntryStateChanged {
                entry_id,
                domain,
                title,
                state: entry_state,
            } => {
                info!("Config entry {} is now {}", entry_id, entry_state);
                self.update_state(|state| {
                    state.config_entries.insert(
                        entry_id,
                        ConfigEntryStatus {
                            domain,
                            title,
                            state: entry_state,
                        },
                    );
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use linkme::distributed_slice;
use tokio::sync::mpsc;

use super::device::DeviceRegistry;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::scheduler::Scheduler;
use super::services::ServiceRegistry;
use crate::config::Config;

/// Channel types for messages FROM integrations TO the engine
/// These are bounded channels (capacity 1024) to provide backpressure
pub type FromIntegrationSender = mpsc::Sender<FromIntegrationMessage>;
pub type FromIntegrationReceiver = mpsc::Receiver<FromIntegrationMessage>;

/// Channel types for messages FROM the engine TO integrations (unbounded - engine must not block)
pub type ToIntegrationSender = mpsc::UnboundedSender<ToIntegrationMessage>;

/// Result type for integration factory functions
pub type IntegrationFactoryResult = anyhow::Result<Option<Box<dyn Integration>>>;

pub struct IntegrationContext<'a> {
    pub config: &'a Config,
}

#[distributed_slice]
pub static REGISTRY: [fn(&IntegrationContext) -> IntegrationFactoryResult];

/// Capabilities the engine hands to an integration during setup.
#[derive(Clone)]
pub struct Host {
    /// Sender to report events back to the engine
    pub tx: FromIntegrationSender,
    pub devices: Arc<DeviceRegistry>,
    pub services: Arc<ServiceRegistry>,
    pub scheduler: Arc<dyn Scheduler>,
}

/// Integration trait that all integrations must implement
#[async_trait]
pub trait Integration: Send + Sync {
    /// Get the name/identifier of this integration
    fn name(&self) -> &str;

    /// Set up the integration - connect devices, register services, etc.
    ///
    /// The integration receives the host context, including a sender to report events back to
    /// the engine (discovery, state changes, etc.)
    async fn setup(&mut self, host: Host) -> Result<(), Box<dyn Error + Send>>;

    /// Handle a command from the engine
    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>>;

    /// Shut down the integration gracefully
    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>>;
}

mod config_entry;
mod device;
mod engine;
mod integration;
mod message;
pub mod scheduler;
mod services;
pub mod state;

pub use config_entry::ConfigEntry;
pub use config_entry::ConfigEntryState;
pub use device::Device;
pub use device::DeviceInfo;
#[cfg(test)]
pub use device::DeviceRegistry;
pub use engine::Engine;
pub use integration::FromIntegrationSender;
pub use integration::Host;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use scheduler::Scheduler;
pub use scheduler::TimerAction;
pub use scheduler::TimerHandle;
pub use services::ServiceError;
#[cfg(test)]
pub use services::ServiceRegistry;
pub use state::State;

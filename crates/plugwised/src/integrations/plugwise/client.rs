use async_trait::async_trait;
use smile_api::DeviceData;
use smile_api::Smile;
use smile_api::SmileType;

/// Trait for Smile gateway operations
///
/// This trait allows for mocking the gateway client for testing purposes. Readers are synchronous
/// so entity listeners can re-read the latest snapshot from inside a notification.
#[async_trait]
pub trait SmileClient: Send + Sync {
    /// Connect to the gateway and fetch its initial state
    async fn connect(&self) -> smile_api::Result<()>;

    /// Re-fetch the full device state
    async fn full_update_device(&self) -> smile_api::Result<()>;

    fn gateway_id(&self) -> smile_api::Result<String>;

    fn smile_type(&self) -> smile_api::Result<SmileType>;

    fn smile_name(&self) -> smile_api::Result<String>;

    fn smile_version(&self) -> smile_api::Result<String>;

    fn devices(&self) -> Vec<DeviceData>;

    fn device(&self, id: &str) -> Option<DeviceData>;

    /// `None` when the gateway has no heating control
    fn single_master_thermostat(&self) -> Option<bool>;
}

#[async_trait]
impl SmileClient for Smile {
    async fn connect(&self) -> smile_api::Result<()> {
        Smile::connect(self).await
    }

    async fn full_update_device(&self) -> smile_api::Result<()> {
        Smile::full_update_device(self).await
    }

    fn gateway_id(&self) -> smile_api::Result<String> {
        Smile::gateway_id(self)
    }

    fn smile_type(&self) -> smile_api::Result<SmileType> {
        Smile::smile_type(self)
    }

    fn smile_name(&self) -> smile_api::Result<String> {
        Smile::smile_name(self)
    }

    fn smile_version(&self) -> smile_api::Result<String> {
        Smile::smile_version(self)
    }

    fn devices(&self) -> Vec<DeviceData> {
        Smile::devices(self)
    }

    fn device(&self, id: &str) -> Option<DeviceData> {
        Smile::device(self, id)
    }

    fn single_master_thermostat(&self) -> Option<bool> {
        Smile::single_master_thermostat(self)
    }
}

#[cfg(test)]
pub use mock::MockSmileClient;
